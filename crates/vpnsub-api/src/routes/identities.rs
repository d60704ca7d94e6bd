//! # Identity API
//!
//! Privileged grants for allow-listed identities, and a diagnostic view the
//! front end uses to decide which menu to show.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use vpnsub_core::{IdentityId, Subscription};
use vpnsub_engine::IdentityStatus;

use crate::error::AppError;
use crate::state::AppState;

/// Response for a grant request. `granted` is `false` when the identity is
/// not allow-listed or already holds an active subscription.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub granted: bool,
    pub subscription: Option<Subscription>,
}

/// Build the identities router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/identities/:identity/grant", post(grant))
        .route("/v1/identities/:identity/status", get(status))
}

/// POST /v1/identities/:identity/grant — Grant an unbounded subscription.
async fn grant(
    State(state): State<AppState>,
    path: Result<Path<IdentityId>, PathRejection>,
) -> Result<Json<GrantResponse>, AppError> {
    let Path(identity) = path?;
    let subscription = state.provisioner.grant_privileged(identity).await?;
    Ok(Json(GrantResponse {
        granted: subscription.is_some(),
        subscription,
    }))
}

/// GET /v1/identities/:identity/status — Privilege flag and active subscription.
async fn status(
    State(state): State<AppState>,
    path: Result<Path<IdentityId>, PathRejection>,
) -> Result<Json<IdentityStatus>, AppError> {
    let Path(identity) = path?;
    Ok(Json(state.provisioner.identity_status(identity).await?))
}
