//! # Subscription Queries

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use vpnsub_core::{IdentityId, Subscription};

use crate::error::AppError;
use crate::state::AppState;

/// Build the subscriptions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/identities/:identity/subscription", get(get_active))
        .route(
            "/v1/identities/:identity/subscription/latest",
            get(get_latest),
        )
}

/// GET /v1/identities/:identity/subscription — The unexpired subscription.
async fn get_active(
    State(state): State<AppState>,
    path: Result<Path<IdentityId>, PathRejection>,
) -> Result<Json<Subscription>, AppError> {
    let Path(identity) = path?;
    state
        .provisioner
        .active_subscription(identity)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no active subscription for identity {identity}")))
}

/// GET /v1/identities/:identity/subscription/latest — Newest subscription in any state.
async fn get_latest(
    State(state): State<AppState>,
    path: Result<Path<IdentityId>, PathRejection>,
) -> Result<Json<Subscription>, AppError> {
    let Path(identity) = path?;
    state
        .provisioner
        .latest_subscription(identity)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no subscription for identity {identity}")))
}
