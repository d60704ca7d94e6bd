//! # Purchase API
//!
//! Opens a payment for an identity and confirms it into a subscription.
//! Confirmation is idempotent: repeating it returns the subscription that
//! the first call provisioned.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use vpnsub_core::{IdentityId, PaymentId};
use vpnsub_engine::{ProvisionOutcome, PurchaseOutcome};

use crate::error::AppError;
use crate::state::AppState;

/// Build the payments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/identities/:identity/payments", post(start_purchase))
        .route(
            "/v1/identities/:identity/payments/:payment_id/confirm",
            post(confirm_payment),
        )
}

/// POST /v1/identities/:identity/payments — Start or resume a purchase.
///
/// 201 when a new payment was opened, 200 when an existing pending payment
/// was resumed or the identity is already covered.
async fn start_purchase(
    State(state): State<AppState>,
    path: Result<Path<IdentityId>, PathRejection>,
) -> Result<(StatusCode, Json<PurchaseOutcome>), AppError> {
    let Path(identity) = path?;
    let outcome = state.provisioner.start_purchase(identity).await?;

    let status = match &outcome {
        PurchaseOutcome::Pending { resumed: false, .. } => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// POST /v1/identities/:identity/payments/:payment_id/confirm — Settle and provision.
async fn confirm_payment(
    State(state): State<AppState>,
    path: Result<Path<(IdentityId, PaymentId)>, PathRejection>,
) -> Result<Json<ProvisionOutcome>, AppError> {
    let Path((identity, payment_id)) = path?;
    let outcome = state
        .provisioner
        .confirm_and_provision(payment_id, identity)
        .await?;
    Ok(Json(outcome))
}
