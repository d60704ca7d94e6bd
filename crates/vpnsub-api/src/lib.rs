//! # vpnsub-api — Axum API for the subscription engine
//!
//! The front end (a chat bot) is the only caller. It opens purchases,
//! confirms them, requests privileged grants and reads subscriptions.
//!
//! ## API Surface
//!
//! | Route                                                   | Module                      |
//! |---------------------------------------------------------|-----------------------------|
//! | `POST /v1/identities/:identity/payments`                | [`routes::payments`]        |
//! | `POST /v1/identities/:identity/payments/:id/confirm`    | [`routes::payments`]        |
//! | `GET  /v1/identities/:identity/subscription[/latest]`   | [`routes::subscriptions`]   |
//! | `POST /v1/identities/:identity/grant`                   | [`routes::identities`]      |
//! | `GET  /v1/identities/:identity/status`                  | [`routes::identities`]      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::payments::router())
        .merge(routes::subscriptions::router())
        .merge(routes::identities::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — returns 200 once the ledger and panel client are built.
async fn readiness() -> &'static str {
    "ready"
}
