//! Route definitions

pub mod admin;
pub mod billing;
pub mod classify;
pub mod export;
pub mod health;
pub mod webhook;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Build the application router.
///
/// The webhook endpoint stays outside the session layer: Midtrans cannot
/// carry a session, and the payload signature is its authentication.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/classify", post(classify::classify))
        .route("/api/classifications", get(classify::history))
        .route("/api/classifications/export", get(export::export))
        .route("/api/billing/upgrade", post(billing::upgrade))
        .route("/api/billing/checkout", post(billing::checkout))
        .route("/api/billing/subscription", get(billing::subscription_info))
        .route("/api/admin/invariants", get(admin::invariant_sweep))
        .route("/api/admin/invariants/{check}", get(admin::invariant_check))
        .layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/payments/webhook", post(webhook::notification))
        .merge(protected)
        .with_state(state)
}
