//! Midtrans payment notification endpoint

use axum::{extract::State, Json};
use serde_json::json;

use ecosort_billing::WebhookOutcome;

use crate::{error::ApiResult, state::AppState};

/// POST /api/payments/webhook
///
/// Response contract with the provider: 200 for everything that was
/// attempted without an internal error (retrying would change nothing),
/// 403 for a bad signature, 400 for an unparseable payload, and 500 for
/// internal errors so redelivery completes the reconciliation.
pub async fn notification(
    State(state): State<AppState>,
    raw_body: String,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.billing.webhooks.handle_notification(&raw_body).await?;

    let outcome_str = match outcome {
        WebhookOutcome::Activated { .. } => "activated",
        WebhookOutcome::AlreadyProcessed => "already_processed",
        WebhookOutcome::PendingRecorded => "pending",
        WebhookOutcome::MarkedFailed(_) => "failed",
        WebhookOutcome::IgnoredTerminal(_) => "ignored",
        WebhookOutcome::UnknownOrder => "unknown_order",
    };

    Ok(Json(json!({ "status": "ok", "outcome": outcome_str })))
}
