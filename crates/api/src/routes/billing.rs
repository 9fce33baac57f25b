//! Billing routes: direct upgrades, Midtrans checkout, subscription info

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use ecosort_billing::BillingError;
use ecosort_shared::{Plan, Subscription, SubscriptionStatus};

use crate::{auth::Session, error::ApiResult, state::AppState};

/// Request body for upgrade and checkout
#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub plan: String,
}

/// Response from creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub token: String,
    pub redirect_url: String,
    pub order_id: String,
}

/// POST /api/billing/upgrade
///
/// Applies the entitlement immediately with an active subscription row;
/// no payment round-trip. Invalid and no-op plans map to 400.
pub async fn upgrade(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<PlanRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let plan: Plan = body.plan.parse().map_err(BillingError::from)?;

    let outcome = state
        .billing
        .entitlements
        .upgrade(session.user_id, plan)
        .await?;

    Ok(Json(json!({
        "user": outcome.user,
        "subscription": outcome.subscription,
    })))
}

/// POST /api/billing/checkout
///
/// Creates a pending subscription and a Midtrans Snap transaction for it.
/// The pending row is written first so every notification the provider
/// later sends resolves to a known order; a gateway failure marks it
/// failed rather than leaving it claimable.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<PlanRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let plan: Plan = body.plan.parse().map_err(BillingError::from)?;

    if !plan.is_paid() {
        return Err(BillingError::FreePlanCheckout.into());
    }
    if plan == session.plan {
        return Err(BillingError::PlanUnchanged(plan).into());
    }

    let order_id = Uuid::new_v4().to_string();
    let amount = plan.price_idr().unwrap_or(0);

    sqlx::query(
        r#"
        INSERT INTO subscriptions (user_id, plan, status, payment_id, amount, currency)
        VALUES ($1, $2, $3, $4, $5, 'IDR')
        "#,
    )
    .bind(session.user_id)
    .bind(plan.as_str())
    .bind(SubscriptionStatus::Pending.as_str())
    .bind(&order_id)
    .bind(amount)
    .execute(&state.pool)
    .await?;

    let snap = match state
        .billing
        .midtrans
        .create_transaction(&order_id, plan, &session.email, &session.name)
        .await
    {
        Ok(snap) => snap,
        Err(err) => {
            sqlx::query(
                "UPDATE subscriptions SET status = 'failed', updated_at = NOW() WHERE payment_id = $1",
            )
            .bind(&order_id)
            .execute(&state.pool)
            .await?;
            return Err(err.into());
        }
    };

    tracing::info!(
        user_id = %session.user_id,
        order_id = %order_id,
        plan = %plan,
        "Checkout created, awaiting payment notification"
    );

    Ok(Json(CheckoutResponse {
        token: snap.token,
        redirect_url: snap.redirect_url,
        order_id,
    }))
}

/// GET /api/billing/subscription
pub async fn subscription_info(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<serde_json::Value>> {
    let usage = state.billing.usage.snapshot(session.user_id).await?;

    let latest: Option<Subscription> = sqlx::query_as(
        r#"
        SELECT * FROM subscriptions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(session.user_id)
    .fetch_optional(&state.pool)
    .await?;

    Ok(Json(json!({
        "plan": usage.plan,
        "usage": { "used": usage.used, "limit": usage.limit },
        "subscription": latest,
    })))
}
