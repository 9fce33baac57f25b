//! Entitlement updates
//!
//! Applies plan changes to a user record and keeps the subscription ledger
//! in step. The user-row update and the subscription insert commit in one
//! transaction; there is no observable state where the plan changed but no
//! subscription row exists, or vice versa.

use sqlx::{PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use ecosort_shared::{Plan, Subscription, SubscriptionStatus, User};

use crate::error::{BillingError, BillingResult};

/// Fixed subscription period. The calendar-month alternative was rejected
/// to keep period arithmetic uniform; see DESIGN.md.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Result of a completed upgrade
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpgradeOutcome {
    pub user: User,
    pub subscription: Subscription,
}

/// Service applying plan changes
#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Direct upgrade: sets the plan, resets the usage window, and records
    /// an immediately-active subscription, all in one transaction.
    ///
    /// Fails with `PlanUnchanged` when the target equals the current plan.
    /// Plan validity is guaranteed by the `Plan` type; unparseable names
    /// are rejected at the API boundary before this is called.
    pub async fn upgrade(&self, user_id: Uuid, new_plan: Plan) -> BillingResult<UpgradeOutcome> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT plan FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let current_plan: Plan = current
            .ok_or(BillingError::UserNotFound(user_id))?
            .0
            .parse()?;

        if current_plan == new_plan {
            return Err(BillingError::PlanUnchanged(new_plan));
        }

        let user = apply_plan(&mut tx, user_id, new_plan).await?;

        let now = OffsetDateTime::now_utc();
        let subscription: Subscription = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (user_id, plan, status, payment_id, payment_status,
                 start_date, end_date, amount, currency)
            VALUES ($1, $2, $3, $4, 'manual', $5, $6, $7, 'IDR')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(new_plan.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(format!("manual-{}", Uuid::new_v4()))
        .bind(now)
        .bind(now + Duration::days(SUBSCRIPTION_PERIOD_DAYS))
        .bind(new_plan.price_idr().unwrap_or(0))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            from_plan = %current_plan,
            to_plan = %new_plan,
            subscription_id = %subscription.id,
            "Plan upgraded"
        );

        Ok(UpgradeOutcome { user, subscription })
    }
}

/// The user-row half of an entitlement update: plan, catalog quota, and a
/// fresh usage window. Runs inside the caller's transaction so the webhook
/// reconciler can commit it together with the subscription activation.
pub async fn apply_plan(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    plan: Plan,
) -> BillingResult<User> {
    let user: Option<User> = sqlx::query_as(
        r#"
        UPDATE users SET
            plan = $2,
            usage_limit = $3,
            usage_count = 0,
            last_usage_reset = NOW(),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(plan.as_str())
    .bind(plan.daily_quota().as_limit())
    .fetch_optional(&mut **tx)
    .await?;

    user.ok_or(BillingError::UserNotFound(user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_is_thirty_days() {
        let start = OffsetDateTime::now_utc();
        let end = start + Duration::days(SUBSCRIPTION_PERIOD_DAYS);
        assert_eq!((end - start).whole_days(), 30);
    }
}
