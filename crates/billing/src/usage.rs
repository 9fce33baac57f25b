//! Usage metering
//!
//! Gates classification requests against the per-plan daily quota. The
//! counting window is the UTC calendar day: the first admission after the
//! day of `last_usage_reset` has passed resets the counter as part of the
//! same statement that grants the request.
//!
//! Admission is a single conditional UPDATE whose RETURNING row is the
//! grant signal, so two concurrent requests at the quota boundary cannot
//! both be admitted (the read-compare-increment sequence never happens in
//! application code).

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use ecosort_shared::{Plan, Quota, User};

use crate::error::{BillingError, BillingResult};

/// Outcome of the pure quota decision
#[derive(Debug, Clone, Serialize)]
pub struct UsageDecision {
    pub allowed: bool,
    /// Used verbatim in API error responses
    pub reason: String,
    /// True when the window has rolled over and the counter reset is due
    pub reset_due: bool,
}

/// Usage state after an admission, returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub used: i32,
    /// -1 means unlimited
    pub limit: i32,
    pub plan: Plan,
}

/// Two timestamps fall in the same counting window iff they share a UTC
/// calendar day.
pub fn same_window(last_reset: OffsetDateTime, now: OffsetDateTime) -> bool {
    last_reset.to_offset(time::UtcOffset::UTC).date() == now.to_offset(time::UtcOffset::UTC).date()
}

/// Rejection reason for an exhausted quota. Single source for both
/// [`check`] and the 429 body built at the API layer, so the user-facing
/// text cannot drift between the two.
pub fn quota_exhausted_reason(plan: Plan) -> String {
    format!("Daily {plan} classification limit reached")
}

/// Pure quota decision against a user snapshot.
///
/// Side-effect free: callers that act on `allowed` must go through
/// [`UsageMeter::admit`], which performs the reset and increment
/// atomically. This function exists for reporting (429 bodies, usage
/// summaries) and for unit-testing the window policy.
pub fn check(user: &User, now: OffsetDateTime) -> BillingResult<UsageDecision> {
    let plan: Plan = user.plan_parsed()?;

    if !same_window(user.last_usage_reset, now) {
        return Ok(UsageDecision {
            allowed: true,
            reason: "New day, usage window reset".to_string(),
            reset_due: true,
        });
    }

    match user.quota() {
        Quota::Unlimited => Ok(UsageDecision {
            allowed: true,
            reason: "Unlimited plan".to_string(),
            reset_due: false,
        }),
        Quota::Limited(limit) if user.usage_count < limit => Ok(UsageDecision {
            allowed: true,
            reason: format!("{} of {} classifications used today", user.usage_count, limit),
            reset_due: false,
        }),
        Quota::Limited(_) => Ok(UsageDecision {
            allowed: false,
            reason: quota_exhausted_reason(plan),
            reset_due: false,
        }),
    }
}

/// Usage meter backed by the users table
#[derive(Clone)]
pub struct UsageMeter {
    pool: PgPool,
}

impl UsageMeter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically admit one classification for `user_id`.
    ///
    /// One statement handles all three cases: window rollover (count := 1,
    /// reset timestamp moves), under-quota increment, and unlimited plans.
    /// No row returned means the quota is exhausted for the current window.
    pub async fn admit(&self, user_id: Uuid) -> BillingResult<Option<UsageSnapshot>> {
        let row: Option<(i32, i32, String)> = sqlx::query_as(
            r#"
            UPDATE users SET
                usage_count = CASE
                    WHEN (last_usage_reset AT TIME ZONE 'UTC')::date
                         < (NOW() AT TIME ZONE 'UTC')::date THEN 1
                    ELSE usage_count + 1
                END,
                last_usage_reset = CASE
                    WHEN (last_usage_reset AT TIME ZONE 'UTC')::date
                         < (NOW() AT TIME ZONE 'UTC')::date THEN NOW()
                    ELSE last_usage_reset
                END,
                updated_at = NOW()
            WHERE id = $1
              AND (
                  usage_limit < 0
                  OR (last_usage_reset AT TIME ZONE 'UTC')::date
                     < (NOW() AT TIME ZONE 'UTC')::date
                  OR usage_count < usage_limit
              )
            RETURNING usage_count, usage_limit, plan
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((used, limit, plan)) => {
                tracing::debug!(
                    user_id = %user_id,
                    used = used,
                    limit = limit,
                    "Classification admitted"
                );
                Ok(Some(UsageSnapshot {
                    used,
                    limit,
                    plan: plan.parse()?,
                }))
            }
            None => {
                tracing::info!(user_id = %user_id, "Classification rejected: quota exhausted");
                Ok(None)
            }
        }
    }

    /// Compensating decrement for a request that failed after admission,
    /// so a persistence error does not burn quota. Never goes below zero
    /// and never rolls the window back.
    pub async fn release(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET usage_count = GREATEST(usage_count - 1, 0), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id = %user_id, "Released one admitted classification slot");
        Ok(())
    }

    /// Current usage state for responses and 429 bodies
    pub async fn snapshot(&self, user_id: Uuid) -> BillingResult<UsageSnapshot> {
        let row: Option<(i32, i32, String)> =
            sqlx::query_as("SELECT usage_count, usage_limit, plan FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let (used, limit, plan) = row.ok_or(BillingError::UserNotFound(user_id))?;
        Ok(UsageSnapshot {
            used,
            limit,
            plan: plan.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosort_shared::UNLIMITED_SENTINEL;
    use time::macros::datetime;

    fn user(plan: Plan, usage_count: i32, last_reset: OffsetDateTime) -> User {
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            name: "Test".to_string(),
            plan: plan.as_str().to_string(),
            usage_count,
            usage_limit: plan.daily_quota().as_limit(),
            last_usage_reset: last_reset,
            created_at: last_reset,
            updated_at: last_reset,
        }
    }

    #[test]
    fn under_quota_is_allowed() {
        let now = datetime!(2025-03-10 14:00 UTC);
        let u = user(Plan::Free, 4, datetime!(2025-03-10 08:00 UTC));
        let decision = check(&u, now).unwrap();
        assert!(decision.allowed);
        assert!(!decision.reset_due);
    }

    #[test]
    fn at_quota_same_day_is_rejected_with_plan_in_reason() {
        let now = datetime!(2025-03-10 14:00 UTC);
        let u = user(Plan::Free, 5, datetime!(2025-03-10 08:00 UTC));
        let decision = check(&u, now).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "Daily free classification limit reached");
    }

    #[test]
    fn rejection_reason_is_the_shared_exhausted_reason() {
        let now = datetime!(2025-03-10 14:00 UTC);
        let u = user(Plan::Free, 5, datetime!(2025-03-10 08:00 UTC));
        let decision = check(&u, now).unwrap();
        assert_eq!(decision.reason, quota_exhausted_reason(Plan::Free));
        assert_eq!(
            quota_exhausted_reason(Plan::Premium),
            "Daily premium classification limit reached"
        );
    }

    #[test]
    fn at_quota_next_day_signals_reset() {
        let now = datetime!(2025-03-11 00:05 UTC);
        let u = user(Plan::Free, 5, datetime!(2025-03-10 23:55 UTC));
        let decision = check(&u, now).unwrap();
        assert!(decision.allowed);
        assert!(decision.reset_due);
    }

    #[test]
    fn corporate_never_rejects_for_quota() {
        let now = datetime!(2025-03-10 14:00 UTC);
        let mut u = user(Plan::Corporate, 1_000_000, datetime!(2025-03-10 08:00 UTC));
        assert_eq!(u.usage_limit, UNLIMITED_SENTINEL);
        let decision = check(&u, now).unwrap();
        assert!(decision.allowed);

        u.usage_count = i32::MAX;
        assert!(check(&u, now).unwrap().allowed);
    }

    #[test]
    fn window_boundary_is_the_utc_midnight() {
        let before = datetime!(2025-03-10 23:59:59 UTC);
        let after = datetime!(2025-03-11 00:00:00 UTC);
        assert!(same_window(before, before));
        assert!(!same_window(before, after));
    }

    #[test]
    fn window_comparison_normalizes_offsets() {
        // 2025-03-10 23:00 UTC expressed at +07:00 is already 03-11 locally;
        // the window must follow the UTC day, not the local one.
        let last = datetime!(2025-03-11 06:00 +7);
        let now = datetime!(2025-03-10 23:30 UTC);
        assert!(same_window(last, now));
    }

    #[test]
    fn corrupt_plan_name_surfaces_as_error() {
        let mut u = user(Plan::Free, 0, datetime!(2025-03-10 08:00 UTC));
        u.plan = "platinum".to_string();
        assert!(matches!(
            check(&u, datetime!(2025-03-10 14:00 UTC)),
            Err(BillingError::InvalidPlan(_))
        ));
    }
}
