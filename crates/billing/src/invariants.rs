//! Billing invariants
//!
//! Runnable consistency checks for the metering and subscription state,
//! intended to be run after webhook replays or manual mutations.
//!
//! Each check is a real SQL query, reads only, and reports enough context
//! to debug a violation.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use ecosort_shared::Plan;

use crate::error::BillingResult;

/// A single invariant violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// User(s) affected
    pub user_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Entitlements may be wrong right now
    Critical,
    /// Data inconsistency that needs attention
    High,
    /// Potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of a full invariant sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct MultipleActiveRow {
    user_id: Uuid,
    sub_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LimitMismatchRow {
    user_id: Uuid,
    plan: String,
    usage_limit: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct OverCountRow {
    user_id: Uuid,
    usage_count: i32,
    usage_limit: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct ActiveNoEndRow {
    sub_id: Uuid,
    user_id: Uuid,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return a summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_active_subscription().await?);
        violations.extend(self.check_limit_matches_catalog().await?);
        violations.extend(self.check_count_within_limit().await?);
        violations.extend(self.check_active_has_end_date().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: at most one active subscription per user
    ///
    /// Multiple active subscriptions would make the authoritative plan
    /// ambiguous.
    async fn check_single_active_subscription(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleActiveRow> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(*) as sub_count
            FROM subscriptions
            WHERE status = 'active'
            GROUP BY user_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_active_subscription".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "User has {} active subscriptions (expected at most 1)",
                    row.sub_count
                ),
                context: serde_json::json!({ "subscription_count": row.sub_count }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: usage_limit matches the catalog quota for the plan
    async fn check_limit_matches_catalog(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<LimitMismatchRow> =
            sqlx::query_as("SELECT id as user_id, plan, usage_limit FROM users")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let expected = row
                    .plan
                    .parse::<Plan>()
                    .map(|p| p.daily_quota().as_limit())
                    .ok();
                match expected {
                    Some(limit) if limit == row.usage_limit => None,
                    _ => Some(InvariantViolation {
                        invariant: "limit_matches_catalog".to_string(),
                        user_ids: vec![row.user_id],
                        description: format!(
                            "User on plan '{}' has usage_limit {} (catalog says {:?})",
                            row.plan, row.usage_limit, expected
                        ),
                        context: serde_json::json!({
                            "plan": row.plan,
                            "usage_limit": row.usage_limit,
                            "catalog_limit": expected,
                        }),
                        severity: ViolationSeverity::Critical,
                    }),
                }
            })
            .collect())
    }

    /// Invariant 3: usage_count within the limit for finite-quota plans
    ///
    /// The admission UPDATE enforces this; a violation means something
    /// wrote the counter outside the meter.
    async fn check_count_within_limit(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<OverCountRow> = sqlx::query_as(
            r#"
            SELECT id as user_id, usage_count, usage_limit
            FROM users
            WHERE usage_limit >= 0 AND usage_count > usage_limit
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "count_within_limit".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "usage_count {} exceeds usage_limit {}",
                    row.usage_count, row.usage_limit
                ),
                context: serde_json::json!({
                    "usage_count": row.usage_count,
                    "usage_limit": row.usage_limit,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: active subscriptions have an end_date
    async fn check_active_has_end_date(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ActiveNoEndRow> = sqlx::query_as(
            r#"
            SELECT id as sub_id, user_id
            FROM subscriptions
            WHERE status = 'active' AND end_date IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_has_end_date".to_string(),
                user_ids: vec![row.user_id],
                description: "Active subscription has no end_date".to_string(),
                context: serde_json::json!({ "subscription_id": row.sub_id }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "single_active_subscription" => self.check_single_active_subscription().await,
            "limit_matches_catalog" => self.check_limit_matches_catalog().await,
            "count_within_limit" => self.check_count_within_limit().await,
            "active_has_end_date" => self.check_active_has_end_date().await,
            _ => Ok(vec![]),
        }
    }

    /// List of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "single_active_subscription",
            "limit_matches_catalog",
            "count_within_limit",
            "active_has_end_date",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 4);
        assert!(checks.contains(&"single_active_subscription"));
        assert!(checks.contains(&"limit_matches_catalog"));
    }
}
