//! Plan catalog and subscription state
//!
//! The catalog is the single source of truth for plan quotas and prices.
//! No other module may carry an inline quota constant.

use serde::{Deserialize, Serialize};

/// Sentinel stored in `users.usage_limit` for unlimited plans.
///
/// Unlimited is a distinct state, never a large finite number: a finite
/// stand-in would silently truncate once real usage crossed it.
pub const UNLIMITED_SENTINEL: i32 = -1;

/// Subscription plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Premium,
    Corporate,
}

/// Daily classification quota for a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(i32),
    Unlimited,
}

impl Quota {
    /// Database representation: finite value or the -1 sentinel
    pub fn as_limit(self) -> i32 {
        match self {
            Quota::Limited(n) => n,
            Quota::Unlimited => UNLIMITED_SENTINEL,
        }
    }

    pub fn from_limit(limit: i32) -> Self {
        if limit < 0 {
            Quota::Unlimited
        } else {
            Quota::Limited(limit)
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, Quota::Unlimited)
    }
}

impl Plan {
    /// Daily classification quota
    pub fn daily_quota(self) -> Quota {
        match self {
            Plan::Free => Quota::Limited(5),
            Plan::Premium => Quota::Limited(1000),
            Plan::Corporate => Quota::Unlimited,
        }
    }

    /// Monthly price in IDR (no minor units). Free has no price.
    pub fn price_idr(self) -> Option<i64> {
        match self {
            Plan::Free => None,
            Plan::Premium => Some(49_000),
            Plan::Corporate => Some(199_000),
        }
    }

    pub fn is_paid(self) -> bool {
        !matches!(self, Plan::Free)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Premium => "premium",
            Plan::Corporate => "corporate",
        }
    }

    pub fn all() -> &'static [Plan] {
        &[Plan::Free, Plan::Premium, Plan::Corporate]
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a plan name is not in the catalog
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown plan: {0}")]
pub struct PlanParseError(pub String);

impl std::str::FromStr for Plan {
    type Err = PlanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "premium" => Ok(Plan::Premium),
            "corporate" => Ok(Plan::Corporate),
            other => Err(PlanParseError(other.to_string())),
        }
    }
}

/// Lifecycle state of a subscription row
///
/// `Pending -> Active` on a successful payment event,
/// `Pending -> Failed | Cancelled | Expired` on a failure event.
/// Active is terminal-success; the failure states are terminal-failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Failed,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Failed => "failed",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Terminal states admit no further transitions; re-delivery of the
    /// same event must be a no-op, not an error.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SubscriptionStatus::Pending)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = PlanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "active" => Ok(SubscriptionStatus::Active),
            "failed" => Ok(SubscriptionStatus::Failed),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(PlanParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn plan_round_trips_through_str() {
        for plan in Plan::all() {
            assert_eq!(Plan::from_str(plan.as_str()).unwrap(), *plan);
        }
        assert!(Plan::from_str("platinum").is_err());
        assert!(Plan::from_str("Free").is_err(), "plan names are lowercase");
    }

    #[test]
    fn corporate_quota_is_the_sentinel_not_a_big_number() {
        assert_eq!(Plan::Corporate.daily_quota(), Quota::Unlimited);
        assert_eq!(Plan::Corporate.daily_quota().as_limit(), UNLIMITED_SENTINEL);
        assert_eq!(Quota::from_limit(UNLIMITED_SENTINEL), Quota::Unlimited);
    }

    #[test]
    fn finite_quotas_round_trip_through_limit_column() {
        assert_eq!(Quota::from_limit(Plan::Free.daily_quota().as_limit()), Quota::Limited(5));
        assert_eq!(
            Quota::from_limit(Plan::Premium.daily_quota().as_limit()),
            Quota::Limited(1000)
        );
    }

    #[test]
    fn paid_plans_have_prices() {
        assert_eq!(Plan::Free.price_idr(), None);
        assert!(Plan::Premium.price_idr().unwrap() < Plan::Corporate.price_idr().unwrap());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!SubscriptionStatus::Pending.is_terminal());
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Failed,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }
}
