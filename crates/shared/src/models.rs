//! Database row models

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{Plan, Quota, SubscriptionStatus};

/// A user row. Root entity: classifications and subscriptions are owned by
/// exactly one user and never reassigned.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// Stored as text; always a catalog plan name
    pub plan: String,
    /// Classifications performed in the current counting window
    pub usage_count: i32,
    /// Catalog quota for `plan`; -1 means unlimited
    pub usage_limit: i32,
    /// Start of the current counting window (UTC calendar day)
    pub last_usage_reset: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Parsed plan. Rows only ever hold catalog names, so a parse failure
    /// indicates a corrupted row and surfaces as an error at the call site.
    pub fn plan_parsed(&self) -> Result<Plan, crate::types::PlanParseError> {
        self.plan.parse()
    }

    pub fn quota(&self) -> Quota {
        Quota::from_limit(self.usage_limit)
    }
}

/// One classification event. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Classification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub category: String,
    pub confidence: f32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// True when the classifier was unavailable and the fixed fallback
    /// result was substituted
    pub fallback: bool,
    pub created_at: OffsetDateTime,
}

/// One plan-period. Created pending at checkout (or active for a direct
/// upgrade); mutated only by the webhook reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    /// Payment provider order id, unique across all subscriptions
    pub payment_id: String,
    /// Raw provider transaction status, recorded as received
    pub payment_status: String,
    pub start_date: OffsetDateTime,
    pub end_date: Option<OffsetDateTime>,
    /// IDR, no minor units
    pub amount: i64,
    pub currency: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    pub fn status_parsed(&self) -> Result<SubscriptionStatus, crate::types::PlanParseError> {
        self.status.parse()
    }
}
