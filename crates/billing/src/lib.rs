// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! EcoSort Billing Module
//!
//! Handles usage metering, plan entitlements, and Midtrans integration.
//!
//! ## Features
//!
//! - **Usage Metering**: Per-plan daily classification quotas with atomic
//!   admission and calendar-day window resets
//! - **Entitlements**: Transactional plan upgrades keeping the user row and
//!   subscription ledger in step
//! - **Checkout**: Midtrans Snap transactions for paid plans
//! - **Webhooks**: Idempotent reconciliation of Midtrans payment
//!   notifications against the subscription state machine
//! - **Invariants**: Runnable consistency checks over metering and
//!   subscription state

pub mod entitlement;
pub mod error;
pub mod invariants;
pub mod midtrans;
pub mod usage;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Entitlement
pub use entitlement::{EntitlementService, UpgradeOutcome, SUBSCRIPTION_PERIOD_DAYS};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Midtrans
pub use midtrans::{MidtransClient, MidtransConfig, SnapTransaction};

// Usage
pub use usage::{check, quota_exhausted_reason, UsageDecision, UsageMeter, UsageSnapshot};

// Webhooks
pub use webhooks::{
    classify_event, MidtransNotification, PaymentEvent, WebhookHandler, WebhookOutcome,
};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub entitlements: EntitlementService,
    pub invariants: InvariantChecker,
    pub midtrans: MidtransClient,
    pub usage: UsageMeter,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let config = MidtransConfig::from_env()?;
        Self::new(config, pool)
    }

    /// Create a new billing service with explicit config
    pub fn new(config: MidtransConfig, pool: PgPool) -> BillingResult<Self> {
        let midtrans = MidtransClient::new(config)?;

        Ok(Self {
            entitlements: EntitlementService::new(pool.clone()),
            invariants: InvariantChecker::new(pool.clone()),
            midtrans: midtrans.clone(),
            usage: UsageMeter::new(pool.clone()),
            webhooks: WebhookHandler::new(midtrans, pool),
        })
    }
}
