// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! EcoSort shared types
//!
//! Domain types used by both the API server and the billing crate:
//! the plan catalog, database row models, and pool construction.

pub mod db;
pub mod models;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use models::{Classification, Subscription, User};
pub use types::{Plan, PlanParseError, Quota, SubscriptionStatus, UNLIMITED_SENTINEL};
