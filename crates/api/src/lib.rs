// API crate clippy configuration
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! EcoSort API Library
//!
//! This crate contains the API server components for EcoSort: session
//! authentication, the classification pipeline, billing endpoints, and the
//! Midtrans webhook endpoint.

pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
