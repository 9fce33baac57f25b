//! Application state

use sqlx::PgPool;
use std::sync::Arc;

use ecosort_billing::BillingService;

use crate::{
    auth::{AuthState, SessionManager},
    classifier::ClassifierClient,
    config::Config,
    error::ApiResult,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub sessions: SessionManager,
    pub billing: Arc<BillingService>,
    pub classifier: ClassifierClient,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> ApiResult<Self> {
        let sessions = SessionManager::new(&config.session_secret, config.session_expiry_hours);

        let billing = BillingService::from_env(pool.clone())
            .map_err(|e| crate::error::ApiError::Internal(e.to_string()))?;
        tracing::info!("Midtrans billing service initialized");

        let classifier = ClassifierClient::new(
            config.classifier_url.clone(),
            config.classifier_timeout,
        )?;
        tracing::info!(url = %config.classifier_url, "Classifier client initialized");

        Ok(Self {
            pool,
            config,
            sessions,
            billing: Arc::new(billing),
            classifier,
        })
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            sessions: self.sessions.clone(),
            pool: self.pool.clone(),
        }
    }
}
