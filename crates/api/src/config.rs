//! Server configuration, loaded from the environment

use std::time::Duration;

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared secret for session token verification; issued by the web
    /// tier after OAuth sign-in
    pub session_secret: String,
    pub session_expiry_hours: i64,
    /// Base URL of the external waste classifier service
    pub classifier_url: String,
    /// Hard bound on classifier calls; on expiry the fixed fallback
    /// result is substituted
    pub classifier_timeout: Duration,
    /// Accounts allowed to hit the ops endpoints (invariant sweeps).
    /// Empty list means no one.
    pub admin_emails: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let session_secret = std::env::var("SESSION_SECRET")
            .map_err(|_| anyhow::anyhow!("SESSION_SECRET must be set"))?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let classifier_url = std::env::var("CLASSIFIER_URL")
            .unwrap_or_else(|_| "http://localhost:8501".to_string());

        let session_expiry_hours = std::env::var("SESSION_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        let classifier_timeout_secs: u64 = std::env::var("CLASSIFIER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);

        let admin_emails = std::env::var("ADMIN_EMAILS")
            .map(|v| {
                v.split(',')
                    .map(|e| e.trim().to_ascii_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            bind_address,
            session_secret,
            session_expiry_hours,
            classifier_url,
            classifier_timeout: Duration::from_secs(classifier_timeout_secs),
            admin_emails,
        })
    }
}
