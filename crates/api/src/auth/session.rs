//! Session token verification
//!
//! The web tier completes OAuth sign-in and issues a short-lived session
//! token signed with a secret shared with this server. This module only
//! verifies and (for tests and the web tier's token endpoint) issues
//! those tokens; provider configuration lives entirely upstream.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{ApiError, ApiResult};

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Verified email of the signed-in identity
    pub sub: String,
    /// Display name from the identity provider
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies session tokens with the shared secret
#[derive(Clone)]
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl SessionManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::hours(expiry_hours),
        }
    }

    /// Issue a session token for a verified identity
    pub fn issue(&self, email: &str, name: &str) -> ApiResult<String> {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sub: email.to_string(),
            name: name.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + self.expiry).unix_timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    /// Verify a session token. Expired or tampered tokens map to 401.
    pub fn verify(&self, token: &str) -> ApiResult<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                ApiError::Unauthorized
            })
    }
}
