//! Authentication middleware
//!
//! Resolves the session once at the request boundary and threads it
//! through handlers as an `Extension<Session>`; handlers never read
//! identity from ambient state. First sight of a verified identity
//! creates the user row with free-plan defaults.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use uuid::Uuid;

use ecosort_shared::Plan;

use crate::auth::session::SessionManager;
use crate::error::ApiError;

/// Resolved session, passed explicitly into each handler
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub plan: Plan,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionManager,
    pub pool: PgPool,
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware that requires an authenticated session
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::debug!(path = %path, "No bearer token on request");
        return ApiError::Unauthorized.into_response();
    };

    let claims = match auth_state.sessions.verify(&token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!(path = %path, "Session verification failed");
            return err.into_response();
        }
    };

    match ensure_user(&auth_state.pool, &claims.sub, &claims.name).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Upsert the user row for a verified identity and return the session.
///
/// The insert only fires on first sign-in; afterwards the existing row
/// (plan included) is authoritative and the identity's display name is
/// kept current.
async fn ensure_user(pool: &PgPool, email: &str, name: &str) -> Result<Session, ApiError> {
    let row: (Uuid, String) = sqlx::query_as(
        r#"
        INSERT INTO users (email, name, plan, usage_count, usage_limit, last_usage_reset)
        VALUES ($1, $2, 'free', 0, $3, NOW())
        ON CONFLICT (email) DO UPDATE SET name = $2, updated_at = NOW()
        RETURNING id, plan
        "#,
    )
    .bind(email)
    .bind(name)
    .bind(Plan::Free.daily_quota().as_limit())
    .fetch_one(pool)
    .await?;

    let plan: Plan = row
        .1
        .parse()
        .map_err(|e: ecosort_shared::PlanParseError| ApiError::Internal(e.to_string()))?;

    Ok(Session {
        user_id: row.0,
        email: email.to_string(),
        name: name.to_string(),
        plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri("/api/classify");
        if let Some(v) = value {
            builder = builder.header(AUTHORIZATION, v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_token_extracted_from_header() {
        let req = request_with_auth(Some("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_or_malformed_header_yields_none() {
        assert_eq!(extract_bearer_token(&request_with_auth(None)), None);
        assert_eq!(
            extract_bearer_token(&request_with_auth(Some("Basic dXNlcg=="))),
            None
        );
        assert_eq!(
            extract_bearer_token(&request_with_auth(Some("bearer lowercase"))),
            None
        );
    }
}
