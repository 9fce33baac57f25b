//! API error taxonomy and HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use ecosort_billing::BillingError;
use ecosort_shared::Plan;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{reason}")]
    QuotaExceeded {
        reason: String,
        limit: i32,
        plan: Plan,
    },

    #[error("{0}")]
    Validation(String),

    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::InvalidPlan(_)
            | BillingError::PlanUnchanged(_)
            | BillingError::FreePlanCheckout
            | BillingError::MalformedPayload(_) => ApiError::Validation(e.to_string()),
            BillingError::SignatureInvalid => ApiError::SignatureInvalid,
            BillingError::UserNotFound(_) => ApiError::NotFound("user"),
            BillingError::Gateway(msg) => ApiError::Internal(msg),
            BillingError::Database(msg) => ApiError::Database(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Authentication required" }),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("{what} not found") }),
            ),
            ApiError::QuotaExceeded {
                reason,
                limit,
                plan,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "Classification limit reached",
                    "reason": reason,
                    "limit": limit,
                    "plan": plan,
                }),
            ),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::SignatureInvalid => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Invalid signature" }),
            ),
            ApiError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_maps_to_429() {
        let err = ApiError::QuotaExceeded {
            reason: "Daily free classification limit reached".to_string(),
            limit: 5,
            plan: Plan::Free,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn signature_failure_maps_to_403() {
        let err: ApiError = BillingError::SignatureInvalid.into();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn malformed_payload_maps_to_400() {
        let err: ApiError = BillingError::MalformedPayload("bad json".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn plan_errors_map_to_400() {
        let err: ApiError = BillingError::InvalidPlan("platinum".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: ApiError = BillingError::PlanUnchanged(Plan::Premium).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_errors_map_to_500() {
        let err: ApiError = BillingError::Database("connection reset".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
