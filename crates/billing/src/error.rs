//! Billing error types

use ecosort_shared::Plan;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("unknown plan: {0}")]
    InvalidPlan(String),

    #[error("user is already on the {0} plan")]
    PlanUnchanged(Plan),

    #[error("cannot check out the free plan")]
    FreePlanCheckout,

    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error("malformed notification payload: {0}")]
    MalformedPayload(String),

    #[error("user not found: {0}")]
    UserNotFound(uuid::Uuid),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::Gateway(e.to_string())
    }
}

impl From<ecosort_shared::PlanParseError> for BillingError {
    fn from(e: ecosort_shared::PlanParseError) -> Self {
        BillingError::InvalidPlan(e.0)
    }
}
