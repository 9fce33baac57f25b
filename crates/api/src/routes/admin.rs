//! Ops endpoints
//!
//! Gated by the `ADMIN_EMAILS` allowlist on top of the normal session
//! layer; these read consistency state, they never mutate.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::json;

use ecosort_billing::{InvariantCheckSummary, InvariantChecker};

use crate::{
    auth::Session,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Allowlist membership check. Emails in the config are stored
/// lowercased; the session email is normalized here.
pub fn is_admin(admin_emails: &[String], email: &str) -> bool {
    let email = email.to_ascii_lowercase();
    admin_emails.iter().any(|e| *e == email)
}

fn require_admin(state: &AppState, session: &Session) -> ApiResult<()> {
    if is_admin(&state.config.admin_emails, &session.email) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "administrator access required".to_string(),
        ))
    }
}

/// GET /api/admin/invariants
///
/// Full consistency sweep over metering and subscription state.
pub async fn invariant_sweep(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    require_admin(&state, &session)?;

    let summary = state.billing.invariants.run_all_checks().await?;
    if !summary.healthy {
        tracing::warn!(
            violations = summary.violations.len(),
            checks_failed = summary.checks_failed,
            "Invariant sweep found violations"
        );
    }
    Ok(Json(summary))
}

/// GET /api/admin/invariants/{check}
pub async fn invariant_check(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(check): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&state, &session)?;

    if !InvariantChecker::available_checks().contains(&check.as_str()) {
        return Err(ApiError::NotFound("invariant check"));
    }

    let violations = state.billing.invariants.run_check(&check).await?;
    Ok(Json(json!({
        "check": check,
        "healthy": violations.is_empty(),
        "violations": violations,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_admits_no_one() {
        assert!(!is_admin(&[], "ops@example.com"));
    }

    #[test]
    fn allowlist_match_is_case_insensitive_on_the_session_email() {
        let admins = vec!["ops@example.com".to_string()];
        assert!(is_admin(&admins, "ops@example.com"));
        assert!(is_admin(&admins, "Ops@Example.COM"));
        assert!(!is_admin(&admins, "user@example.com"));
    }

    #[test]
    fn unknown_check_name_is_not_routable() {
        assert!(!InvariantChecker::available_checks().contains(&"made_up_check"));
        assert!(InvariantChecker::available_checks().contains(&"single_active_subscription"));
        assert!(InvariantChecker::available_checks().contains(&"count_within_limit"));
        assert!(InvariantChecker::available_checks().contains(&"limit_matches_catalog"));
        assert!(InvariantChecker::available_checks().contains(&"active_has_end_date"));
    }
}
