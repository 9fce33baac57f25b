//! Classification endpoints

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use ecosort_shared::Classification;

use crate::{
    auth::Session,
    classifier::{ClassificationResult, ImagePayload},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Request body for a classification
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    /// Base64 data URL as produced by browser canvas/file readers
    pub image_data: Option<String>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Response for a successful classification
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub classification: ClassificationRecord,
    pub usage: UsageInfo,
}

#[derive(Debug, Serialize)]
pub struct ClassificationRecord {
    pub id: Uuid,
    pub label: String,
    pub category: String,
    pub confidence: f32,
    pub fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct UsageInfo {
    pub used: i32,
    /// -1 means unlimited
    pub limit: i32,
    pub plan: String,
}

/// POST /api/classify
///
/// Order matters: the image is validated before the quota slot is
/// claimed, so a malformed request never burns quota, and the slot is
/// released if persistence fails after admission.
pub async fn classify(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<ClassifyRequest>,
) -> ApiResult<Json<ClassifyResponse>> {
    let image_data = body
        .image_data
        .as_deref()
        .ok_or_else(|| ApiError::Validation("image_data is required".to_string()))?;
    let image = ImagePayload::from_data_url(image_data)?;

    // Atomic admission: reset-or-increment in one conditional write.
    let snapshot = match state.billing.usage.admit(session.user_id).await? {
        Some(snapshot) => snapshot,
        None => {
            // No row updated: quota exhausted, or the user row is gone.
            let current = state.billing.usage.snapshot(session.user_id).await?;
            return Err(ApiError::QuotaExceeded {
                reason: ecosort_billing::quota_exhausted_reason(current.plan),
                limit: current.limit,
                plan: current.plan,
            });
        }
    };

    let result = state.classifier.classify(&image).await;

    let record = match persist(&state, session.user_id, &result, body.location.as_ref()).await {
        Ok(record) => record,
        Err(err) => {
            // Give the admitted slot back; the user got nothing for it.
            if let Err(release_err) = state.billing.usage.release(session.user_id).await {
                tracing::error!(
                    user_id = %session.user_id,
                    error = %release_err,
                    "Failed to release usage slot after persistence error"
                );
            }
            return Err(err);
        }
    };

    Ok(Json(ClassifyResponse {
        classification: record,
        usage: UsageInfo {
            used: snapshot.used,
            limit: snapshot.limit,
            plan: snapshot.plan.to_string(),
        },
    }))
}

async fn persist(
    state: &AppState,
    user_id: Uuid,
    result: &ClassificationResult,
    location: Option<&Location>,
) -> ApiResult<ClassificationRecord> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO classifications
            (user_id, label, category, confidence, latitude, longitude, fallback)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&result.label)
    .bind(&result.category)
    .bind(result.confidence)
    .bind(location.map(|l| l.lat))
    .bind(location.map(|l| l.lng))
    .bind(result.fallback)
    .fetch_one(&state.pool)
    .await?;

    Ok(ClassificationRecord {
        id,
        label: result.label.clone(),
        category: result.category.clone(),
        confidence: result.confidence,
        fallback: result.fallback,
    })
}

/// Query parameters for the history listing
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

/// GET /api/classifications
pub async fn history(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    let rows: Vec<Classification> = sqlx::query_as(
        r#"
        SELECT * FROM classifications
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(session.user_id)
    .bind(per_page)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM classifications WHERE user_id = $1")
            .bind(session.user_id)
            .fetch_one(&state.pool)
            .await?;

    Ok(Json(json!({
        "classifications": rows,
        "page": page,
        "per_page": per_page,
        "total": total,
    })))
}
