//! Classification export (corporate plans only)

use axum::{
    extract::{Extension, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use time::{format_description::well_known::Iso8601, macros::format_description, Date, Time};

use ecosort_shared::{Classification, Plan};

use crate::{auth::Session, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
    /// Inclusive, ISO date (YYYY-MM-DD)
    #[serde(default)]
    pub start_date: Option<String>,
    /// Inclusive, ISO date
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Json,
    Csv,
}

fn parse_format(format: Option<&str>) -> Result<ExportFormat, ApiError> {
    match format.unwrap_or("json") {
        "json" => Ok(ExportFormat::Json),
        "csv" => Ok(ExportFormat::Csv),
        other => Err(ApiError::Validation(format!(
            "unsupported format: {other} (expected json or csv)"
        ))),
    }
}

fn parse_date(value: &str, field: &str) -> Result<Date, ApiError> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|_| ApiError::Validation(format!("{field} must be an ISO date (YYYY-MM-DD)")))
}

/// GET /api/classifications/export?format=json|csv&start_date&end_date
pub async fn export(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    if session.plan != Plan::Corporate {
        return Err(ApiError::Forbidden(
            "Export is available on the corporate plan only".to_string(),
        ));
    }

    let format = parse_format(query.format.as_deref())?;

    let start = query
        .start_date
        .as_deref()
        .map(|v| parse_date(v, "start_date"))
        .transpose()?
        .map(|d| d.with_time(Time::MIDNIGHT).assume_utc());
    let end = query
        .end_date
        .as_deref()
        .map(|v| parse_date(v, "end_date"))
        .transpose()?
        .map(|d| d.next_day().unwrap_or(d).with_time(Time::MIDNIGHT).assume_utc());

    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(ApiError::Validation(
                "start_date must be before end_date".to_string(),
            ));
        }
    }

    let rows: Vec<Classification> = sqlx::query_as(
        r#"
        SELECT * FROM classifications
        WHERE user_id = $1
          AND ($2::timestamptz IS NULL OR created_at >= $2)
          AND ($3::timestamptz IS NULL OR created_at < $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(session.user_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.pool)
    .await?;

    tracing::info!(
        user_id = %session.user_id,
        rows = rows.len(),
        format = ?format,
        "Classification export generated"
    );

    match format {
        ExportFormat::Json => Ok(Json(rows).into_response()),
        ExportFormat::Csv => {
            let body = to_csv(&rows);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"classifications.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
    }
}

/// Serialize rows as CSV. Fields are produced by us (uuids, labels from
/// the classifier, numbers); labels still get quoted in case a model
/// ever emits a comma.
fn to_csv(rows: &[Classification]) -> String {
    let mut out =
        String::from("id,label,category,confidence,latitude,longitude,fallback,created_at\n");
    for row in rows {
        let created = row
            .created_at
            .format(&Iso8601::DEFAULT)
            .unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            row.id,
            csv_quote(&row.label),
            csv_quote(&row.category),
            row.confidence,
            row.latitude.map(|v| v.to_string()).unwrap_or_default(),
            row.longitude.map(|v| v.to_string()).unwrap_or_default(),
            row.fallback,
            created,
        ));
    }
    out
}

fn csv_quote(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn row(label: &str) -> Classification {
        Classification {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            label: label.to_string(),
            category: "plastic".to_string(),
            confidence: 0.9,
            latitude: Some(-6.2),
            longitude: Some(106.8),
            fallback: false,
            created_at: datetime!(2025-03-10 14:00 UTC),
        }
    }

    #[test]
    fn format_defaults_to_json_and_rejects_unknown() {
        assert_eq!(parse_format(None).unwrap(), ExportFormat::Json);
        assert_eq!(parse_format(Some("csv")).unwrap(), ExportFormat::Csv);
        assert!(parse_format(Some("xlsx")).is_err());
    }

    #[test]
    fn iso_dates_parse_and_garbage_rejected() {
        assert!(parse_date("2025-03-10", "start_date").is_ok());
        assert!(parse_date("10/03/2025", "start_date").is_err());
        assert!(parse_date("yesterday", "end_date").is_err());
    }

    #[test]
    fn csv_includes_header_and_quotes_commas() {
        let csv = to_csv(&[row("Plastic, bottle")]);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,label,category"));
        assert!(lines.next().unwrap().contains("\"Plastic, bottle\""));
    }

    #[test]
    fn csv_escapes_embedded_quotes() {
        let csv = to_csv(&[row("a \"bottle\"")]);
        assert!(csv.contains("\"a \"\"bottle\"\"\""));
    }

    #[test]
    fn empty_export_is_just_the_header() {
        let csv = to_csv(&[]);
        assert_eq!(csv.lines().count(), 1);
    }
}
