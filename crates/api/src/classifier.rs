//! External waste classifier collaborator
//!
//! The model is a black box behind HTTP: it accepts image bytes and
//! returns a category with a confidence. Calls are bounded by a timeout;
//! on any upstream failure the fixed "unknown waste" result is
//! substituted so the user's request still completes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Strongly-typed image payload: raw bytes plus the declared content type.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImagePayload {
    /// Decode a base64 data URL (`data:image/jpeg;base64,...`) as sent by
    /// browser clients. Anything else is a validation error.
    pub fn from_data_url(data_url: &str) -> ApiResult<Self> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| ApiError::Validation("image_data must be a data URL".to_string()))?;

        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| ApiError::Validation("malformed data URL".to_string()))?;

        let content_type = meta
            .strip_suffix(";base64")
            .ok_or_else(|| ApiError::Validation("data URL must be base64 encoded".to_string()))?;

        if !content_type.starts_with("image/") {
            return Err(ApiError::Validation(format!(
                "unsupported content type: {content_type}"
            )));
        }

        let bytes = BASE64
            .decode(payload)
            .map_err(|_| ApiError::Validation("invalid base64 image data".to_string()))?;

        if bytes.is_empty() {
            return Err(ApiError::Validation("empty image".to_string()));
        }

        Ok(Self {
            bytes,
            content_type: content_type.to_string(),
        })
    }
}

/// Result returned by the classifier (or substituted on fallback)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub category: String,
    pub confidence: f32,
    /// True when the classifier was unavailable and this is the fixed
    /// fallback result
    #[serde(default)]
    pub fallback: bool,
}

impl ClassificationResult {
    /// Fixed result substituted when the classifier is unavailable
    pub fn unknown_fallback() -> Self {
        Self {
            label: "Unknown waste".to_string(),
            category: "unknown".to_string(),
            confidence: 0.0,
            fallback: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassifierResponse {
    category: String,
    confidence: f32,
    #[serde(default)]
    label: Option<String>,
}

/// HTTP client for the classifier service
#[derive(Clone)]
pub struct ClassifierClient {
    base_url: String,
    http: reqwest::Client,
}

impl ClassifierClient {
    pub fn new(base_url: String, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    /// Classify an image, substituting the fallback result on any
    /// upstream failure. This never returns an error for classifier
    /// problems; only the fallback, logged for observability.
    pub async fn classify(&self, image: &ImagePayload) -> ClassificationResult {
        match self.try_classify(image).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    image_bytes = image.bytes.len(),
                    "Classifier unavailable, substituting fallback result"
                );
                ClassificationResult::unknown_fallback()
            }
        }
    }

    async fn try_classify(&self, image: &ImagePayload) -> Result<ClassificationResult, String> {
        let url = format!("{}/classify", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("Content-Type", image.content_type.clone())
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("classifier returned status {}", response.status()));
        }

        let parsed: ClassifierResponse = response.json().await.map_err(|e| e.to_string())?;

        Ok(ClassificationResult {
            label: parsed.label.unwrap_or_else(|| parsed.category.clone()),
            category: parsed.category,
            confidence: parsed.confidence,
            fallback: false,
        })
    }
}
