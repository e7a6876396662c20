//! Azure Computer Vision (v2.0) client.
//!
//! Two operations: `describe` (captions + tags) and `ocr` (printed text).
//! Docs: <https://westus.dev.cognitive.microsoft.com/docs/services/5adf991815e1060e6355ad44>

use async_trait::async_trait;
use iris_core::{
    config::VisionConfig,
    traits::Analyzer,
    vision::{AnalysisError, AnalysisRequest, DescribeResult, TextResult},
};
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, warn};

const DESCRIBE_PATH: &str = "vision/v2.0/describe";
const OCR_PATH: &str = "vision/v2.0/ocr";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// HTTP client for the vision service.
pub struct VisionClient {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
    default_language: String,
}

/// Error envelope returned by the service on failure.
///
/// Seen in two shapes: flat `{code, message}` and nested `{error: {code, message}}`.
#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ServiceErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl VisionClient {
    /// Create a client for `endpoint`, a bare host name or a full base URL.
    pub fn new(endpoint: &str, access_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url_for(endpoint),
            access_key: access_key.into(),
            default_language: "en".to_string(),
        }
    }

    /// Create from config values, applying the configured request timeout.
    pub fn from_config(config: &VisionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("vision: failed to build HTTP client ({e}), using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url_for(&config.endpoint),
            access_key: config.access_key.clone(),
            default_language: config.language.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST an image to `path` and decode the JSON answer.
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        request: &AnalysisRequest,
    ) -> Result<T, AnalysisError> {
        let url = format!("{}/{path}", self.base_url);
        debug!("vision: POST {url} ({} body)", request.kind());

        let builder = self
            .client
            .post(&url)
            .query(query)
            .header(KEY_HEADER, &self.access_key);

        let builder = match request {
            AnalysisRequest::Url(image_url) => {
                builder.json(&serde_json::json!({ "url": image_url }))
            }
            AnalysisRequest::Bytes(bytes) => builder
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| AnalysisError::transport(format!("vision request failed: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| AnalysisError {
            status_code: Some(status.as_u16()),
            message: format!("failed to read vision response: {e}"),
            raw_body: None,
        })?;

        if !status.is_success() {
            let err = error_from_response(status, &body);
            warn!("vision: {path} returned {status}: {}", err.message);
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| AnalysisError {
            status_code: Some(status.as_u16()),
            message: format!("failed to parse vision response: {e}"),
            raw_body: Some(body),
        })
    }
}

#[async_trait]
impl Analyzer for VisionClient {
    fn name(&self) -> &str {
        "azure-vision"
    }

    async fn describe(
        &self,
        request: &AnalysisRequest,
        language: Option<&str>,
        max_candidates: Option<u32>,
    ) -> Result<DescribeResult, AnalysisError> {
        let query = [
            ("maxCandidates", max_candidates.unwrap_or(1).to_string()),
            (
                "language",
                language.unwrap_or(&self.default_language).to_string(),
            ),
        ];
        self.post(DESCRIBE_PATH, &query, request).await
    }

    async fn recognize_text(
        &self,
        request: &AnalysisRequest,
        language: Option<&str>,
    ) -> Result<TextResult, AnalysisError> {
        let query = [
            ("detectOrientation", "true".to_string()),
            (
                "language",
                language.unwrap_or(&self.default_language).to_string(),
            ),
        ];
        self.post(OCR_PATH, &query, request).await
    }
}

/// Normalize a configured endpoint into a base URL without a trailing slash.
fn base_url_for(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Build an [`AnalysisError`] from a non-success response.
///
/// Prefers the service's own message; anything unparseable falls back to the
/// status text.
fn error_from_response(status: StatusCode, body: &str) -> AnalysisError {
    let detail = serde_json::from_str::<ServiceError>(body)
        .ok()
        .and_then(|e| e.message.or_else(|| e.error.and_then(|d| d.message)))
        .filter(|m| !m.is_empty());

    let message = detail.unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    });

    AnalysisError {
        status_code: Some(status.as_u16()),
        message,
        raw_body: (!body.is_empty()).then(|| body.to_string()),
    }
}
