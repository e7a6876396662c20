//! Consent upload: a single PUT of the whole file to the platform-supplied URL.

use async_trait::async_trait;
use iris_core::{error::UploadError, sanitize::strip_query, traits::Uploader};
use reqwest::{header, StatusCode};
use tracing::{debug, warn};

/// Writes files to upload sessions opened by the user's consent.
#[derive(Clone, Default)]
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// `Content-Range` header value covering a whole body of `len` bytes.
pub(crate) fn content_range(len: usize) -> String {
    format!("bytes 0-{}/{len}", len.saturating_sub(1))
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, upload_url: &str, content: &[u8]) -> Result<(), UploadError> {
        let resp = self
            .client
            .put(upload_url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_RANGE, content_range(content.len()))
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| {
                // The upload URL is pre-signed; keep it out of the error text.
                let e = e.without_url();
                warn!("upload to {} failed: {e}", strip_query(upload_url));
                UploadError::Transport(e.to_string())
            })?;

        let status = resp.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            debug!("uploaded {} bytes ({status})", content.len());
            return Ok(());
        }

        let reason = status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        warn!("upload to {} returned {status}", strip_query(upload_url));
        Err(UploadError::Status {
            status: status.as_u16(),
            reason,
        })
    }
}
