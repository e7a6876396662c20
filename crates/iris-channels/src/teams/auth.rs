//! Bot Framework OAuth client-credentials token, cached until shortly before expiry.

use iris_core::error::IrisError;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub(crate) const TOKEN_URL: &str =
    "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";
const SCOPE: &str = "https://api.botframework.com/.default";
/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

pub(crate) struct TokenProvider {
    client: reqwest::Client,
    app_id: String,
    app_password: String,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub(crate) fn new(
        client: reqwest::Client,
        app_id: &str,
        app_password: &str,
        token_url: &str,
    ) -> Self {
        Self {
            client,
            app_id: app_id.to_string(),
            app_password: app_password.to_string(),
            token_url: token_url.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, fetching a new one when the cached one is stale.
    pub(crate) async fn token(&self) -> Result<String, IrisError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.refresh_at {
                return Ok(c.token.clone());
            }
        }

        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_password.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| IrisError::Channel(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IrisError::Channel(format!("token request returned {status}")));
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| IrisError::Channel(format!("token response parse failed: {e}")))?;

        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!("fetched connector token (valid {}s)", lifetime.as_secs());
        *cached = Some(CachedToken {
            token: parsed.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(parsed.access_token)
    }
}
