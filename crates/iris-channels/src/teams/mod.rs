//! Microsoft Teams channel over the Bot Framework connector REST API.
//!
//! Inbound activities are posted to the bot's HTTP endpoint and classified by
//! [`parse_activity`]; replies go to `{serviceUrl}/v3/conversations/{id}/activities`.
//! Docs: <https://learn.microsoft.com/azure/bot-service/rest-api/bot-framework-rest-connector-api-reference>

mod auth;
pub mod types;
mod upload;


pub use types::{parse_activity, Activity, FILE_CONSENT_INVOKE};
pub use upload::HttpUploader;

use async_trait::async_trait;
use auth::TokenProvider;
use iris_core::{
    config::BotConfig,
    error::IrisError,
    message::{Address, OutgoingMessage},
    sanitize::strip_query,
    traits::Channel,
};
use serde::Deserialize;
use tracing::{debug, warn};

/// One bot identity on Teams.
pub struct TeamsChannel {
    name: String,
    client: reqwest::Client,
    /// `None` when the bot runs without credentials (local emulator).
    auth: Option<TokenProvider>,
    trusted_hosts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    id: Option<String>,
}

impl TeamsChannel {
    pub fn new(name: &str, config: &BotConfig) -> Self {
        Self::with_token_url(name, config, auth::TOKEN_URL)
    }

    /// Like [`TeamsChannel::new`], fetching tokens from `token_url`.
    pub fn with_token_url(name: &str, config: &BotConfig, token_url: &str) -> Self {
        let client = reqwest::Client::new();
        let auth = if config.has_credentials() {
            Some(TokenProvider::new(
                client.clone(),
                &config.app_id,
                &config.app_password,
                token_url,
            ))
        } else {
            warn!("{name}: no app credentials configured, connector calls are unauthenticated");
            None
        };
        Self {
            name: name.to_string(),
            client,
            auth,
            trusted_hosts: config
                .trusted_hosts
                .iter()
                .map(|h| h.trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Whether `url` names a host allowed to receive the bot token: a trusted
    /// entry itself or one of its subdomains.
    fn is_trusted(&self, url: &str) -> bool {
        let Some(host) = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_end_matches('.').to_ascii_lowercase()))
        else {
            return false;
        };
        self.trusted_hosts.iter().any(|trusted| {
            host == *trusted
                || host
                    .strip_suffix(trusted.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    fn activities_url(address: &Address) -> String {
        format!(
            "{}/v3/conversations/{}/activities",
            address.service_url.trim_end_matches('/'),
            urlencoding::encode(&address.conversation.id)
        )
    }

    /// Attach the bot token when credentials are configured and `url` is on
    /// a trusted host. Other hosts get the request without it.
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, IrisError> {
        let Some(auth) = &self.auth else {
            return Ok(request);
        };
        if !self.is_trusted(url) {
            warn!(
                "{}: {} is not a trusted host, sending without credentials",
                self.name,
                strip_query(url)
            );
            return Ok(request);
        }
        Ok(request.bearer_auth(auth.token().await?))
    }

    async fn post_activity(
        &self,
        address: &Address,
        activity: &Activity,
    ) -> Result<Option<String>, IrisError> {
        let url = Self::activities_url(address);
        let request = self
            .authorize(self.client.post(&url).json(activity), &url)
            .await?;
        let resp = request
            .send()
            .await
            .map_err(|e| IrisError::Channel(format!("{} send failed: {e}", self.name)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IrisError::Channel(format!(
                "{} send returned {status}: {body}",
                self.name
            )));
        }

        // Typing activities come back with an empty body.
        let id = resp
            .json::<ResourceResponse>()
            .await
            .ok()
            .and_then(|r| r.id);
        debug!("{}: sent {} activity {:?}", self.name, activity.kind, id);
        Ok(id)
    }
}

#[async_trait]
impl Channel for TeamsChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        address: &Address,
        message: OutgoingMessage,
    ) -> Result<Option<String>, IrisError> {
        let activity = types::outgoing_activity(address, &message);
        self.post_activity(address, &activity).await
    }

    async fn send_typing(&self, address: &Address) -> Result<(), IrisError> {
        self.post_activity(address, &types::typing_activity(address))
            .await
            .map(|_| ())
    }

    async fn delete_message(&self, address: &Address, message_id: &str) -> Result<(), IrisError> {
        let url = format!(
            "{}/{}",
            Self::activities_url(address),
            urlencoding::encode(message_id)
        );
        let request = self.authorize(self.client.delete(&url), &url).await?;
        let resp = request
            .send()
            .await
            .map_err(|e| IrisError::Channel(format!("{} delete failed: {e}", self.name)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IrisError::Channel(format!(
                "{} delete returned {status}",
                self.name
            )));
        }
        Ok(())
    }

    async fn download_authenticated(
        &self,
        url: &str,
        _address: &Address,
    ) -> Result<Vec<u8>, IrisError> {
        let request = self.authorize(self.client.get(url), url).await?;
        let resp = request.send().await.map_err(|e| {
            IrisError::Channel(format!("download of {} failed: {e}", strip_query(url)))
        })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(IrisError::Channel(format!(
                "download of {} returned {status}",
                strip_query(url)
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| IrisError::Channel(format!("download read failed: {e}")))?;
        debug!("{}: downloaded {} bytes", self.name, bytes.len());
        Ok(bytes.to_vec())
    }
}
