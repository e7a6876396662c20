use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::IrisError;

/// Top-level Iris configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub iris: IrisConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub caption_bot: BotConfig,
    #[serde(default)]
    pub ocr_bot: BotConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrisConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for IrisConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// HTTP listener for the messaging endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Remote image analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Host name (`westus.api.cognitive.microsoft.com`) or full base URL.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    /// Language passed to the service when the caller has no preference.
    #[serde(default = "default_language")]
    pub language: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_key: String::new(),
            language: default_language(),
            timeout_secs: default_vision_timeout_secs(),
        }
    }
}

/// Credentials of one registered bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_password: String,
    /// Hosts that may receive the bot's connector token. An entry matches
    /// itself and its subdomains.
    #[serde(default = "default_trusted_hosts")]
    pub trusted_hosts: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_id: String::new(),
            app_password: String::new(),
            trusted_hosts: default_trusted_hosts(),
        }
    }
}

impl BotConfig {
    pub fn has_credentials(&self) -> bool {
        !self.app_id.is_empty() && !self.app_password.is_empty()
    }
}

/// Backend for per-conversation state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// SQLite file at `db_path` (default; survives restarts).
    #[default]
    Sqlite,
    /// Process memory; staged results are lost on restart.
    Memory,
}

/// Conversation state config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackend,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::default(),
            db_path: default_db_path(),
        }
    }
}

/// Telemetry config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Also keep records in the `telemetry_events` table of the memory database.
    #[serde(default)]
    pub persist: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist: false,
        }
    }
}

/// Log output config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for a daily rolling log file. Unset = console only.
    #[serde(default)]
    pub dir: Option<String>,
}

// --- Default value functions ---

fn default_name() -> String {
    "Iris".to_string()
}
fn default_data_dir() -> String {
    "~/.iris".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3978
}
fn default_language() -> String {
    "en".to_string()
}
fn default_vision_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_trusted_hosts() -> Vec<String> {
    ["botframework.com", "botframework.azure.us", "smba.trafficmanager.net"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_db_path() -> String {
    "~/.iris/iris.db".to_string()
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Secrets and the port
/// can be overridden from the environment afterwards.
pub fn load(path: &str) -> Result<Config, IrisError> {
    let path = Path::new(path);
    let mut config = if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    } else {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IrisError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        parse(&content)?
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Parse configuration from TOML text.
pub fn parse(content: &str) -> Result<Config, IrisError> {
    toml::from_str(content).map_err(|e| IrisError::Config(format!("failed to parse config: {e}")))
}

/// Overlay environment-provided values on top of the file config.
///
/// Only non-empty values win, so an exported-but-empty variable never wipes
/// a configured secret.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = get("IRIS_VISION_KEY") {
        config.vision.access_key = v;
    }
    if let Some(v) = get("IRIS_VISION_ENDPOINT") {
        config.vision.endpoint = v;
    }
    if let Some(v) = get("IRIS_CAPTION_APP_PASSWORD") {
        config.caption_bot.app_password = v;
    }
    if let Some(v) = get("IRIS_OCR_APP_PASSWORD") {
        config.ocr_bot.app_password = v;
    }
    if let Some(port) = get("PORT").and_then(|v| v.parse::<u16>().ok()) {
        config.server.port = port;
    }
}
