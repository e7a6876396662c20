//! Telemetry records. Emitting them never changes control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every inbound activity.
pub const USER_ACTIVITY: &str = "UserActivity";
/// Every outbound message.
pub const BOT_ACTIVITY: &str = "BotActivity";
pub const SCENARIO_START: &str = "ScenarioStart";
pub const SCENARIO_STOP: &str = "ScenarioStop";
/// A one-shot scenario with no start/stop pair.
pub const SCENARIO: &str = "Scenario";

/// Logical operations tracked as start/stop pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Describe an image.
    Caption,
    /// Recognize text in an image and propose a file.
    Ocr,
    /// Deliver the proposed file after the user's decision.
    OcrSend,
    /// No image was found in the message.
    UnrecognizedInput,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caption => "caption",
            Self::Ocr => "ocr",
            Self::OcrSend => "ocr_send",
            Self::UnrecognizedInput => "unrecognizedInput",
        }
    }
}

/// A single telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub correlation_id: String,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub properties: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            correlation_id: String::new(),
            user_id: None,
            tenant_id: None,
            properties: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Add a property, replacing any previous value under the same key.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Scenario name, for scenario records.
    pub fn scenario(&self) -> Option<&str> {
        self.property("scenario").and_then(Value::as_str)
    }
}
