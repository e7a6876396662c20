use crate::{
    error::{IrisError, UploadError},
    message::{Address, OutgoingMessage},
    telemetry::TelemetryEvent,
    vision::{AnalysisError, AnalysisRequest, DescribeResult, TextResult},
};
use async_trait::async_trait;
use serde_json::Value;

/// Image analysis service.
///
/// A single call either completes or fails; retry policy belongs to callers.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Human-readable service name.
    fn name(&self) -> &str;

    /// Caption an image. `max_candidates` caps the number of ranked captions.
    async fn describe(
        &self,
        request: &AnalysisRequest,
        language: Option<&str>,
        max_candidates: Option<u32>,
    ) -> Result<DescribeResult, AnalysisError>;

    /// Recognize printed text in an image.
    async fn recognize_text(
        &self,
        request: &AnalysisRequest,
        language: Option<&str>,
    ) -> Result<TextResult, AnalysisError>;
}

/// Messaging Channel trait: the outbound half of a chat connector.
///
/// Inbound activities arrive over HTTP and are classified by the channel's
/// parser before reaching the bots.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Send a message into the addressed conversation.
    /// Returns the platform id of the created message, when the platform reports one.
    async fn send(
        &self,
        address: &Address,
        message: OutgoingMessage,
    ) -> Result<Option<String>, IrisError>;

    /// Send a typing indicator to show the bot is processing.
    async fn send_typing(&self, _address: &Address) -> Result<(), IrisError> {
        Ok(())
    }

    /// Delete a message the bot previously sent.
    async fn delete_message(&self, address: &Address, message_id: &str)
        -> Result<(), IrisError>;

    /// Fetch attachment content that requires the bot's own credential.
    async fn download_authenticated(
        &self,
        url: &str,
        address: &Address,
    ) -> Result<Vec<u8>, IrisError>;
}

/// Writes a finished file to a platform-supplied upload URL.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, upload_url: &str, content: &[u8]) -> Result<(), UploadError>;
}

/// Conversation-scoped key-value state.
///
/// Each conversation owns named slots holding JSON values. Writes replace the
/// slot wholesale; there is no cross-conversation sharing.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, conversation_key: &str, slot: &str) -> Result<Option<Value>, IrisError>;

    async fn put(&self, conversation_key: &str, slot: &str, value: Value)
        -> Result<(), IrisError>;

    async fn remove(&self, conversation_key: &str, slot: &str) -> Result<(), IrisError>;

    /// Remove the slot only while it still holds `expected`.
    /// Returns whether anything was removed.
    async fn remove_if(
        &self,
        conversation_key: &str,
        slot: &str,
        expected: &Value,
    ) -> Result<bool, IrisError>;
}

/// Destination for telemetry records.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, event: TelemetryEvent) -> Result<(), IrisError>;
}
