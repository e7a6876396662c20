//! Outbound side of a bot: channel calls plus the matching telemetry.

use crate::telemetry::Telemetry;
use iris_core::{
    error::IrisError,
    message::{Address, OutgoingMessage},
    traits::Channel,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct Outbox {
    channel: Arc<dyn Channel>,
    telemetry: Telemetry,
}

impl Outbox {
    pub fn new(channel: Arc<dyn Channel>, telemetry: Telemetry) -> Self {
        Self { channel, telemetry }
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Send a message, returning the platform id of the created activity.
    pub async fn send(
        &self,
        address: &Address,
        message: OutgoingMessage,
    ) -> Result<Option<String>, IrisError> {
        let id = self.channel.send(address, message).await?;
        self.telemetry.bot_activity(address, id.as_deref()).await;
        Ok(id)
    }

    /// Send plain text; failures are logged.
    pub async fn say(&self, address: &Address, message: OutgoingMessage) {
        if let Err(e) = self.send(address, message).await {
            warn!(
                "{}: reply to {} failed: {e}",
                self.channel.name(),
                address.conversation.id
            );
        }
    }

    pub async fn typing(&self, address: &Address) {
        if let Err(e) = self.channel.send_typing(address).await {
            warn!("{}: typing indicator failed: {e}", self.channel.name());
        }
    }

    /// Best-effort delete; failures are logged.
    pub async fn delete(&self, address: &Address, message_id: &str) {
        if let Err(e) = self.channel.delete_message(address, message_id).await {
            warn!(
                "{}: failed to delete message {message_id}: {e}",
                self.channel.name()
            );
        }
    }
}
