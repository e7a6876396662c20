//! The two bots behind the messaging endpoints.

mod caption;
mod ocr;

pub use caption::CaptionBot;
pub use ocr::OcrBot;

use crate::delivery::DeliveryOutcome;
use async_trait::async_trait;
use iris_core::{
    error::IrisError,
    message::{DecisionEvent, IncomingMessage},
};

/// A bot reachable on one messaging endpoint.
#[async_trait]
pub trait Bot: Send + Sync {
    fn name(&self) -> &str;

    /// Handle a chat message. Failures are reported to the user, not returned.
    async fn on_message(&self, message: IncomingMessage);

    /// Handle a consent decision. `None` means the bot does not take decisions.
    async fn on_decision(&self, _decision: DecisionEvent) -> Option<DeliveryOutcome> {
        None
    }
}

/// Text shown to the user for a failed fetch or analysis.
///
/// Prefers the message reported by the analysis service.
pub(crate) fn failure_reason(error: &IrisError) -> String {
    match error {
        IrisError::Vision(e) => e.message.clone(),
        other => other.to_string(),
    }
}
