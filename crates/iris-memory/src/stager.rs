//! Result staging: at most one pending OCR result per conversation.
//!
//! A result waits here between the consent proposal and the user's decision.
//! Staging again for the same conversation overwrites the slot, so the last
//! `stage()` wins and any decision carrying an older id no longer matches.

use iris_core::{error::IrisError, traits::ConversationStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Slot name inside the conversation store.
const SLOT: &str = "ocr_result";

/// A recognized text waiting for the user's accept/decline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedResult {
    pub result_id: String,
    pub text: String,
    pub conversation_key: String,
}

impl StagedResult {
    /// Whether a decision carrying `result_id` from `conversation_key` refers
    /// to this entry.
    pub fn matches(&self, conversation_key: &str, result_id: &str) -> bool {
        self.conversation_key == conversation_key && self.result_id == result_id
    }
}

/// Stages results in an injected conversation store.
#[derive(Clone)]
pub struct ResultStager {
    store: Arc<dyn ConversationStore>,
}

impl ResultStager {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Stage `text` under a fresh id, replacing whatever was pending.
    pub async fn stage(&self, conversation_key: &str, text: &str) -> Result<String, IrisError> {
        let staged = StagedResult {
            result_id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            conversation_key: conversation_key.to_string(),
        };
        self.store
            .put(conversation_key, SLOT, serde_json::to_value(&staged)?)
            .await?;
        debug!(
            "staged result {} for {conversation_key} ({} bytes)",
            staged.result_id,
            staged.text.len()
        );
        Ok(staged.result_id)
    }

    /// The currently pending result, if any.
    ///
    /// A slot that no longer decodes is treated as empty.
    pub async fn peek(&self, conversation_key: &str) -> Result<Option<StagedResult>, IrisError> {
        let Some(value) = self.store.get(conversation_key, SLOT).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<StagedResult>(value) {
            Ok(staged) => Ok(Some(staged)),
            Err(e) => {
                tracing::warn!("discarding unreadable staged result for {conversation_key}: {e}");
                Ok(None)
            }
        }
    }

    pub async fn clear(&self, conversation_key: &str) -> Result<(), IrisError> {
        self.store.remove(conversation_key, SLOT).await
    }

    /// Clear `staged` unless a newer result has replaced it since it was read.
    /// Returns whether the slot was cleared.
    pub async fn clear_if(&self, staged: &StagedResult) -> Result<bool, IrisError> {
        let expected = serde_json::to_value(staged)?;
        let cleared = self
            .store
            .remove_if(&staged.conversation_key, SLOT, &expected)
            .await?;
        if !cleared {
            debug!(
                "kept newer result for {} over {}",
                staged.conversation_key, staged.result_id
            );
        }
        Ok(cleared)
    }
}
