//! In-process conversation store.

use async_trait::async_trait;
use iris_core::{error::IrisError, traits::ConversationStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Conversation store held in process memory. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<(String, String), Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), Value>>, IrisError> {
        self.slots
            .lock()
            .map_err(|_| IrisError::Memory("conversation store lock poisoned".into()))
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get(&self, conversation_key: &str, slot: &str) -> Result<Option<Value>, IrisError> {
        let slots = self.lock()?;
        Ok(slots
            .get(&(conversation_key.to_string(), slot.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        conversation_key: &str,
        slot: &str,
        value: Value,
    ) -> Result<(), IrisError> {
        self.lock()?
            .insert((conversation_key.to_string(), slot.to_string()), value);
        Ok(())
    }

    async fn remove(&self, conversation_key: &str, slot: &str) -> Result<(), IrisError> {
        self.lock()?
            .remove(&(conversation_key.to_string(), slot.to_string()));
        Ok(())
    }

    async fn remove_if(
        &self,
        conversation_key: &str,
        slot: &str,
        expected: &Value,
    ) -> Result<bool, IrisError> {
        let mut slots = self.lock()?;
        let key = (conversation_key.to_string(), slot.to_string());
        if slots.get(&key) != Some(expected) {
            return Ok(false);
        }
        slots.remove(&key);
        Ok(true)
    }
}
