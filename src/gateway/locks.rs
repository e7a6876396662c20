//! Per-conversation serialization of message handling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// One async lock per conversation key, dropped once nobody holds or waits on it.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ConversationLocks {
    /// Run `work` while holding the lock for `key`. Work for the same key runs
    /// in the order the lock was requested.
    pub async fn run<F: Future>(&self, key: &str, work: F) -> F::Output {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(key.to_string()).or_default().clone()
        };

        let output = {
            let _guard = lock.lock().await;
            work.await
        };

        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map and this call still reference the lock.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        output
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}
