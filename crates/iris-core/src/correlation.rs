//! Correlation ids: one token per logical operation, carried on the [`Address`].
//!
//! A consent proposal and the decision that answers it arrive as separate
//! activities. The proposal embeds the id in the card context, the decision
//! handler restores it with [`set`], and every telemetry record in between
//! reads it with [`get`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::message::Address;

/// Opaque token linking a proposal, its decision, and telemetry records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Return the address's correlation id, minting and attaching one if absent.
pub fn ensure(address: &mut Address) -> CorrelationId {
    address
        .correlation_id
        .get_or_insert_with(CorrelationId::new)
        .clone()
}

/// Replace the address's correlation id.
pub fn set(address: &mut Address, id: CorrelationId) {
    address.correlation_id = Some(id);
}

/// The address's correlation id, if one was attached.
pub fn get(address: &Address) -> Option<CorrelationId> {
    address.correlation_id.clone()
}
