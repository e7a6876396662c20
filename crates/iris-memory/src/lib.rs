//! # iris-memory
//!
//! Conversation-scoped state stores, the OCR result stager, and the
//! SQLite telemetry log.

pub mod memory;
pub mod sqlite;
pub mod stager;
pub mod telemetry_log;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use stager::{ResultStager, StagedResult};
pub use telemetry_log::TelemetryLog;
