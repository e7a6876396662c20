//! # iris-core
//!
//! Core types, traits, configuration, and error handling shared by the Iris bots.

pub mod config;
pub mod correlation;
pub mod error;
pub mod message;
pub mod sanitize;
pub mod telemetry;
pub mod traits;
pub mod vision;

pub use config::shellexpand;
