//! # iris-channels
//!
//! Chat platform connectors for Iris.

pub mod teams;

pub use teams::{HttpUploader, TeamsChannel};
