//! # iris-vision
//!
//! Client for the remote image analysis service (describe and OCR).

pub mod azure;

pub use azure::VisionClient;
