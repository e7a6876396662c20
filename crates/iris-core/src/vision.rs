//! Image analysis request/result types shared by the vision client and the bots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What gets sent to the analysis service.
///
/// The variant alone decides the wire encoding: `Url` goes out as a JSON
/// `{"url": ...}` envelope, `Bytes` as a raw octet-stream body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisRequest {
    Url(String),
    Bytes(Vec<u8>),
}

impl AnalysisRequest {
    /// Short label used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// Outcome of a successful analysis call.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Describe(DescribeResult),
    Text(TextResult),
}

/// Response of the "describe" operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeResult {
    #[serde(default)]
    pub description: ImageDescription,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub metadata: Option<ImageMetadata>,
}

impl DescribeResult {
    /// Highest-ranked caption, if the service produced any.
    pub fn best_caption(&self) -> Option<&ImageCaption> {
        self.description.captions.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageDescription {
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ranked best first.
    #[serde(default)]
    pub captions: Vec<ImageCaption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCaption {
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Response of the "recognize text" (OCR) operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResult {
    /// Detected language as a BCP-47-ish code ("en", "zh-Hans", "unk").
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub text_angle: Option<f64>,
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub regions: Vec<TextRegion>,
}

impl TextResult {
    /// Flatten regions into plain text.
    ///
    /// Words are joined by spaces, lines by CRLF, and regions by a blank line.
    pub fn recognized_text(&self) -> String {
        self.regions
            .iter()
            .map(|region| {
                region
                    .lines
                    .iter()
                    .map(|line| {
                        line.words
                            .iter()
                            .map(|w| w.text.as_str())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>()
                    .join("\r\n")
            })
            .collect::<Vec<_>>()
            .join("\r\n\r\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Up,
    Down,
    Left,
    Right,
    #[serde(other)]
    NotDetected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRegion {
    #[serde(default)]
    pub bounding_box: String,
    #[serde(default)]
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLine {
    #[serde(default)]
    pub bounding_box: String,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    #[serde(default)]
    pub bounding_box: String,
    pub text: String,
}

/// A failed analysis call.
///
/// `status_code` is `None` when the request never got an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AnalysisError {
    pub status_code: Option<u16>,
    /// Service-provided detail when parseable, otherwise the status text.
    pub message: String,
    pub raw_body: Option<String>,
}

impl AnalysisError {
    /// An error raised before any response was received.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            raw_body: None,
        }
    }
}
