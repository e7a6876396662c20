use thiserror::Error;

/// Top-level error type for Iris.
#[derive(Debug, Error)]
pub enum IrisError {
    /// Error from the image analysis service.
    #[error("vision error: {0}")]
    Vision(#[from] crate::vision::AnalysisError),

    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Conversation state or telemetry storage error.
    #[error("memory error: {0}")]
    Memory(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure writing a staged result to the platform's upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("{0}")]
    Transport(String),

    /// The endpoint answered with something other than 200 or 201.
    #[error("{reason}")]
    Status { status: u16, reason: String },
}

impl UploadError {
    /// HTTP status of the failed upload, if the endpoint answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(_) => None,
            Self::Status { status, .. } => Some(*status),
        }
    }
}
