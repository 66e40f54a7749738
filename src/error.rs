//! Error handling for the Moodflix client

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Transport failure or non-success status from the backend
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or empty payload, rejected before it was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Capture device denied, absent or lost
    #[error("Device error: {0}")]
    Device(String),

    /// Completion arrived after the orchestrator moved past the operation
    #[error("Stale {operation} result (ticket epoch {ticket_epoch}, now {current_epoch})")]
    StaleResult {
        operation: &'static str,
        ticket_epoch: u64,
        current_epoch: u64,
    },

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable code for log fields
    pub fn code(&self) -> &'static str {
        match self {
            Error::Network(_) => "NETWORK_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Device(_) => "DEVICE_ERROR",
            Error::StaleResult { .. } => "STALE_RESULT",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Image(_) => "IMAGE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// reqwest errors carry a non-Clone source, so the message is captured instead
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Network(format!("malformed response body: {}", e))
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}
