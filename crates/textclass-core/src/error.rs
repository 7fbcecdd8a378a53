//! Error types for textclass

/// Result type alias using textclass's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for textclass operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Classifier construction, prediction or training errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Malformed command lines and unexpected peer behaviour
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A frame header announced more bytes than the channel accepts
    #[error("frame of {len} bytes exceeds the maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Lookup of a classifier name that is not in the registry
    #[error("Unknown classifier: {0}")]
    UnknownClassifier(String),

    /// A value that is not one of the accepted literals
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// The peer closed the connection before answering
    #[error("connection closed")]
    ConnectionClosed,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short, stable label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classifier(_) => "classifier",
            Self::Protocol(_) => "protocol",
            Self::FrameTooLarge { .. } => "frame_too_large",
            Self::UnknownClassifier(_) => "unknown_classifier",
            Self::InvalidValue(_) => "invalid_value",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::Internal(_) => "internal",
        }
    }
}
