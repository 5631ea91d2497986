use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed pattern, path filter or query parameter
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Caller violated an input contract (duplicate repositories, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Index service required but not usable
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Index or backend search service failure
    #[error("Service error ({service}): {message}")]
    Service { service: String, message: String },

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The shared cancellation scope was cancelled
    #[error("Search cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            AppError::Service { .. } => "SERVICE_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Cancelled => "CANCELLED",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error should be reported to the caller as a bad request
    pub fn is_bad_request(&self) -> bool {
        matches!(self, AppError::BadRequest(_) | AppError::InvalidInput(_))
    }

    /// Whether the error was caused purely by cancellation or a deadline
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::Cancelled | AppError::Timeout(_))
    }

    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Service {
            service: service.into(),
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
