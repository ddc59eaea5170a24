use thiserror::Error;

/// Main error type for the classifier service
#[derive(Error, Debug)]
pub enum DigitError {
    // Startup errors (fatal)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Schema error: {0}")]
    Schema(String),

    // Per-request errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid label: {0} (expected an integer in 0..=9)")]
    InvalidLabel(i64),

    #[error("Numeric error: {0}")]
    Numeric(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigitError {
    /// Short, stable name of the error class (used in diagnostics).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Settings(_) => "SettingsError",
            Self::Schema(_) => "SchemaError",
            Self::InvalidInput(_) => "InvalidInputError",
            Self::InvalidLabel(_) => "InvalidLabelError",
            Self::Numeric(_) => "NumericError",
            Self::Json(_) => "JsonError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Errors caused by the caller's payload rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidLabel(_))
    }

    /// Errors that leave the process without a usable parameter set.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Settings(_) | Self::Schema(_))
    }
}

/// Result type alias for DigitError
pub type Result<T> = std::result::Result<T, DigitError>;
