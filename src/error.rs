//! Error types for the signal pipeline

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Context unavailable: {0}")]
    ContextUnavailable(String),

    // Analyzer errors (isolated per task, never abort a cycle)
    #[error("Analyzer {analyzer} failed: {reason}")]
    Analyzer { analyzer: String, reason: String },

    #[error("Analyzer {analyzer} timed out after {timeout_ms}ms")]
    AnalyzerTimeout { analyzer: String, timeout_ms: u64 },

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Persistence failed after {attempts} attempts: {last_error}")]
    PersistenceExhausted { attempts: u32, last_error: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Build an analyzer error from any displayable reason
    pub fn analyzer(analyzer: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Analyzer {
            analyzer: analyzer.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::Io(_))
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
