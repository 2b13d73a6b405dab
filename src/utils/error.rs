use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("{operation} timed out after {timeout:?}")]
    FetchTimeout { operation: String, timeout: Duration },

    #[error("{operation} failed: {message}")]
    FetchFailure { operation: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid repository '{value}': {reason}")]
    InvalidRepository { value: String, reason: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Selection session is no longer running")]
    SessionClosed,
}

impl SelectorError {
    pub fn fetch_failure(operation: &str, message: impl Into<String>) -> Self {
        SelectorError::FetchFailure {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// True for errors raised by a remote fetch (timeouts included).
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            SelectorError::FetchTimeout { .. } | SelectorError::FetchFailure { .. }
        )
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SelectorError::FetchTimeout { operation, .. } => {
                format!("The package service did not answer in time ({operation})")
            }
            SelectorError::FetchFailure { operation, .. } => {
                format!("Could not load data from the package service ({operation})")
            }
            SelectorError::IoError(e) => format!("Could not read a file: {e}"),
            SelectorError::SerializationError(_) => "Could not serialize the output".to_string(),
            SelectorError::InvalidRepository { value, .. } => {
                format!("'{value}' is not a valid repository address")
            }
            SelectorError::ConfigValidationError { field, .. }
            | SelectorError::InvalidConfigValueError { field, .. }
            | SelectorError::MissingConfigError { field } => {
                format!("The configuration value '{field}' is not valid")
            }
            SelectorError::SessionClosed => "The selection session has stopped".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SelectorError::FetchTimeout { .. } => {
                "Refresh again, or raise the timeout in the [refresh] section"
            }
            SelectorError::FetchFailure { .. } => {
                "Check that the enabled repositories are reachable, or switch to offline mode"
            }
            SelectorError::IoError(_) => "Make sure the file exists and is readable",
            SelectorError::SerializationError(_) => "Run again without --json",
            SelectorError::InvalidRepository { .. } => "Use an http(s) or file URL",
            SelectorError::ConfigValidationError { .. }
            | SelectorError::InvalidConfigValueError { .. }
            | SelectorError::MissingConfigError { .. } => {
                "Fix the configuration file and run again"
            }
            SelectorError::SessionClosed => "Restart the selector",
        }
    }
}

pub type Result<T> = std::result::Result<T, SelectorError>;
