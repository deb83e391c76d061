//! Error types for the wizard engine.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid wizard definition: {0}")]
    InvalidDefinition(String),
}

/// Persistence port errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Failures of the external verification module.
///
/// `LoadFailed`, `NotReady` and `Timeout` are the three ways the module can
/// be unavailable; `Call` is an operation that threw after it became ready.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Verification module failed to load: {reason}")]
    LoadFailed { reason: String },

    #[error("Verification module loaded but not ready after {polls} polls")]
    NotReady { polls: u32 },

    #[error("Timed out waiting for verification module (waited {waited:?})")]
    Timeout { waited: Duration },

    #[error("{reason}")]
    Call { operation: String, reason: String },
}

impl CollaboratorError {
    /// Build a `Call` error for a named operation.
    pub fn call(operation: &str, reason: impl Into<String>) -> Self {
        Self::Call {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that decide which branch of the flow mounts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    #[error("Verification module unavailable: {0}")]
    Unavailable(#[from] CollaboratorError),

    #[error("Session blocked{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Blocked { reason: Option<String> },
}

/// Local field validation failure. Never sent over the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Submission failures, both recoverable by retrying the same step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Submission rejected: {message}")]
    Rejected { message: String },

    #[error("Submission failed: {message}")]
    Failed { message: String },
}

impl SubmissionError {
    /// The user-facing message.
    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message } | Self::Failed { message } => message,
        }
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
