//! Core error types and utilities

use schema::ExitOutcome;
use std::time::Duration;
use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

    /// The server wrote to stderr before announcing readiness.
    /// Displays the server's text verbatim.
    #[error("{message}")]
    StartupFailure { message: String },

    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    #[error("Server exited with {outcome}")]
    AbnormalExit { outcome: ExitOutcome },

    #[error("Server exited with {outcome} before announcing readiness")]
    ExitedBeforeReady { outcome: ExitOutcome },

    #[error("No handshake from server within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::ProcessSpawn(_) => "CORE004",
            CoreError::ProcessWait(_) => "CORE005",
            CoreError::ProcessSignal(_) => "CORE006",
            CoreError::StartupFailure { .. } => "CORE007",
            CoreError::InvalidHandshake(_) => "CORE008",
            CoreError::AbnormalExit { .. } => "CORE009",
            CoreError::ExitedBeforeReady { .. } => "CORE010",
            CoreError::HandshakeTimeout(_) => "CORE011",
            CoreError::IoError(_) => "CORE012",
            CoreError::SerializationError(_) => "CORE013",
        }
    }

    /// Exit information carried by exit-related errors
    pub fn exit_outcome(&self) -> Option<&ExitOutcome> {
        match self {
            CoreError::AbnormalExit { outcome } | CoreError::ExitedBeforeReady { outcome } => {
                Some(outcome)
            }
            _ => None,
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
