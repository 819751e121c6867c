//! Error types for Switchyard
//!
//! Provides a unified error type and domain-specific error variants

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using SwitchyardError
pub type Result<T> = std::result::Result<T, SwitchyardError>;

/// Unified error type for Switchyard operations
#[derive(Debug, Error)]
pub enum SwitchyardError {
    // Configuration errors are fatal to startup
    #[error("Configuration error: {0}")]
    Config(String),

    // Launch errors mark the workload dead; the engine keeps going
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    // Process supervision errors
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[error("Unknown workload id: {0}")]
    UnknownWorkload(u32),

    // Pricing collaborator errors
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while starting a supervised process
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Path '{}' does not exist", .0.display())]
    PathNotFound(PathBuf),

    #[error("File '{}' does not exist", .0.display())]
    CommandNotFound(PathBuf),

    #[error("No command configured for this mode")]
    EmptyCommand,

    #[error("Failed to spawn process: {0}")]
    Spawn(String),
}

/// Errors raised by price collaborators
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("Price service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Malformed price payload: {0}")]
    MalformedPayload(String),

    #[error("Profit calculation overflow")]
    Overflow,
}

// Implement From for common external error types
impl From<serde_json::Error> for SwitchyardError {
    fn from(err: serde_json::Error) -> Self {
        SwitchyardError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SwitchyardError {
    fn from(err: std::io::Error) -> Self {
        SwitchyardError::Io(err.to_string())
    }
}

impl From<anyhow::Error> for SwitchyardError {
    fn from(err: anyhow::Error) -> Self {
        SwitchyardError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_display() {
        let err = SwitchyardError::Launch(LaunchError::PathNotFound(PathBuf::from("/opt/miners")));
        assert!(err.to_string().contains("/opt/miners"));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "activity.log");
        let err: SwitchyardError = io.into();
        assert!(matches!(err, SwitchyardError::Io(ref msg) if msg.contains("activity.log")));
    }
}
