//! Daemon error types.

use thiserror::Error;
use vpskew_domain::DomainError;
use vpskew_engine::EngineError;
use vpskew_exec::ExecError;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Venue unreachable or not initialised at startup
    #[error("Startup failed: {0}")]
    Startup(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
