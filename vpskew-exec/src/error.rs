//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur while talking to the venue or running a cycle.
///
/// A venue *rejecting* a request is not an error: it comes back as an
/// acknowledgement with `accepted = false`.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Venue transport failure (timeout, disconnect, malformed reply)
    #[error("Venue error: {0}")]
    Venue(String),

    /// Venue unreachable or not initialised
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] vpskew_domain::DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] vpskew_engine::EngineError),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
