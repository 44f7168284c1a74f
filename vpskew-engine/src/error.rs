//! Engine error types.

use thiserror::Error;
use vpskew_domain::{DomainError, PositionId};

/// Invariant violations detected by the decision layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Admitting another position would break the cap
    #[error("Position cap reached: {open} open, max {max}")]
    PositionCapReached {
        /// Currently open positions
        open: usize,
        /// Configured cap
        max: usize,
    },

    /// Position is not in the live set
    #[error("Unknown position: {0}")]
    UnknownPosition(PositionId),

    /// Position id already in the live set
    #[error("Duplicate position: {0}")]
    DuplicatePosition(PositionId),

    /// Configuration rejected at construction
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
