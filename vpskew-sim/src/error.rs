//! Backtest error types.

use thiserror::Error;

/// Errors raised while loading a tape or running a backtest.
#[derive(Debug, Error)]
pub enum SimError {
    /// Tape file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tape is not valid JSON for `MarketTape`
    #[error("Tape parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Tape content is inconsistent
    #[error("Invalid tape: {0}")]
    InvalidTape(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] vpskew_domain::DomainError),

    /// Engine error (bad thresholds)
    #[error("Engine error: {0}")]
    Engine(#[from] vpskew_engine::EngineError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] vpskew_exec::ExecError),
}

/// Result type for backtest operations.
pub type SimResult<T> = Result<T, SimError>;
