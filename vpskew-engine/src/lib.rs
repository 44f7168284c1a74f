//! vpskew Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes bars, profiles and quotes; returns signals and exit decisions.

#![warn(clippy::all)]

pub mod controller;
pub mod error;
pub mod indicators;
pub mod signal;

pub use controller::{
    AtrBrackets, ControllerConfig, EntryOrder, EntryPlan, ExitContext, ExitRule, PositionController,
    Reconciliation,
};
pub use error::{EngineError, EngineResult};
pub use indicators::{atr, true_ranges, ActivityWindow};
pub use signal::{ActivityMeasure, Evaluation, SignalConfig, SignalGenerator, TradingWindow};
