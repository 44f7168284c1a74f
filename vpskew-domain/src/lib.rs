//! vpskew Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains value objects, market data, the volume profile,
//! trailing-stop rules, positions and audit events.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod events;
pub mod market_data;
pub mod profile;
pub mod sizing;
pub mod trailing;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{ExitDecision, ExitReason, Position, PositionId, PositionState, Signal};
pub use events::{Event, SkipReason};
pub use market_data::{Bar, BarRange, Quote, Tick, Timeframe};
pub use profile::{aggregate, analyze, opposing_volume_fraction, Histogram, ValueArea, VolumeProfile};
pub use sizing::{FixedLot, LotRules, MarginCapped, RiskParams, RiskPercent, SizingPolicy};
pub use trailing::{TrailingRule, TrailingStopUpdate};
pub use value_objects::{Direction, DomainError, Instrument, Price, Quantity, Symbol};
