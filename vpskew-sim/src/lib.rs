//! vpskew Backtest Harness
//!
//! Replays a recorded `MarketTape` through the same `Cycle` pipeline the
//! live daemon runs, so a backtest produces the same decision log.
//!
//! # Components
//!
//! - **Tape**: Recorded bars and ticks (JSON)
//! - **Replay**: `VenuePort` over a tape with a replay clock
//! - **Runner**: One cycle per bar close
//! - **Report**: Trades, P&L, exit-reason histogram, audit events

#![warn(clippy::all)]

pub mod error;
pub mod replay;
pub mod report;
pub mod runner;
pub mod tape;

pub use error::{SimError, SimResult};
pub use replay::ReplayVenue;
pub use report::{BacktestReport, TradeRecord};
pub use runner::{Backtest, BacktestConfig};
pub use tape::MarketTape;
