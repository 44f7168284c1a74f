//! vpskew Daemon Library
//!
//! Runtime host for the volume-profile skew strategy.
//!
//! # Architecture
//!
//! ```text
//! minute boundary → Cycle::run_once → SignalGenerator → PositionController → Executor → Venue
//!                         ↑
//!                   Config (env / .env)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vpskewd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     Daemon::new_stub(config).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;

pub use clock::{next_minute_boundary, sleep_until_next};
pub use config::{Config, Environment, InstrumentConfig, SizingConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
