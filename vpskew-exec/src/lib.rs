//! vpskew Execution Layer
//!
//! Venue ports and the one-pass cycle pipeline shared by the live daemon
//! and the backtest harness.
//!
//! # Architecture
//!
//! ```text
//! Venue (bars, ticks, quote) → Cycle → Generator / Controller → Executor → Venue
//!                                   ↘ AuditSink
//! ```
//!
//! # Components
//!
//! - **Ports**: `VenuePort`, the trait every venue adapter implements
//! - **Executor**: Turns controller decisions into venue requests
//! - **Cycle**: One full signal + entry + exit pass
//! - **Audit**: Sinks receiving every cycle decision as an `Event`
//! - **Stub**: In-memory venue for development and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use vpskew_exec::{Cycle, CycleConfig, StubVenue};
//! use std::sync::Arc;
//!
//! let venue = Arc::new(StubVenue::new(dec!(1000)));
//! let mut cycle = Cycle::new(venue, generator, controller, Box::new(sizing), CycleConfig::default())?;
//!
//! cycle.bootstrap().await?;
//! let report = cycle.run_once(Utc::now()).await?;
//! ```

#![warn(clippy::all)]

pub mod audit;
pub mod cycle;
pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use audit::{AuditSink, MemoryAuditSink, TracingAuditSink, AUDIT_TARGET};
pub use cycle::{ClosedPosition, Cycle, CycleConfig, CycleReport};
pub use error::{ExecError, ExecResult};
pub use executor::{ActionResult, Executor, ORDER_COMMENT};
pub use ports::{AccountInfo, OrderRequest, VenueAck, VenuePort};
pub use stub::StubVenue;
