//! Main daemon runtime.
//!
//! The Daemon owns the venue and drives one Cycle per minute boundary.
//!
//! # Lifecycle
//!
//! 1. Health-check the venue (fatal on failure)
//! 2. Build the cycle from configuration
//! 3. Seed the activity baseline and adopt open positions
//! 4. Sleep to each minute boundary, then run one cycle
//! 5. Stop on SIGINT between cycles

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};
use vpskew_engine::{PositionController, SignalGenerator};
use vpskew_exec::{Cycle, StubVenue, VenuePort};

use crate::clock::sleep_until_next;
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Daemon
// =============================================================================

/// Main daemon runtime.
pub struct Daemon<V: VenuePort> {
    /// Configuration
    config: Config,
    /// Venue adapter
    venue: Arc<V>,
}

impl Daemon<StubVenue> {
    /// Create a daemon backed by the in-memory stub venue.
    pub fn new_stub(config: Config) -> Self {
        Self::new(config, Arc::new(StubVenue::new(dec!(10000))))
    }
}

impl<V: VenuePort + 'static> Daemon<V> {
    /// Create a daemon for the given venue.
    pub fn new(config: Config, venue: Arc<V>) -> Self {
        Self { config, venue }
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the cycle pipeline from configuration.
    pub fn build_cycle(&self) -> DaemonResult<Cycle<V>> {
        let instrument = self.config.instrument()?;
        let generator = SignalGenerator::new(self.config.signal.clone())?;
        let controller = PositionController::new(instrument, self.config.controller.clone())?;
        let sizing = self.config.sizing_policy()?;
        let cycle = Cycle::new(self.venue.clone(), generator, controller, sizing, self.config.cycle.clone())?;
        Ok(cycle)
    }

    /// Verify the venue, then build and bootstrap the cycle.
    pub async fn start(&self) -> DaemonResult<Cycle<V>> {
        self.venue
            .health_check()
            .await
            .map_err(|e| DaemonError::Startup(format!("venue health check failed: {e}")))?;

        let mut cycle = self.build_cycle()?;
        cycle
            .bootstrap()
            .await
            .map_err(|e| DaemonError::Startup(format!("bootstrap failed: {e}")))?;
        Ok(cycle)
    }

    /// Run the daemon until SIGINT.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            environment = %self.config.environment,
            symbol = %self.config.instrument.symbol,
            timeframe = ?self.config.cycle.timeframe,
            "Starting vpskew daemon"
        );

        let mut cycle = self.start().await?;

        info!("Entering cycle loop");
        loop {
            let wait = sleep_until_next(Utc::now(), self.config.boundary_settle);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let now = Utc::now();
                    match cycle.run_once(now).await {
                        Ok(report) => {
                            if report.rejected > 0 {
                                warn!(
                                    cycle_id = %report.cycle_id,
                                    rejected = report.rejected,
                                    "Venue rejected actions this cycle"
                                );
                            }
                            info!(
                                cycle_id = %report.cycle_id,
                                skip_reason = ?report.skip_reason,
                                signal = report.signal.is_some(),
                                entry = ?report.entry,
                                stop_updates = report.stop_updates.len(),
                                closed = report.closed.len(),
                                open_positions = report.open_positions,
                                "Cycle complete"
                            );
                        },
                        Err(e) => {
                            error!(error = %e, "Cycle aborted");
                        },
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!(open_positions = cycle.controller().open_count(), "Shutdown complete");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
