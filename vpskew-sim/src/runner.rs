//! Backtest runner.
//!
//! Drives the same `Cycle` the daemon runs, once per replayed bar close,
//! against a `ReplayVenue`.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use vpskew_domain::{FixedLot, Quantity};
use vpskew_engine::{ControllerConfig, PositionController, SignalConfig, SignalGenerator};
use vpskew_exec::{Cycle, CycleConfig, MemoryAuditSink, VenuePort};

use crate::error::SimResult;
use crate::replay::ReplayVenue;
use crate::report::{BacktestReport, TradeRecord};
use crate::tape::MarketTape;

/// Backtest settings
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub signal: SignalConfig,
    pub controller: ControllerConfig,
    /// Timeframe is taken from the tape
    pub cycle: CycleConfig,
    /// Fixed volume per entry
    pub lot: Decimal,
    pub initial_balance: Decimal,
    /// Bars replayed before the first cycle (activity baseline warm-up)
    pub warmup_bars: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            signal: SignalConfig::default(),
            controller: ControllerConfig::default(),
            cycle: CycleConfig::default(),
            lot: dec!(0.01),
            initial_balance: dec!(10000),
            warmup_bars: 20,
        }
    }
}

/// Replays a tape through the live cycle pipeline
#[derive(Debug, Clone, Default)]
pub struct Backtest {
    config: BacktestConfig,
}

impl Backtest {
    /// Create a backtest
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    /// Settings in use
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the tape to the end.
    ///
    /// Positions still open when the tape ends are reported, not closed.
    pub async fn run(&self, tape: MarketTape) -> SimResult<BacktestReport> {
        tape.validate()?;
        let lot = Quantity::new(self.config.lot)?;
        let timeframe = tape.timeframe;
        let instrument = tape.instrument.clone();
        let bar_closes: Vec<_> = tape.bars.iter().map(|b| b.close_time(timeframe)).collect();
        let warmup = self.config.warmup_bars.min(bar_closes.len());

        let venue = Arc::new(ReplayVenue::new(tape, self.config.initial_balance));
        venue.health_check().await?;

        let audit = MemoryAuditSink::new();
        let generator = SignalGenerator::new(self.config.signal.clone())?;
        let controller = PositionController::new(instrument, self.config.controller.clone())?;
        let cycle_config = CycleConfig {
            timeframe,
            ..self.config.cycle.clone()
        };
        let mut cycle = Cycle::new(
            venue.clone(),
            generator,
            controller,
            Box::new(FixedLot::new(lot)),
            cycle_config,
        )?
        .with_audit(Box::new(audit.clone()));

        if let Some(last_warmup) = warmup.checked_sub(1).map(|i| bar_closes[i]) {
            venue.advance_to(last_warmup);
        }
        cycle.bootstrap().await?;

        let mut cycles = 0;
        let mut failed = 0;
        let mut signals = 0;
        let mut trades = Vec::new();

        for &close in &bar_closes[warmup..] {
            venue.advance_to(close);
            cycles += 1;
            match cycle.run_once(close).await {
                Ok(report) => {
                    if report.signal.is_some() {
                        signals += 1;
                    }
                    trades.extend(report.closed.iter().map(|c| TradeRecord::from_closed(c, close)));
                },
                Err(e) => {
                    failed += 1;
                    warn!(%close, error = %e, "Cycle failed");
                },
            }
        }

        let open_at_end = cycle.controller().open_count();
        let report = BacktestReport::new(cycles, failed, signals, trades, open_at_end, audit.take());
        info!(
            cycles = report.cycles,
            trades = report.trades.len(),
            net_pnl = %report.net_pnl,
            balance = %venue.balance(),
            "Backtest complete"
        );
        Ok(report)
    }
}
