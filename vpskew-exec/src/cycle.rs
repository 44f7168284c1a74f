//! One-pass cycle pipeline.
//!
//! `Cycle::run_once` performs a full cycle against any `VenuePort`:
//!
//! ```text
//! reconcile → closed bar → ATR / activity → ticks → profile → signal
//!           → entry admission → sizing → order
//!           → exit evaluation over every open position → stop / close requests
//! ```
//!
//! The live daemon calls it once per minute boundary; the backtest calls
//! it once per replayed bar. Both get the same audit events.
//!
//! Reads that fail (bars, ticks, quotes, positions) abort the cycle with an
//! error; the caller logs it and waits for the next boundary. Writes that
//! the venue refuses are recorded and leave the controller untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vpskew_domain::{
    aggregate, analyze, Bar, BarRange, Event, ExitDecision, ExitReason, Instrument, Position, PositionId, Price, RiskParams,
    Signal, SizingPolicy, SkipReason, Symbol, Tick, Timeframe, VolumeProfile,
};
use vpskew_engine::{atr, ActivityMeasure, ActivityWindow, ExitContext, PositionController, SignalGenerator};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::error::{ExecError, ExecResult};
use crate::executor::{ActionResult, Executor};
use crate::ports::VenuePort;

// =============================================================================
// Config
// =============================================================================

/// Driver-level settings not owned by the generator or the controller
#[derive(Debug, Clone, PartialEq)]
pub struct CycleConfig {
    pub timeframe: Timeframe,
    /// Bars in the rolling activity baseline
    pub activity_lookback: usize,
    /// Look-back of the cluster-pressure tick window
    pub cluster_window: Duration,
    /// Most recent ticks kept for cluster pressure
    pub cluster_max_ticks: usize,
    /// Fraction of balance risked per entry (risk-based sizing)
    pub risk_fraction: Decimal,
    /// Account value of one point for one lot
    pub point_value: Decimal,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::M1,
            activity_lookback: 200,
            cluster_window: Duration::seconds(10),
            cluster_max_ticks: 100,
            risk_fraction: dec!(0.01),
            point_value: dec!(1),
        }
    }
}

impl CycleConfig {
    /// Validate settings
    pub fn validate(&self) -> ExecResult<()> {
        if self.activity_lookback == 0 {
            return Err(ExecError::InvalidState("activity_lookback must be > 0".to_string()));
        }
        if self.cluster_window <= Duration::zero() || self.cluster_max_ticks == 0 {
            return Err(ExecError::InvalidState("cluster window must be non-empty".to_string()));
        }
        if self.risk_fraction <= Decimal::ZERO || self.point_value <= Decimal::ZERO {
            return Err(ExecError::InvalidState("risk_fraction and point_value must be > 0".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Report
// =============================================================================

/// A position the venue confirmed closed during a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position: Position,
    pub reason: ExitReason,
    pub exit_price: Price,
}

impl ClosedPosition {
    /// Realised P&L in price units times volume
    pub fn pnl(&self) -> Decimal {
        self.position.pnl(self.exit_price)
    }
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Open time of the evaluated bar (None when skipped before evaluation)
    pub bar_time: Option<DateTime<Utc>>,
    pub skip_reason: Option<SkipReason>,
    pub signal: Option<Signal>,
    /// Position opened this cycle
    pub entry: Option<PositionId>,
    /// Accepted stop revisions
    pub stop_updates: Vec<(PositionId, Price)>,
    /// Accepted closes
    pub closed: Vec<ClosedPosition>,
    /// Positions the venue no longer reported
    pub dropped: Vec<PositionId>,
    /// Venue writes refused (or lost in transport) plus refused entries
    pub rejected: usize,
    /// Open positions at the end of the cycle
    pub open_positions: usize,
}

impl CycleReport {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            bar_time: None,
            skip_reason: None,
            signal: None,
            entry: None,
            stop_updates: Vec::new(),
            closed: Vec::new(),
            dropped: Vec::new(),
            rejected: 0,
            open_positions: 0,
        }
    }
}

// =============================================================================
// Cycle
// =============================================================================

/// Owns every piece of per-instrument state the driver carries between cycles.
pub struct Cycle<V: VenuePort> {
    venue: Arc<V>,
    executor: Executor<V>,
    symbol: Symbol,
    instrument: Instrument,
    generator: SignalGenerator,
    controller: PositionController,
    sizing: Box<dyn SizingPolicy>,
    activity: ActivityWindow,
    config: CycleConfig,
    audit: Box<dyn AuditSink>,
    last_evaluated_bar: Option<DateTime<Utc>>,
}

impl<V: VenuePort> Cycle<V> {
    /// Assemble a cycle; events go to `TracingAuditSink` unless replaced
    /// with `with_audit`.
    pub fn new(
        venue: Arc<V>,
        generator: SignalGenerator,
        controller: PositionController,
        sizing: Box<dyn SizingPolicy>,
        config: CycleConfig,
    ) -> ExecResult<Self> {
        config.validate()?;
        let instrument = controller.instrument().clone();
        let symbol = instrument.symbol().clone();
        Ok(Self {
            executor: Executor::new(venue.clone(), symbol.clone()),
            venue,
            symbol,
            instrument,
            generator,
            controller,
            sizing,
            activity: ActivityWindow::new(config.activity_lookback),
            config,
            audit: Box::new(TracingAuditSink),
            last_evaluated_bar: None,
        })
    }

    /// Replace the audit sink
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Position controller
    pub fn controller(&self) -> &PositionController {
        &self.controller
    }

    /// Rolling activity baseline
    pub fn activity(&self) -> &ActivityWindow {
        &self.activity
    }

    /// Traded instrument
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Open time of the newest evaluated bar
    pub fn last_evaluated_bar(&self) -> Option<DateTime<Utc>> {
        self.last_evaluated_bar
    }

    /// Seed the activity baseline and adopt the venue's open positions.
    pub async fn bootstrap(&mut self) -> ExecResult<()> {
        let bars = self
            .venue
            .get_recent_bars(&self.symbol, self.config.timeframe, 1, self.config.activity_lookback)
            .await?;

        match self.generator.config().activity_measure {
            ActivityMeasure::TickCount => self.activity.seed(&bars),
            ActivityMeasure::TickVolume => self.seed_tick_volume(&bars).await?,
        }

        let cycle_id = Uuid::now_v7();
        let venue_positions = self.venue.list_open_positions(&self.symbol).await?;
        let reconciliation = self.controller.reconcile(&venue_positions);
        if !reconciliation.is_noop() {
            self.audit.record(&Event::PositionsReconciled {
                cycle_id,
                dropped: reconciliation.dropped,
                adopted: reconciliation.adopted,
                timestamp: Utc::now(),
            });
        }

        info!(
            symbol = %self.symbol,
            baseline_bars = self.activity.len(),
            baseline = ?self.activity.average(),
            open_positions = self.controller.open_count(),
            "Cycle bootstrapped"
        );
        Ok(())
    }

    async fn seed_tick_volume(&mut self, bars: &[Bar]) -> ExecResult<()> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Ok(());
        };
        let timeframe = self.config.timeframe;
        let ticks = self
            .venue
            .get_ticks(&self.symbol, first.open_time, last.close_time(timeframe))
            .await?;

        let mut per_bar: BTreeMap<DateTime<Utc>, Decimal> = bars.iter().map(|b| (b.open_time, Decimal::ZERO)).collect();
        for tick in &ticks {
            if let Some((_, volume)) = per_bar.range_mut(..=tick.time).next_back() {
                *volume += tick.weight();
            }
        }
        for (open_time, volume) in per_bar {
            self.activity.record(open_time, volume);
        }
        Ok(())
    }

    /// Run one full cycle at wall-clock `now`.
    pub async fn run_once(&mut self, now: DateTime<Utc>) -> ExecResult<CycleReport> {
        let cycle_id = Uuid::now_v7();
        let mut report = CycleReport::new(cycle_id);

        // 1. Venue is the source of truth for what is open
        let venue_positions = self.venue.list_open_positions(&self.symbol).await?;
        let reconciliation = self.controller.reconcile(&venue_positions);
        if !reconciliation.is_noop() {
            report.dropped = reconciliation.dropped.clone();
            self.audit.record(&Event::PositionsReconciled {
                cycle_id,
                dropped: reconciliation.dropped,
                adopted: reconciliation.adopted,
                timestamp: now,
            });
        }

        // 2. Signal over the newest closed bar
        let bars = self
            .venue
            .get_recent_bars(
                &self.symbol,
                self.config.timeframe,
                1,
                self.generator.config().atr_period + 1,
            )
            .await?;
        let atr_value = atr(&bars, self.generator.config().atr_period);
        let signal = self.evaluate_bar(cycle_id, now, &bars, atr_value, &mut report).await?;

        // 3. Entry
        if let Some(signal) = &signal {
            self.enter(cycle_id, signal, atr_value, now, &mut report).await?;
        }
        report.signal = signal;

        // 4. Exits over every open position
        if self.controller.open_count() > 0 {
            // A bar already seen last cycle says nothing new about crossings
            let bar_range = report
                .bar_time
                .and_then(|_| bars.last())
                .map(|b| b.range(self.config.timeframe));
            self.manage_exits(cycle_id, now, bar_range, &mut report).await?;
        }

        report.open_positions = self.controller.open_count();
        debug!(
            %cycle_id,
            skip = report.skip_reason.map(|r| r.as_str()),
            entry = ?report.entry,
            stop_updates = report.stop_updates.len(),
            closed = report.closed.len(),
            open = report.open_positions,
            "Cycle complete"
        );
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Signal
    // -------------------------------------------------------------------------

    async fn evaluate_bar(
        &mut self,
        cycle_id: Uuid,
        now: DateTime<Utc>,
        bars: &[Bar],
        atr_value: Option<Decimal>,
        report: &mut CycleReport,
    ) -> ExecResult<Option<Signal>> {
        let Some(bar) = bars.last() else {
            self.skip_cycle(cycle_id, now, SkipReason::NoBars, report);
            return Ok(None);
        };
        if self.last_evaluated_bar.is_some_and(|last| bar.open_time <= last) {
            self.skip_cycle(cycle_id, now, SkipReason::StaleBar, report);
            return Ok(None);
        }
        report.bar_time = Some(bar.open_time);
        self.last_evaluated_bar = Some(bar.open_time);

        // Baseline excludes the bar under evaluation
        let average = self.activity.average().unwrap_or(Decimal::ZERO);

        let mut profile: Option<VolumeProfile> = None;
        if self.generator.in_trading_window(bar.open_time) && atr_value.is_some() {
            let ticks = self
                .venue
                .get_ticks(&self.symbol, bar.open_time, bar.close_time(self.config.timeframe))
                .await?;
            if ticks.is_empty() {
                if self.generator.config().activity_measure == ActivityMeasure::TickCount {
                    self.activity.record(bar.open_time, Decimal::from(bar.tick_volume));
                }
                self.skip_cycle(cycle_id, now, SkipReason::NoTicks, report);
                return Ok(None);
            }
            let histogram = aggregate(&ticks, self.instrument.price_step());
            profile = analyze(&histogram, self.generator.config().coverage);
        }

        let evaluation = self.generator.generate(bar, profile.as_ref(), average, atr_value);
        let activity = self.generator.activity(bar, profile.as_ref());
        if profile.is_some() || self.generator.config().activity_measure == ActivityMeasure::TickCount {
            self.activity.record(bar.open_time, activity);
        }

        report.skip_reason = evaluation.skip_reason();
        let signal = evaluation.signal().cloned();

        self.audit.record(&Event::SignalEvaluated {
            cycle_id,
            bar_time: bar.open_time,
            direction: signal.as_ref().map(|s| s.direction),
            skip_reason: evaluation.skip_reason(),
            point_of_control: profile.as_ref().map(|p| p.point_of_control()),
            skew: profile.as_ref().map(|p| p.skew()),
            activity,
            activity_average: average,
            atr: atr_value,
            timestamp: now,
        });

        if let Some(signal) = &signal {
            info!(
                %cycle_id,
                bar = %bar.open_time,
                direction = %signal.direction,
                poc = %signal.reference_price,
                skew = %signal.strength,
                "Signal"
            );
        }
        Ok(signal)
    }

    fn skip_cycle(&self, cycle_id: Uuid, now: DateTime<Utc>, reason: SkipReason, report: &mut CycleReport) {
        info!(%cycle_id, reason = reason.as_str(), "Cycle skipped");
        report.skip_reason = Some(reason);
        self.audit.record(&Event::CycleSkipped {
            cycle_id,
            reason,
            timestamp: now,
        });
    }

    // -------------------------------------------------------------------------
    // Entry
    // -------------------------------------------------------------------------

    async fn enter(
        &mut self,
        cycle_id: Uuid,
        signal: &Signal,
        atr_value: Option<Decimal>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> ExecResult<()> {
        self.controller.observe_signal(signal);

        let quote = self.venue.get_current_quote(&self.symbol).await?;
        let plan = match self.controller.plan_entry(signal, &quote, atr_value) {
            Ok(plan) => plan,
            Err(e) => {
                self.reject_entry(cycle_id, signal, e.to_string(), now, report);
                return Ok(());
            },
        };

        let account = if self.sizing.needs_account() {
            Some(self.venue.get_account().await?)
        } else {
            None
        };
        let risk = RiskParams {
            risk_fraction: self.config.risk_fraction,
            stop_distance_points: plan.stop_distance_points,
            point_value: self.config.point_value,
            free_margin: account.map(|a| a.free_margin),
        };
        let balance = account.map(|a| a.balance).unwrap_or(Decimal::ZERO);
        let volume = match self.sizing.size_position(balance, &risk) {
            Ok(volume) => volume,
            Err(e) => {
                self.reject_entry(cycle_id, signal, e.to_string(), now, report);
                return Ok(());
            },
        };
        debug!(policy = self.sizing.name(), %volume, %balance, "Position sized");

        let order = plan.with_volume(volume);
        let result = self.executor.enter(&order).await;

        let (accepted, position_id, reason) = match result {
            ActionResult::Accepted {
                position_id: Some(id),
                price,
            } => {
                let fill = price.unwrap_or(order.price);
                let position = Position::new(id.clone(), self.symbol.clone(), order.direction, fill, order.volume, now)
                    .with_bracket(order.stop, order.take_profit);
                if let Err(e) = self.controller.confirm_entry(position) {
                    // Venue holds it; the next reconciliation adopts it
                    error!(position_id = %id, error = %e, "Accepted entry not recorded");
                } else {
                    report.entry = Some(id.clone());
                }
                (true, Some(id), None)
            },
            ActionResult::Accepted { position_id: None, .. } => {
                warn!("Entry accepted without a ticket, relying on reconciliation");
                (true, None, None)
            },
            ActionResult::Rejected { reason } => {
                report.rejected += 1;
                (false, None, Some(reason))
            },
        };

        self.audit.record(&Event::EntrySent {
            cycle_id,
            direction: order.direction,
            price: order.price,
            volume: order.volume,
            stop: order.stop,
            take_profit: order.take_profit,
            accepted,
            position_id,
            reason,
            timestamp: now,
        });
        Ok(())
    }

    fn reject_entry(&self, cycle_id: Uuid, signal: &Signal, reason: String, now: DateTime<Utc>, report: &mut CycleReport) {
        warn!(
            %cycle_id,
            direction = %signal.direction,
            open = self.controller.open_count(),
            %reason,
            "Entry rejected"
        );
        report.rejected += 1;
        self.audit.record(&Event::EntryRejected {
            cycle_id,
            direction: signal.direction,
            reason,
            open_positions: self.controller.open_count(),
            timestamp: now,
        });
    }

    // -------------------------------------------------------------------------
    // Exits
    // -------------------------------------------------------------------------

    async fn manage_exits(
        &mut self,
        cycle_id: Uuid,
        now: DateTime<Utc>,
        bar_range: Option<BarRange>,
        report: &mut CycleReport,
    ) -> ExecResult<()> {
        let quote = self.venue.get_current_quote(&self.symbol).await?;
        let recent_ticks = self.recent_ticks(now).await?;
        let ctx = ExitContext {
            quote,
            recent_ticks: &recent_ticks,
            bar_range,
        };

        let decisions = self.controller.evaluate(&ctx, now);
        for decision in decisions {
            let result = self.executor.apply(&decision).await;
            let accepted = result.is_accepted();
            if !accepted {
                report.rejected += 1;
            }

            match decision {
                ExitDecision::UpdateStop {
                    position_id,
                    previous_stop,
                    new_stop,
                } => {
                    if accepted {
                        match self.controller.confirm_stop_update(&position_id, new_stop, now) {
                            Ok(()) => report.stop_updates.push((position_id.clone(), new_stop)),
                            Err(e) => error!(%position_id, error = %e, "Accepted stop not recorded"),
                        }
                    }
                    self.audit.record(&Event::StopUpdated {
                        cycle_id,
                        position_id,
                        previous_stop,
                        new_stop,
                        accepted,
                        timestamp: now,
                    });
                },
                ExitDecision::Close {
                    position_id,
                    reason,
                    price,
                    volume,
                } => {
                    if let ActionResult::Accepted { price: fill, .. } = &result {
                        let exit_price = fill.unwrap_or(price);
                        match self.controller.confirm_close(&position_id) {
                            Ok(position) => {
                                info!(
                                    %position_id,
                                    %reason,
                                    exit = %exit_price,
                                    pnl = %position.pnl(exit_price),
                                    "Position exited"
                                );
                                report.closed.push(ClosedPosition {
                                    position,
                                    reason,
                                    exit_price,
                                });
                            },
                            Err(e) => error!(%position_id, error = %e, "Accepted close not recorded"),
                        }
                    }
                    self.audit.record(&Event::ExitSent {
                        cycle_id,
                        position_id,
                        reason,
                        price,
                        volume,
                        accepted,
                        timestamp: now,
                    });
                },
            }
        }
        Ok(())
    }

    /// Most recent ticks of the cluster window, oldest first
    async fn recent_ticks(&self, now: DateTime<Utc>) -> ExecResult<Vec<Tick>> {
        let mut ticks = self
            .venue
            .get_ticks(&self.symbol, now - self.config.cluster_window, now)
            .await?;
        if ticks.len() > self.config.cluster_max_ticks {
            let excess = ticks.len() - self.config.cluster_max_ticks;
            ticks.drain(..excess);
        }
        Ok(ticks)
    }
}

// =============================================================================
// Tests
// =============================================================================
