//! Position Lifecycle Controller
//!
//! Owns every open position on the instrument together with the reference
//! POC of the most recent signal. All mutation goes through `confirm_*`
//! methods, which the caller invokes only after the venue acknowledged
//! the corresponding request. Decisions themselves are pure:
//! `plan_entry` and `evaluate` never mutate.
//!
//! # Per-cycle exit evaluation
//!
//! For each position, independently:
//! 1. Trailing stop revision (not terminal, rate-limited by cooldown)
//! 2. Terminal rules in `exit_priority` order, first match wins
//!
//! A position that closes this cycle gets no stop revision.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vpskew_domain::trailing::{self, TrailingRule};
use vpskew_domain::{
    opposing_volume_fraction, BarRange, Direction, ExitDecision, ExitReason, Instrument, Position,
    PositionId, Price, Quantity, Quote, Signal, Tick,
};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Config
// =============================================================================

/// Terminal exit rules, ordered by `ControllerConfig::exit_priority`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitRule {
    /// Close an underwater position back at the reference POC
    Recovery,
    /// Close an underwater position facing opposing volume
    Cluster,
    /// Close on stop-loss / take-profit crossing
    HardStop,
}

impl FromStr for ExitRule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recovery" => Ok(ExitRule::Recovery),
            "cluster" => Ok(ExitRule::Cluster),
            "hard_stop" | "hardstop" | "sltp" => Ok(ExitRule::HardStop),
            other => Err(EngineError::InvalidConfig(format!("unknown exit rule '{other}'"))),
        }
    }
}

/// Static SL/TP placed at entry as ATR multiples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtrBrackets {
    /// Stop distance = atr * sl_mult
    pub sl_mult: Decimal,
    /// Target distance = atr * tp_mult (None: no target)
    pub tp_mult: Option<Decimal>,
}

/// Lifecycle thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Concurrent position cap for the instrument
    pub max_positions: usize,
    pub trailing: TrailingRule,
    /// Minimum time between two stop revisions of one position
    pub stop_cooldown: Duration,
    /// Recovery band around the reference POC, in points
    pub recovery_zone_points: Decimal,
    /// Opposing volume share that triggers a cluster exit
    pub cluster_ratio: Decimal,
    /// Terminal rule order
    pub exit_priority: Vec<ExitRule>,
    pub brackets: Option<AtrBrackets>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_positions: 5,
            trailing: TrailingRule::default(),
            stop_cooldown: Duration::seconds(30),
            recovery_zone_points: dec!(2),
            cluster_ratio: dec!(0.7),
            exit_priority: vec![ExitRule::Recovery, ExitRule::Cluster, ExitRule::HardStop],
            brackets: None,
        }
    }
}

impl ControllerConfig {
    /// Validate thresholds
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_positions == 0 {
            return Err(EngineError::InvalidConfig("max_positions must be > 0".to_string()));
        }
        if self.stop_cooldown < Duration::zero() {
            return Err(EngineError::InvalidConfig("stop_cooldown must be >= 0".to_string()));
        }
        if self.trailing.buffer_points < Decimal::ZERO || self.trailing.trigger_points < Decimal::ZERO {
            return Err(EngineError::InvalidConfig("trailing distances must be >= 0".to_string()));
        }
        if self.recovery_zone_points < Decimal::ZERO {
            return Err(EngineError::InvalidConfig("recovery_zone_points must be >= 0".to_string()));
        }
        if self.cluster_ratio < Decimal::ZERO || self.cluster_ratio > Decimal::ONE {
            return Err(EngineError::InvalidConfig(format!(
                "cluster_ratio must be in [0, 1], got {}",
                self.cluster_ratio
            )));
        }
        let mut seen = HashSet::new();
        for rule in &self.exit_priority {
            if !seen.insert(rule) {
                return Err(EngineError::InvalidConfig(format!("exit rule {rule:?} listed twice")));
            }
        }
        if let Some(brackets) = &self.brackets {
            if brackets.sl_mult <= Decimal::ZERO || brackets.tp_mult.is_some_and(|m| m <= Decimal::ZERO) {
                return Err(EngineError::InvalidConfig("bracket multipliers must be > 0".to_string()));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Entry
// =============================================================================

/// Admitted entry, before sizing
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub direction: Direction,
    /// Ask for BUY, bid for SELL
    pub price: Price,
    pub stop: Option<Price>,
    pub take_profit: Option<Price>,
    /// Distance to `stop` in points (sizing input)
    pub stop_distance_points: Option<Decimal>,
}

impl EntryPlan {
    /// Attach the sized volume
    pub fn with_volume(self, volume: Quantity) -> EntryOrder {
        EntryOrder {
            direction: self.direction,
            price: self.price,
            volume,
            stop: self.stop,
            take_profit: self.take_profit,
        }
    }
}

/// Entry request for the venue
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOrder {
    pub direction: Direction,
    pub price: Price,
    pub volume: Quantity,
    pub stop: Option<Price>,
    pub take_profit: Option<Price>,
}

// =============================================================================
// Exit evaluation input
// =============================================================================

/// Market snapshot for one exit evaluation pass
#[derive(Debug, Clone, Copy)]
pub struct ExitContext<'a> {
    /// Fresh quote
    pub quote: Quote,
    /// Short recent tick window for cluster pressure
    pub recent_ticks: &'a [Tick],
    /// Range of the bar that just closed (bar-level SL/TP)
    pub bar_range: Option<BarRange>,
}

/// Outcome of aligning the live set with the venue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Known positions the venue no longer reports
    pub dropped: Vec<PositionId>,
    /// Venue positions that were not known
    pub adopted: Vec<PositionId>,
}

impl Reconciliation {
    /// Whether the live set already matched the venue
    pub fn is_noop(&self) -> bool {
        self.dropped.is_empty() && self.adopted.is_empty()
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Owns the open-position set and the most recent reference POC
#[derive(Debug, Clone)]
pub struct PositionController {
    instrument: Instrument,
    config: ControllerConfig,
    positions: BTreeMap<PositionId, Position>,
    reference_poc: Option<Price>,
}

impl PositionController {
    /// Create a controller with validated thresholds
    pub fn new(instrument: Instrument, config: ControllerConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            instrument,
            config,
            positions: BTreeMap::new(),
            reference_poc: None,
        })
    }

    /// Thresholds in use
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Traded instrument
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Open positions
    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Open positions in id order
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Look up one position
    pub fn get(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    /// POC of the most recent signal
    pub fn reference_poc(&self) -> Option<Price> {
        self.reference_poc
    }

    /// Remember the signal's POC as the recovery reference
    pub fn observe_signal(&mut self, signal: &Signal) {
        self.reference_poc = Some(signal.reference_price);
    }

    /// Decide whether a signal may open a new position.
    ///
    /// # Errors
    /// `EngineError::PositionCapReached` when `max_positions` are open.
    pub fn plan_entry(&self, signal: &Signal, quote: &Quote, atr: Option<Decimal>) -> EngineResult<EntryPlan> {
        let open = self.open_count();
        if open >= self.config.max_positions {
            return Err(EngineError::PositionCapReached {
                open,
                max: self.config.max_positions,
            });
        }

        let direction = signal.direction;
        let price = quote.entry_price(direction);

        let (stop, take_profit) = match (self.config.brackets, atr) {
            (Some(brackets), Some(atr)) => self.bracket(direction, price, atr, brackets),
            _ => (None, None),
        };

        let point = self.instrument.point();
        let stop_distance_points = stop.map(|s| (price.as_decimal() - s.as_decimal()).abs() / point);

        Ok(EntryPlan {
            direction,
            price,
            stop,
            take_profit,
            stop_distance_points,
        })
    }

    fn bracket(
        &self,
        direction: Direction,
        price: Price,
        atr: Decimal,
        brackets: AtrBrackets,
    ) -> (Option<Price>, Option<Price>) {
        let sign = direction.sign();
        let stop = self.instrument.normalize(price.as_decimal() - sign * atr * brackets.sl_mult);
        let target = brackets
            .tp_mult
            .map(|mult| self.instrument.normalize(price.as_decimal() + sign * atr * mult));

        let stop = Price::new(stop).ok().filter(|s| *s != price);
        let target = target.and_then(|t| Price::new(t).ok()).filter(|t| *t != price);
        (stop, target)
    }

    /// Insert a venue-acknowledged position.
    ///
    /// # Errors
    /// Cap or duplicate-id violations; the live set is left unchanged.
    pub fn confirm_entry(&mut self, position: Position) -> EngineResult<()> {
        let open = self.open_count();
        if open >= self.config.max_positions {
            return Err(EngineError::PositionCapReached {
                open,
                max: self.config.max_positions,
            });
        }
        if self.positions.contains_key(&position.id) {
            return Err(EngineError::DuplicatePosition(position.id));
        }

        info!(
            position_id = %position.id,
            direction = %position.direction,
            entry = %position.entry_price,
            volume = %position.volume,
            open = open + 1,
            "Position opened"
        );
        self.positions.insert(position.id.clone(), position);
        Ok(())
    }

    /// Record a venue-acknowledged stop revision.
    pub fn confirm_stop_update(&mut self, id: &PositionId, new_stop: Price, at: DateTime<Utc>) -> EngineResult<()> {
        let position = self
            .positions
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownPosition(id.clone()))?;
        position.record_stop(new_stop, at)?;
        debug!(position_id = %id, stop = %new_stop, "Stop recorded");
        Ok(())
    }

    /// Remove a venue-acknowledged close. Terminal.
    pub fn confirm_close(&mut self, id: &PositionId) -> EngineResult<Position> {
        let position = self
            .positions
            .remove(id)
            .ok_or_else(|| EngineError::UnknownPosition(id.clone()))?;
        info!(position_id = %id, open = self.positions.len(), "Position closed");
        Ok(position)
    }

    /// Align the live set with the venue's open positions.
    ///
    /// The venue is the source of truth: unknown venue positions are
    /// adopted, positions it no longer reports are dropped.
    pub fn reconcile(&mut self, venue_positions: &[Position]) -> Reconciliation {
        let symbol = self.instrument.symbol().clone();
        let on_venue: HashSet<&PositionId> = venue_positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| &p.id)
            .collect();

        let dropped: Vec<PositionId> = self
            .positions
            .keys()
            .filter(|id| !on_venue.contains(id))
            .cloned()
            .collect();
        for id in &dropped {
            self.positions.remove(id);
            info!(position_id = %id, "Position closed on venue");
        }

        let mut adopted = Vec::new();
        for position in venue_positions.iter().filter(|p| p.symbol == symbol) {
            if !self.positions.contains_key(&position.id) {
                adopted.push(position.id.clone());
                self.positions.insert(position.id.clone(), position.clone());
                info!(position_id = %position.id, direction = %position.direction, "Position adopted from venue");
            }
        }

        if self.positions.len() > self.config.max_positions {
            warn!(
                open = self.positions.len(),
                max = self.config.max_positions,
                "Venue reports more positions than the cap, entries paused"
            );
        }

        Reconciliation { dropped, adopted }
    }

    /// Evaluate every open position against the exit rules.
    ///
    /// Pure: the caller applies the decisions and confirms what the
    /// venue accepted.
    pub fn evaluate(&self, ctx: &ExitContext<'_>, now: DateTime<Utc>) -> Vec<ExitDecision> {
        let mut decisions = Vec::new();

        for position in self.positions.values() {
            if let Some(close) = self.terminal_decision(position, ctx) {
                decisions.push(close);
                continue;
            }
            if let Some(update) = self.trailing_decision(position, ctx, now) {
                decisions.push(update);
            }
        }

        decisions
    }

    fn trailing_decision(&self, position: &Position, ctx: &ExitContext<'_>, now: DateTime<Utc>) -> Option<ExitDecision> {
        if !position.stop_cooldown_elapsed(now, self.config.stop_cooldown) {
            return None;
        }

        let current = ctx.quote.exit_price(position.direction);
        let update = trailing::update_trailing_stop(
            &self.config.trailing,
            position.direction,
            position.entry_price,
            current,
            position.current_stop,
            self.instrument.point(),
        )?;
        let new_stop = Price::new(self.instrument.normalize(update.new_stop.as_decimal())).ok()?;
        if !trailing::tightens(position.direction, position.current_stop, new_stop) {
            return None;
        }

        Some(ExitDecision::UpdateStop {
            position_id: position.id.clone(),
            previous_stop: position.current_stop,
            new_stop,
        })
    }

    fn terminal_decision(&self, position: &Position, ctx: &ExitContext<'_>) -> Option<ExitDecision> {
        let current = ctx.quote.exit_price(position.direction);

        for rule in &self.config.exit_priority {
            let hit = match rule {
                ExitRule::Recovery => self.recovery_hit(position, current).then_some((ExitReason::Recovery, current)),
                ExitRule::Cluster => self.cluster_hit(position, current, ctx.recent_ticks).then_some((ExitReason::Cluster, current)),
                ExitRule::HardStop => self.hard_stop_hit(position, current, ctx.bar_range),
            };
            if let Some((reason, price)) = hit {
                return Some(ExitDecision::Close {
                    position_id: position.id.clone(),
                    reason,
                    price,
                    volume: position.volume,
                });
            }
        }

        None
    }

    fn recovery_hit(&self, position: &Position, current: Price) -> bool {
        let Some(poc) = self.reference_poc else {
            return false;
        };
        position.is_at_loss(current)
            && (current.as_decimal() - poc.as_decimal()).abs()
                <= self.instrument.points(self.config.recovery_zone_points)
    }

    fn cluster_hit(&self, position: &Position, current: Price, ticks: &[Tick]) -> bool {
        if !position.is_at_loss(current) || ticks.is_empty() {
            return false;
        }
        let ratio = opposing_volume_fraction(ticks, position.entry_price.as_decimal(), position.direction);
        debug!(position_id = %position.id, %ratio, "Cluster pressure");
        ratio > self.config.cluster_ratio
    }

    /// SL is checked before TP. The closed bar's range only counts for
    /// positions that were already open, with their current stop, before
    /// it closed. Otherwise only the quote is checked.
    fn hard_stop_hit(&self, position: &Position, current: Price, bar: Option<BarRange>) -> Option<(ExitReason, Price)> {
        let direction = position.direction;
        let bar = bar.filter(|range| {
            position.opened_at < range.closed_at
                && position.last_stop_update_at.map_or(true, |at| at < range.closed_at)
        });

        // Worst and best prices seen for the holder
        let (adverse, favorable) = match (direction, bar) {
            (Direction::Buy, Some(range)) => (range.low.min(current.as_decimal()), range.high.max(current.as_decimal())),
            (Direction::Sell, Some(range)) => (range.high.max(current.as_decimal()), range.low.min(current.as_decimal())),
            (_, None) => (current.as_decimal(), current.as_decimal()),
        };

        if let Some(stop) = position.current_stop {
            if trailing::is_stop_hit(direction, adverse, stop) {
                let fill = if trailing::is_stop_hit(direction, current.as_decimal(), stop) { current } else { stop };
                return Some((ExitReason::StopLossHit, fill));
            }
        }
        if let Some(target) = position.take_profit {
            if trailing::is_target_hit(direction, favorable, target) {
                let fill = if trailing::is_target_hit(direction, current.as_decimal(), target) { current } else { target };
                return Some((ExitReason::TakeProfitHit, fill));
            }
        }
        None
    }
}

// =============================================================================
// Tests
// =============================================================================
