//! Audit Events for vpskew
//!
//! One event per cycle decision. The live driver and the backtest emit
//! the same events, so a recorded log can be compared offline.

use crate::entities::{ExitReason, PositionId};
use crate::value_objects::{Direction, Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a cycle produced no signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Venue returned no closed bar
    NoBars,
    /// Venue returned no ticks for the bar window
    NoTicks,
    /// Newest closed bar was already evaluated
    StaleBar,
    /// Bar opened outside the trading window
    OutsideTradingWindow,
    /// Not enough bars for ATR
    AtrNotReady,
    /// Activity did not exceed the spike threshold
    QuietBar,
    /// Histogram had no bins
    EmptyProfile,
    /// |skew| below threshold
    WeakSkew,
}

impl SkipReason {
    /// Label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoBars => "no_bars",
            SkipReason::NoTicks => "no_ticks",
            SkipReason::StaleBar => "stale_bar",
            SkipReason::OutsideTradingWindow => "outside_trading_window",
            SkipReason::AtrNotReady => "atr_not_ready",
            SkipReason::QuietBar => "quiet_bar",
            SkipReason::EmptyProfile => "empty_profile",
            SkipReason::WeakSkew => "weak_skew",
        }
    }

    /// Data unavailable (as opposed to a filter rejecting the bar)
    pub fn is_data_gap(&self) -> bool {
        matches!(self, SkipReason::NoBars | SkipReason::NoTicks | SkipReason::StaleBar)
    }
}

/// Cycle decision events
///
/// Events are immutable records; they are serialized for the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Cycle ended before signal evaluation
    CycleSkipped {
        cycle_id: Uuid,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },

    /// Signal generator ran for a closed bar
    SignalEvaluated {
        cycle_id: Uuid,
        /// Open time of the evaluated bar
        bar_time: DateTime<Utc>,
        /// Emitted direction (None when filtered)
        direction: Option<Direction>,
        /// Filter that rejected the bar
        skip_reason: Option<SkipReason>,
        point_of_control: Option<Decimal>,
        skew: Option<Decimal>,
        activity: Decimal,
        activity_average: Decimal,
        atr: Option<Decimal>,
        timestamp: DateTime<Utc>,
    },

    /// Signal not turned into an order
    EntryRejected {
        cycle_id: Uuid,
        direction: Direction,
        reason: String,
        open_positions: usize,
        timestamp: DateTime<Utc>,
    },

    /// Entry order sent to the venue
    EntrySent {
        cycle_id: Uuid,
        direction: Direction,
        price: Price,
        volume: Quantity,
        stop: Option<Price>,
        take_profit: Option<Price>,
        accepted: bool,
        position_id: Option<PositionId>,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Trailing stop revision sent to the venue
    StopUpdated {
        cycle_id: Uuid,
        position_id: PositionId,
        previous_stop: Option<Price>,
        new_stop: Price,
        accepted: bool,
        timestamp: DateTime<Utc>,
    },

    /// Close request sent to the venue
    ExitSent {
        cycle_id: Uuid,
        position_id: PositionId,
        reason: ExitReason,
        price: Price,
        volume: Quantity,
        accepted: bool,
        timestamp: DateTime<Utc>,
    },

    /// Live set realigned with the venue's open positions
    PositionsReconciled {
        cycle_id: Uuid,
        dropped: Vec<PositionId>,
        adopted: Vec<PositionId>,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Cycle that produced the event
    pub fn cycle_id(&self) -> Uuid {
        match self {
            Event::CycleSkipped { cycle_id, .. }
            | Event::SignalEvaluated { cycle_id, .. }
            | Event::EntryRejected { cycle_id, .. }
            | Event::EntrySent { cycle_id, .. }
            | Event::StopUpdated { cycle_id, .. }
            | Event::ExitSent { cycle_id, .. }
            | Event::PositionsReconciled { cycle_id, .. } => *cycle_id,
        }
    }

    /// Event type name (matches the serialized tag)
    pub fn name(&self) -> &'static str {
        match self {
            Event::CycleSkipped { .. } => "cycle_skipped",
            Event::SignalEvaluated { .. } => "signal_evaluated",
            Event::EntryRejected { .. } => "entry_rejected",
            Event::EntrySent { .. } => "entry_sent",
            Event::StopUpdated { .. } => "stop_updated",
            Event::ExitSent { .. } => "exit_sent",
            Event::PositionsReconciled { .. } => "positions_reconciled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::ExitSent {
            cycle_id: Uuid::now_v7(),
            position_id: PositionId::new("STUB-7"),
            reason: ExitReason::Recovery,
            price: Price::new(dec!(2000.01)).unwrap(),
            volume: Quantity::new(dec!(0.01)).unwrap(),
            accepted: true,
            timestamp: Utc::now(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "exit_sent");
        assert_eq!(json["reason"], "RECOVERY_EXIT");
        assert_eq!(json["position_id"], "STUB-7");
        assert_eq!(event.name(), "exit_sent");
    }

    #[test]
    fn test_event_roundtrip() {
        let event = Event::CycleSkipped {
            cycle_id: Uuid::now_v7(),
            reason: SkipReason::NoTicks,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(back, event);
        assert!(SkipReason::NoTicks.is_data_gap());
        assert!(!SkipReason::WeakSkew.is_data_gap());
    }
}
