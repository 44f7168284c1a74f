//! Domain Entities for vpskew
//!
//! Positions, signals and the decisions the controller issues about them.

use crate::trailing;
use crate::value_objects::{Direction, DomainError, Price, Quantity, Symbol};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Position ID
// =============================================================================

/// Venue-assigned position identifier (ticket)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(String);

impl PositionId {
    /// Wrap a venue identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as sent to the venue
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Position
// =============================================================================

/// Open position on the traded instrument
///
/// Owned by the lifecycle controller from acknowledgement of the entry
/// until acknowledgement of the close. Closing is represented by removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry_price: Price,
    pub volume: Quantity,

    // Protection (venue-side SL / TP)
    pub current_stop: Option<Price>,
    pub take_profit: Option<Price>,

    // Audit
    pub opened_at: DateTime<Utc>,
    pub last_stop_update_at: Option<DateTime<Utc>>,
    pub stop_revisions: u32,
}

impl Position {
    /// Create a freshly opened position without protection
    pub fn new(
        id: PositionId,
        symbol: Symbol,
        direction: Direction,
        entry_price: Price,
        volume: Quantity,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol,
            direction,
            entry_price,
            volume,
            current_stop: None,
            take_profit: None,
            opened_at,
            last_stop_update_at: None,
            stop_revisions: 0,
        }
    }

    /// Attach the static SL/TP set at entry
    pub fn with_bracket(mut self, stop: Option<Price>, take_profit: Option<Price>) -> Self {
        self.current_stop = stop;
        self.take_profit = take_profit;
        self
    }

    /// Lifecycle state
    pub fn state(&self) -> PositionState {
        if self.stop_revisions > 0 {
            PositionState::Trailing
        } else {
            PositionState::Opened
        }
    }

    /// Unrealized profit in points at `price`
    pub fn profit_points(&self, price: Price, point: Decimal) -> Decimal {
        trailing::profit_points(self.direction, self.entry_price, price, point)
    }

    /// Whether the position is underwater at `price`
    pub fn is_at_loss(&self, price: Price) -> bool {
        match self.direction {
            Direction::Buy => price < self.entry_price,
            Direction::Sell => price > self.entry_price,
        }
    }

    /// Whether a new stop revision is allowed at `now`
    pub fn stop_cooldown_elapsed(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_stop_update_at {
            None => true,
            Some(last) => now - last >= cooldown,
        }
    }

    /// Record a venue-acknowledged stop revision
    ///
    /// # Errors
    /// Returns `DomainError::StopWouldLoosen` unless `new_stop` strictly
    /// tightens the current stop.
    pub fn record_stop(&mut self, new_stop: Price, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !trailing::tightens(self.direction, self.current_stop, new_stop) {
            return Err(DomainError::StopWouldLoosen(format!(
                "{} {}: {} -> {}",
                self.id,
                self.direction,
                self.current_stop.map(|s| s.to_string()).unwrap_or_else(|| "none".into()),
                new_stop
            )));
        }
        self.current_stop = Some(new_stop);
        self.last_stop_update_at = Some(at);
        self.stop_revisions += 1;
        Ok(())
    }

    /// Realized P&L (price units x volume) if closed at `exit_price`
    pub fn pnl(&self, exit_price: Price) -> Decimal {
        (exit_price.as_decimal() - self.entry_price.as_decimal())
            * self.direction.sign()
            * self.volume.as_decimal()
    }
}

// =============================================================================
// Position State
// =============================================================================

/// Per-position lifecycle state
///
/// `Closed` has no variant: a closed position no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// Open, stop never revised
    Opened,
    /// At least one accepted trailing revision
    Trailing,
}

impl PositionState {
    /// Get the name of the state for display
    pub fn name(&self) -> &str {
        match self {
            PositionState::Opened => "opened",
            PositionState::Trailing => "trailing",
        }
    }
}

// =============================================================================
// Signal
// =============================================================================

/// Directional trade signal for one closed bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Point of Control of the bar (recovery-exit reference)
    pub reference_price: Price,
    /// Skew that produced the signal
    pub strength: Decimal,
    /// Open time of the bar
    pub bar_time: DateTime<Utc>,
}

// =============================================================================
// Exit decisions
// =============================================================================

/// Why a position is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExitReason {
    /// Back at the reference POC while underwater
    #[serde(rename = "RECOVERY_EXIT")]
    Recovery,
    /// Recent volume concentrated against the position while underwater
    #[serde(rename = "CLUSTER_EXIT")]
    Cluster,
    /// Stop-loss level crossed
    #[serde(rename = "SL_HIT")]
    StopLossHit,
    /// Take-profit level crossed
    #[serde(rename = "TP_HIT")]
    TakeProfitHit,
}

impl ExitReason {
    /// Audit label
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Recovery => "RECOVERY_EXIT",
            ExitReason::Cluster => "CLUSTER_EXIT",
            ExitReason::StopLossHit => "SL_HIT",
            ExitReason::TakeProfitHit => "TP_HIT",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action the controller wants executed for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExitDecision {
    /// Tighten the protective stop (not terminal)
    UpdateStop {
        position_id: PositionId,
        previous_stop: Option<Price>,
        new_stop: Price,
    },
    /// Close the whole position (terminal)
    Close {
        position_id: PositionId,
        reason: ExitReason,
        price: Price,
        volume: Quantity,
    },
}

impl ExitDecision {
    /// Position the decision applies to
    pub fn position_id(&self) -> &PositionId {
        match self {
            ExitDecision::UpdateStop { position_id, .. } | ExitDecision::Close { position_id, .. } => {
                position_id
            },
        }
    }

    /// Audit label
    pub fn reason(&self) -> &'static str {
        match self {
            ExitDecision::UpdateStop { .. } => "TRAILING_STOP_UPDATE",
            ExitDecision::Close { reason, .. } => reason.as_str(),
        }
    }

    /// Whether the decision ends the position
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExitDecision::Close { .. })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    fn position(direction: Direction) -> Position {
        Position::new(
            PositionId::new("T-1"),
            Symbol::new("XAUUSDm").unwrap(),
            direction,
            price(dec!(2000.00)),
            Quantity::new(dec!(0.10)).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_position_is_opened() {
        let pos = position(Direction::Buy);
        assert_eq!(pos.state(), PositionState::Opened);
        assert!(pos.current_stop.is_none());
    }

    #[test]
    fn test_record_stop_tightens_and_transitions() {
        let mut pos = position(Direction::Buy);
        let now = Utc::now();

        pos.record_stop(price(dec!(2000.03)), now).unwrap();

        assert_eq!(pos.state(), PositionState::Trailing);
        assert_eq!(pos.current_stop, Some(price(dec!(2000.03))));
        assert_eq!(pos.last_stop_update_at, Some(now));
    }

    #[test]
    fn test_record_stop_rejects_loosening() {
        let mut pos = position(Direction::Buy);
        pos.record_stop(price(dec!(2000.03)), Utc::now()).unwrap();

        let result = pos.record_stop(price(dec!(2000.01)), Utc::now());

        assert!(matches!(result, Err(DomainError::StopWouldLoosen(_))));
        assert_eq!(pos.current_stop, Some(price(dec!(2000.03))));
        assert_eq!(pos.stop_revisions, 1);
    }

    #[test]
    fn test_loss_and_pnl_are_direction_adjusted() {
        let long = position(Direction::Buy);
        let short = position(Direction::Sell);

        assert!(long.is_at_loss(price(dec!(1999.99))));
        assert!(!short.is_at_loss(price(dec!(1999.99))));
        assert_eq!(long.pnl(price(dec!(2001.00))), dec!(0.1));
        assert_eq!(short.pnl(price(dec!(2001.00))), dec!(-0.1));
    }

    #[test]
    fn test_stop_cooldown() {
        let mut pos = position(Direction::Sell);
        let start = Utc::now();
        assert!(pos.stop_cooldown_elapsed(start, Duration::seconds(30)));

        pos.record_stop(price(dec!(1999.90)), start).unwrap();

        assert!(!pos.stop_cooldown_elapsed(start + Duration::seconds(29), Duration::seconds(30)));
        assert!(pos.stop_cooldown_elapsed(start + Duration::seconds(30), Duration::seconds(30)));
    }

    #[test]
    fn test_exit_decision_labels() {
        let close = ExitDecision::Close {
            position_id: PositionId::new("T-1"),
            reason: ExitReason::Cluster,
            price: price(dec!(2000)),
            volume: Quantity::new(dec!(0.1)).unwrap(),
        };
        assert_eq!(close.reason(), "CLUSTER_EXIT");
        assert!(close.is_terminal());

        let update = ExitDecision::UpdateStop {
            position_id: PositionId::new("T-1"),
            previous_stop: None,
            new_stop: price(dec!(2000)),
        };
        assert_eq!(update.reason(), "TRAILING_STOP_UPDATE");
        assert!(!update.is_terminal());
    }

    #[test]
    fn test_exit_reason_serializes_as_label() {
        let json = serde_json::to_string(&ExitReason::TakeProfitHit).unwrap();
        assert_eq!(json, "\"TP_HIT\"");
    }
}
