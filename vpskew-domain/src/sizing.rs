//! Position Sizing Policies
//!
//! Sizing is pluggable: the driver holds a `Box<dyn SizingPolicy>` and asks
//! it for a volume once an entry has been admitted.
//!
//! - `FixedLot`: constant volume, no account query needed
//! - `RiskPercent`: Volume = (Balance x Risk) / (Stop points x Point value)
//! - `MarginCapped`: `RiskPercent` capped by a share of free margin

use crate::value_objects::{DomainError, Quantity};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inputs to a sizing decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Fraction of balance risked per trade (0.01 = 1%)
    pub risk_fraction: Decimal,
    /// Distance to the protective stop, in points (None when no stop is set)
    pub stop_distance_points: Option<Decimal>,
    /// Account currency value of one point for one lot
    pub point_value: Decimal,
    /// Free margin reported by the venue
    pub free_margin: Option<Decimal>,
}

/// Venue volume grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRules {
    /// Smallest tradable volume
    pub min_lot: Decimal,
    /// Volume increment
    pub lot_step: Decimal,
}

impl Default for LotRules {
    fn default() -> Self {
        Self {
            min_lot: dec!(0.01),
            lot_step: dec!(0.01),
        }
    }
}

impl LotRules {
    /// Snap a raw volume onto the lot grid, never below `min_lot`
    ///
    /// # Errors
    /// Returns `DomainError::PositionSizingError` if the grid is unusable
    pub fn snap(&self, raw: Decimal) -> Result<Quantity, DomainError> {
        if self.lot_step <= Decimal::ZERO || self.min_lot <= Decimal::ZERO {
            return Err(DomainError::PositionSizingError(format!(
                "lot grid must be positive (min_lot={}, lot_step={})",
                self.min_lot, self.lot_step
            )));
        }
        let steps = (raw / self.lot_step).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
        let volume = (steps * self.lot_step).max(self.min_lot);
        Quantity::new(volume.normalize())
    }
}

/// Turns balance and risk inputs into an order volume
pub trait SizingPolicy: Send + Sync + fmt::Debug {
    /// Volume for the next entry
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRiskParams` or
    /// `DomainError::PositionSizingError` when no volume can be derived.
    fn size_position(&self, balance: Decimal, risk: &RiskParams) -> Result<Quantity, DomainError>;

    /// Whether the policy reads balance / free margin from the venue
    fn needs_account(&self) -> bool {
        true
    }

    /// Policy name for logs
    fn name(&self) -> &'static str;
}

// =============================================================================
// FixedLot
// =============================================================================

/// Always trade the same volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLot {
    pub lot: Quantity,
}

impl FixedLot {
    /// Fixed volume policy
    pub fn new(lot: Quantity) -> Self {
        Self { lot }
    }
}

impl SizingPolicy for FixedLot {
    fn size_position(&self, _balance: Decimal, _risk: &RiskParams) -> Result<Quantity, DomainError> {
        Ok(self.lot)
    }

    fn needs_account(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "fixed_lot"
    }
}

// =============================================================================
// RiskPercent
// =============================================================================

/// Risk a fixed share of balance per trade
///
/// # Examples
///
/// ```
/// # use vpskew_domain::sizing::{LotRules, RiskParams, RiskPercent, SizingPolicy};
/// # use rust_decimal_macros::dec;
/// let policy = RiskPercent::new(LotRules::default());
/// let risk = RiskParams {
///     risk_fraction: dec!(0.01),
///     stop_distance_points: Some(dec!(100)),
///     point_value: dec!(1),
///     free_margin: None,
/// };
///
/// // $10,000 x 1% = $100 at risk, 100 points x $1 = $100 per lot
/// let volume = policy.size_position(dec!(10000), &risk).unwrap();
/// assert_eq!(volume.as_decimal(), dec!(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskPercent {
    pub lot_rules: LotRules,
    /// Stop distance assumed when the entry carries no stop
    pub default_stop_points: Decimal,
}

impl RiskPercent {
    /// Default assumed stop distance (points)
    pub const DEFAULT_STOP_POINTS: Decimal = dec!(50);

    /// Risk-percentage policy on the given lot grid
    pub fn new(lot_rules: LotRules) -> Self {
        Self {
            lot_rules,
            default_stop_points: Self::DEFAULT_STOP_POINTS,
        }
    }

    /// Raw (unsnapped) volume
    fn raw_volume(&self, balance: Decimal, risk: &RiskParams) -> Result<Decimal, DomainError> {
        if balance <= Decimal::ZERO {
            return Err(DomainError::PositionSizingError(format!("balance must be positive, got {balance}")));
        }
        if risk.risk_fraction <= Decimal::ZERO || risk.risk_fraction > Decimal::ONE {
            return Err(DomainError::InvalidRiskParams(format!(
                "risk_fraction must be in (0, 1], got {}",
                risk.risk_fraction
            )));
        }
        if risk.point_value <= Decimal::ZERO {
            return Err(DomainError::InvalidRiskParams(format!(
                "point_value must be positive, got {}",
                risk.point_value
            )));
        }

        let stop_points = risk
            .stop_distance_points
            .filter(|points| *points > Decimal::ZERO)
            .unwrap_or(self.default_stop_points);
        if stop_points <= Decimal::ZERO {
            return Err(DomainError::PositionSizingError("stop distance must be positive".to_string()));
        }

        Ok(balance * risk.risk_fraction / (stop_points * risk.point_value))
    }
}

impl SizingPolicy for RiskPercent {
    fn size_position(&self, balance: Decimal, risk: &RiskParams) -> Result<Quantity, DomainError> {
        let raw = self.raw_volume(balance, risk)?;
        self.lot_rules.snap(raw)
    }

    fn name(&self) -> &'static str {
        "risk_percent"
    }
}

// =============================================================================
// MarginCapped
// =============================================================================

/// Risk-percentage sizing that never commits more than a share of free margin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginCapped {
    pub risk: RiskPercent,
    /// Share of free margin a single entry may use
    pub margin_fraction: Decimal,
    /// Margin required per lot
    pub margin_per_lot: Decimal,
}

impl MarginCapped {
    /// Default margin share per entry
    pub const DEFAULT_MARGIN_FRACTION: Decimal = dec!(0.2);

    /// Margin-capped policy
    pub fn new(risk: RiskPercent, margin_per_lot: Decimal) -> Self {
        Self {
            risk,
            margin_fraction: Self::DEFAULT_MARGIN_FRACTION,
            margin_per_lot,
        }
    }
}

impl SizingPolicy for MarginCapped {
    fn size_position(&self, balance: Decimal, risk: &RiskParams) -> Result<Quantity, DomainError> {
        if self.margin_per_lot <= Decimal::ZERO {
            return Err(DomainError::InvalidRiskParams(format!(
                "margin_per_lot must be positive, got {}",
                self.margin_per_lot
            )));
        }

        let mut raw = self.risk.raw_volume(balance, risk)?;
        if let Some(free_margin) = risk.free_margin {
            let cap = free_margin.max(Decimal::ZERO) * self.margin_fraction / self.margin_per_lot;
            raw = raw.min(cap);
        }

        self.risk.lot_rules.snap(raw)
    }

    fn name(&self) -> &'static str {
        "margin_capped"
    }
}

// =============================================================================
// Tests
// =============================================================================
