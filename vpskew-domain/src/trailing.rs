//! Trailing Stop Logic (Pure Functions)
//!
//! Deterministic helpers for the profit-triggered trailing stop and the
//! hard stop/target checks. Distances are expressed in instrument points.
//!
//! # Trailing Stop Algorithm (Trigger + Buffer)
//!
//! - Trigger: unrealized profit must exceed `trigger_points`
//! - BUY: candidate = price - buffer_points * point
//! - SELL: candidate = price + buffer_points * point
//!
//! Key invariants:
//! - A candidate is only accepted when it strictly tightens the stop
//! - A missing stop is tightened by any candidate
//! - Revisions smaller than `min_move_points` are not worth a venue round trip

use crate::value_objects::{Direction, Price};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Trailing stop parameters (all in points)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingRule {
    /// Profit that must be exceeded before trailing starts
    pub trigger_points: Decimal,
    /// Distance kept between price and the trailed stop
    pub buffer_points: Decimal,
    /// Smallest stop revision worth sending (venue freeze level)
    pub min_move_points: Decimal,
}

impl Default for TrailingRule {
    fn default() -> Self {
        Self {
            trigger_points: dec!(5),
            buffer_points: dec!(3),
            min_move_points: Decimal::ZERO,
        }
    }
}

/// Accepted trailing stop revision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStopUpdate {
    /// New stop price
    pub new_stop: Price,
    /// Profit (points) observed when the revision was computed
    pub profit_points: Decimal,
}

/// Unrealized profit in points, direction-adjusted.
///
/// Negative when the position is underwater.
pub fn profit_points(direction: Direction, entry_price: Price, current_price: Price, point: Decimal) -> Decimal {
    if point.is_zero() {
        return Decimal::ZERO;
    }
    (current_price.as_decimal() - entry_price.as_decimal()) * direction.sign() / point
}

/// Whether `candidate` is strictly better for the holder than `current`.
pub fn tightens(direction: Direction, current: Option<Price>, candidate: Price) -> bool {
    match current {
        None => true,
        Some(stop) => match direction {
            Direction::Buy => candidate > stop,
            Direction::Sell => candidate < stop,
        },
    }
}

/// Compute a trailing stop revision for the current price.
///
/// # Returns
///
/// * `Some(TrailingStopUpdate)` - profit exceeds the trigger and the candidate tightens
/// * `None` - not triggered, would loosen, or moves less than the minimum
///
/// # Examples
///
/// ```
/// # use vpskew_domain::trailing::{update_trailing_stop, TrailingRule};
/// # use vpskew_domain::value_objects::{Direction, Price};
/// # use rust_decimal_macros::dec;
/// let rule = TrailingRule::default(); // trigger 5, buffer 3
/// let entry = Price::new(dec!(2000.00)).unwrap();
///
/// // 6 points of profit: stop trails 3 points behind price
/// let update = update_trailing_stop(
///     &rule,
///     Direction::Buy,
///     entry,
///     Price::new(dec!(2000.06)).unwrap(),
///     None,
///     dec!(0.01),
/// )
/// .unwrap();
/// assert_eq!(update.new_stop.as_decimal(), dec!(2000.03));
///
/// // Pullback: candidate 2000.01 would loosen, no update
/// let result = update_trailing_stop(
///     &rule,
///     Direction::Buy,
///     entry,
///     Price::new(dec!(2000.04)).unwrap(),
///     Some(update.new_stop),
///     dec!(0.01),
/// );
/// assert!(result.is_none());
/// ```
pub fn update_trailing_stop(
    rule: &TrailingRule,
    direction: Direction,
    entry_price: Price,
    current_price: Price,
    current_stop: Option<Price>,
    point: Decimal,
) -> Option<TrailingStopUpdate> {
    let profit = profit_points(direction, entry_price, current_price, point);
    if profit <= rule.trigger_points {
        return None;
    }

    let offset = rule.buffer_points * point;
    let candidate = current_price.as_decimal() - direction.sign() * offset;
    let candidate = Price::new(candidate).ok()?;

    if !tightens(direction, current_stop, candidate) {
        return None;
    }

    if let Some(stop) = current_stop {
        let moved = (candidate.as_decimal() - stop.as_decimal()).abs();
        if moved <= rule.min_move_points * point {
            return None;
        }
    }

    Some(TrailingStopUpdate {
        new_stop: candidate,
        profit_points: profit,
    })
}

/// Check if a protective stop is hit
///
/// BUY exits when price <= stop, SELL when price >= stop.
pub fn is_stop_hit(direction: Direction, price: Decimal, stop: Price) -> bool {
    match direction {
        Direction::Buy => price <= stop.as_decimal(),
        Direction::Sell => price >= stop.as_decimal(),
    }
}

/// Check if a take-profit target is reached
///
/// BUY exits when price >= target, SELL when price <= target.
pub fn is_target_hit(direction: Direction, price: Decimal, target: Price) -> bool {
    match direction {
        Direction::Buy => price >= target.as_decimal(),
        Direction::Sell => price <= target.as_decimal(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const POINT: Decimal = dec!(0.01);

    fn price(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    // =========================================================================
    // BUY Position Tests
    // =========================================================================

    #[test]
    fn test_buy_not_triggered_at_exact_trigger() {
        let rule = TrailingRule::default();

        // 5 points is not strictly above the trigger
        let result = update_trailing_stop(&rule, Direction::Buy, price(dec!(2000.00)), price(dec!(2000.05)), None, POINT);

        assert!(result.is_none());
    }

    #[test]
    fn test_buy_first_update_sets_stop() {
        let rule = TrailingRule::default();

        let update = update_trailing_stop(&rule, Direction::Buy, price(dec!(2000.00)), price(dec!(2000.06)), None, POINT)
            .unwrap();

        assert_eq!(update.new_stop.as_decimal(), dec!(2000.03));
        assert_eq!(update.profit_points, dec!(6));
    }

    #[test]
    fn test_buy_sequence_only_tightens() {
        let rule = TrailingRule::default();
        let entry = price(dec!(2000.00));
        let mut stop = None;

        let prices = [dec!(2000.06), dec!(2000.10), dec!(2000.08), dec!(2000.20)];
        let expected = [Some(dec!(2000.03)), Some(dec!(2000.07)), None, Some(dec!(2000.17))];

        for (p, want) in prices.iter().zip(expected) {
            let result = update_trailing_stop(&rule, Direction::Buy, entry, price(*p), stop, POINT);
            assert_eq!(result.map(|u| u.new_stop.as_decimal()), want);
            if let Some(update) = result {
                stop = Some(update.new_stop);
            }
        }
    }

    #[test]
    fn test_loosening_candidate_rejected() {
        // Lower trigger so the pullback itself qualifies
        let rule = TrailingRule {
            trigger_points: dec!(2),
            ..TrailingRule::default()
        };

        let result = update_trailing_stop(
            &rule,
            Direction::Buy,
            price(dec!(2000.00)),
            price(dec!(2000.04)),
            Some(price(dec!(2000.03))),
            POINT,
        );

        assert!(result.is_none());
        assert!(!tightens(Direction::Buy, Some(price(dec!(2000.03))), price(dec!(2000.01))));
    }

    #[test]
    fn test_min_move_suppresses_small_revisions() {
        let rule = TrailingRule {
            min_move_points: dec!(2),
            ..TrailingRule::default()
        };
        let entry = price(dec!(2000.00));

        // 2000.08 -> candidate 2000.05, moved 2 points from 2000.03: not more than 2
        let small = update_trailing_stop(&rule, Direction::Buy, entry, price(dec!(2000.08)), Some(price(dec!(2000.03))), POINT);
        assert!(small.is_none());

        let large = update_trailing_stop(&rule, Direction::Buy, entry, price(dec!(2000.09)), Some(price(dec!(2000.03))), POINT);
        assert_eq!(large.unwrap().new_stop.as_decimal(), dec!(2000.06));
    }

    // =========================================================================
    // SELL Position Tests
    // =========================================================================

    #[test]
    fn test_sell_stop_trails_above_price() {
        let rule = TrailingRule::default();

        let update = update_trailing_stop(&rule, Direction::Sell, price(dec!(2000.00)), price(dec!(1999.90)), None, POINT)
            .unwrap();

        assert_eq!(update.new_stop.as_decimal(), dec!(1999.93));
        assert_eq!(update.profit_points, dec!(10));
    }

    #[test]
    fn test_sell_stop_never_rises() {
        let rule = TrailingRule::default();

        let result = update_trailing_stop(
            &rule,
            Direction::Sell,
            price(dec!(2000.00)),
            price(dec!(1999.92)),
            Some(price(dec!(1999.93))),
            POINT,
        );

        // candidate 1999.95 is above the current stop
        assert!(result.is_none());
    }

    #[test]
    fn test_profit_points_sign() {
        assert_eq!(profit_points(Direction::Buy, price(dec!(100)), price(dec!(99.97)), POINT), dec!(-3));
        assert_eq!(profit_points(Direction::Sell, price(dec!(100)), price(dec!(99.97)), POINT), dec!(3));
    }

    // =========================================================================
    // Stop / Target Hits
    // =========================================================================

    #[test]
    fn test_stop_hit_at_or_beyond() {
        let stop = price(dec!(2000.00));

        assert!(is_stop_hit(Direction::Buy, dec!(2000.00), stop));
        assert!(is_stop_hit(Direction::Buy, dec!(1999.99), stop));
        assert!(!is_stop_hit(Direction::Buy, dec!(2000.01), stop));

        assert!(is_stop_hit(Direction::Sell, dec!(2000.00), stop));
        assert!(!is_stop_hit(Direction::Sell, dec!(1999.99), stop));
    }

    #[test]
    fn test_target_hit_at_or_beyond() {
        let target = price(dec!(2001.00));

        assert!(is_target_hit(Direction::Buy, dec!(2001.00), target));
        assert!(!is_target_hit(Direction::Buy, dec!(2000.99), target));
        assert!(is_target_hit(Direction::Sell, dec!(2000.50), target));
    }
}
