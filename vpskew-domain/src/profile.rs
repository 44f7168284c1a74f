//! Volume Profile (Pure Functions)
//!
//! Bins the ticks of one aggregation window into a price/volume histogram
//! and derives Point of Control, Value Area and skew from it.
//!
//! # Value Area policy
//!
//! Bins are taken greedily in descending volume order (ties by ascending
//! price) until the cumulative volume reaches `coverage * total`. The value
//! area is the min/max price of the included bins. This is NOT the
//! "expand outward from POC" variant: the span may be asymmetric and may
//! jump over low-volume bins.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::market_data::Tick;
use crate::value_objects::Direction;

/// Ordered mapping bin price -> accumulated volume.
pub type Histogram = BTreeMap<Decimal, Decimal>;

/// Bin ticks onto the `price_step` grid.
///
/// `bin = round(mid / price_step) * price_step`, rounding half to even.
/// An empty tick slice yields an empty histogram; callers treat that as
/// "no signal this cycle".
pub fn aggregate(ticks: &[Tick], price_step: Decimal) -> Histogram {
    let mut histogram = Histogram::new();
    if price_step <= Decimal::ZERO {
        return histogram;
    }

    for tick in ticks {
        let bin = (tick.mid() / price_step)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            * price_step;
        *histogram.entry(bin.normalize()).or_insert(Decimal::ZERO) += tick.weight();
    }

    histogram
}

/// Low/high bounds of the value area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueArea {
    /// Value area low (VAL)
    pub low: Decimal,
    /// Value area high (VAH)
    pub high: Decimal,
}

impl ValueArea {
    /// (low + high) / 2
    pub fn midpoint(&self) -> Decimal {
        (self.low + self.high) / Decimal::TWO
    }

    /// high - low
    pub fn width(&self) -> Decimal {
        self.high - self.low
    }

    /// Whether a price lies inside [low, high]
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Profile metrics for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    bins: Histogram,
    point_of_control: Decimal,
    value_area: ValueArea,
    included: Vec<Decimal>,
    total_volume: Decimal,
}

impl VolumeProfile {
    /// Source histogram
    pub fn bins(&self) -> &Histogram {
        &self.bins
    }

    /// Price of the highest-volume bin (lowest price wins ties)
    pub fn point_of_control(&self) -> Decimal {
        self.point_of_control
    }

    /// Value area bounds
    pub fn value_area(&self) -> ValueArea {
        self.value_area
    }

    /// Bins included in the value area, in inclusion order
    pub fn included(&self) -> &[Decimal] {
        &self.included
    }

    /// Sum of all bin volumes
    pub fn total_volume(&self) -> Decimal {
        self.total_volume
    }

    /// (POC - midpoint) / width, or 0 when the value area has no width.
    ///
    /// Positive skew means volume concentrated above the value-area center.
    pub fn skew(&self) -> Decimal {
        let width = self.value_area.width();
        if width.is_zero() {
            return Decimal::ZERO;
        }
        (self.point_of_control - self.value_area.midpoint()) / width
    }
}

/// Derive POC, value area and skew from a histogram.
///
/// Returns `None` for an empty histogram.
pub fn analyze(histogram: &Histogram, coverage: Decimal) -> Option<VolumeProfile> {
    let mut point_of_control: Option<(Decimal, Decimal)> = None;
    for (&price, &volume) in histogram {
        match point_of_control {
            Some((_, best)) if volume <= best => {}
            _ => point_of_control = Some((price, volume)),
        }
    }
    let (point_of_control, _) = point_of_control?;

    let total_volume: Decimal = histogram.values().copied().sum();
    let target = coverage * total_volume;

    // Stable sort keeps ascending price order among equal volumes.
    let mut by_volume: Vec<(Decimal, Decimal)> =
        histogram.iter().map(|(p, v)| (*p, *v)).collect();
    by_volume.sort_by(|a, b| b.1.cmp(&a.1));

    let mut included = Vec::new();
    let mut cumulative = Decimal::ZERO;
    for (price, volume) in by_volume {
        cumulative += volume;
        included.push(price);
        if cumulative >= target {
            break;
        }
    }

    let low = included.iter().copied().min()?;
    let high = included.iter().copied().max()?;

    Some(VolumeProfile {
        bins: histogram.clone(),
        point_of_control,
        value_area: ValueArea { low, high },
        included,
        total_volume,
    })
}

/// Fraction of recent tick volume traded against a position.
///
/// For a SELL this is the volume whose mid is above `entry_price`,
/// for a BUY the volume below it. Returns 0 for an empty window.
pub fn opposing_volume_fraction(ticks: &[Tick], entry_price: Decimal, direction: Direction) -> Decimal {
    let mut total = Decimal::ZERO;
    let mut opposing = Decimal::ZERO;

    for tick in ticks {
        let weight = tick.weight();
        total += weight;
        let against = match direction {
            Direction::Sell => tick.mid() > entry_price,
            Direction::Buy => tick.mid() < entry_price,
        };
        if against {
            opposing += weight;
        }
    }

    if total.is_zero() {
        Decimal::ZERO
    } else {
        opposing / total
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn histogram(entries: &[(Decimal, Decimal)]) -> Histogram {
        entries.iter().copied().collect()
    }

    fn tick(bid: Decimal, ask: Decimal, volume: Decimal) -> Tick {
        Tick::new(Utc::now(), bid, ask, volume)
    }

    #[test]
    fn test_aggregate_bins_mid_prices() {
        let ticks = vec![
            tick(dec!(100.00), dec!(100.02), dec!(3)), // mid 100.01
            tick(dec!(100.004), dec!(100.004), dec!(0)), // mid 100.004 -> 100.00, volume floor 1
            tick(dec!(100.01), dec!(100.01), dec!(2)),
        ];

        let hist = aggregate(&ticks, dec!(0.01));

        assert_eq!(hist.len(), 2);
        assert_eq!(hist[&dec!(100.00)], dec!(1));
        assert_eq!(hist[&dec!(100.01)], dec!(5));
    }

    #[test]
    fn test_aggregate_rounds_half_to_even() {
        // 100.005 / 0.01 = 10000.5 -> 10000 ; 100.015 / 0.01 = 10001.5 -> 10002
        let ticks = vec![
            tick(dec!(100.005), dec!(100.005), dec!(1)),
            tick(dec!(100.015), dec!(100.015), dec!(1)),
        ];

        let hist = aggregate(&ticks, dec!(0.01));

        assert!(hist.contains_key(&dec!(100.00)));
        assert!(hist.contains_key(&dec!(100.02)));
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[], dec!(0.01)).is_empty());
        assert!(analyze(&Histogram::new(), dec!(0.7)).is_none());
    }

    #[test]
    fn test_single_dominant_bin_has_zero_width() {
        let hist = histogram(&[(dec!(100.00), dec!(5)), (dec!(100.01), dec!(20)), (dec!(100.02), dec!(3))]);

        let profile = analyze(&hist, dec!(0.7)).unwrap();

        assert_eq!(profile.point_of_control(), dec!(100.01));
        assert_eq!(profile.value_area(), ValueArea { low: dec!(100.01), high: dec!(100.01) });
        assert_eq!(profile.skew(), dec!(0));
    }

    #[test]
    fn test_greedy_value_area_is_asymmetric() {
        let hist = histogram(&[
            (dec!(10), dec!(1)),
            (dec!(11), dec!(1)),
            (dec!(12), dec!(1)),
            (dec!(13), dec!(1)),
            (dec!(14), dec!(6)),
        ]);

        let profile = analyze(&hist, dec!(0.7)).unwrap();

        assert_eq!(profile.point_of_control(), dec!(14));
        assert_eq!(profile.included(), &[dec!(14), dec!(10)]);
        assert_eq!(profile.value_area(), ValueArea { low: dec!(10), high: dec!(14) });
        assert_eq!(profile.value_area().midpoint(), dec!(12));
        assert_eq!(profile.skew(), dec!(0.5));
    }

    #[test]
    fn test_poc_tie_prefers_lowest_price() {
        let hist = histogram(&[(dec!(1.10), dec!(4)), (dec!(1.20), dec!(4)), (dec!(1.30), dec!(1))]);

        let profile = analyze(&hist, dec!(0.5)).unwrap();

        assert_eq!(profile.point_of_control(), dec!(1.10));
    }

    #[test]
    fn test_negative_skew_when_poc_below_center() {
        let hist = histogram(&[(dec!(10), dec!(5)), (dec!(11), dec!(1)), (dec!(12), dec!(4))]);

        let profile = analyze(&hist, dec!(0.9)).unwrap();

        assert_eq!(profile.value_area(), ValueArea { low: dec!(10), high: dec!(12) });
        assert!(profile.skew() < Decimal::ZERO);
    }

    #[test]
    fn test_full_coverage_includes_every_bin() {
        let hist = histogram(&[(dec!(1), dec!(2)), (dec!(2), dec!(3)), (dec!(3), dec!(1))]);

        let profile = analyze(&hist, dec!(1)).unwrap();

        assert_eq!(profile.included().len(), 3);
        assert_eq!(profile.total_volume(), dec!(6));
    }

    #[test]
    fn test_opposing_fraction_for_sell() {
        let ticks = vec![
            tick(dec!(2000.10), dec!(2000.10), dec!(3)), // above entry: against a SELL
            tick(dec!(1999.90), dec!(1999.90), dec!(1)),
        ];

        let ratio = opposing_volume_fraction(&ticks, dec!(2000.00), Direction::Sell);
        assert_eq!(ratio, dec!(0.75));

        let ratio = opposing_volume_fraction(&ticks, dec!(2000.00), Direction::Buy);
        assert_eq!(ratio, dec!(0.25));
    }

    #[test]
    fn test_opposing_fraction_empty_window() {
        assert_eq!(opposing_volume_fraction(&[], dec!(1), Direction::Buy), dec!(0));
    }
}
