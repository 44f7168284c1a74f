//! Property tests for the volume profile and trailing stop.
//!
//! Uses proptest to verify:
//! 1. POC maximality: no bin carries more volume than the POC
//! 2. Minimal cover: the value area reaches coverage and the last bin was needed
//! 3. Skew sign follows POC vs value-area midpoint
//! 4. Idempotence: analyzing twice yields the same profile
//! 5. Ratchet monotonicity: accepted stops only tighten

use proptest::prelude::*;
use rust_decimal::Decimal;
use vpskew_domain::profile::{analyze, Histogram};
use vpskew_domain::trailing::{tightens, update_trailing_stop, TrailingRule};
use vpskew_domain::value_objects::{Direction, Price};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_histogram() -> impl Strategy<Value = Histogram> {
    prop::collection::vec((0u32..300, 1u32..500), 1..40).prop_map(|entries| {
        let mut histogram = Histogram::new();
        for (offset, volume) in entries {
            // 2000.00 + offset * 0.01
            let price = Decimal::new(200_000 + i64::from(offset), 2);
            *histogram.entry(price).or_insert(Decimal::ZERO) += Decimal::from(volume);
        }
        histogram
    })
}

fn arb_coverage() -> impl Strategy<Value = Decimal> {
    (1u32..=100).prop_map(|pct| Decimal::new(i64::from(pct), 2))
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Buy), Just(Direction::Sell)]
}

// ── 1-4. Volume profile ──────────────────────────────────────────────

proptest! {
    #[test]
    fn poc_has_maximum_volume(histogram in arb_histogram(), coverage in arb_coverage()) {
        let profile = analyze(&histogram, coverage).unwrap();
        let poc_volume = histogram[&profile.point_of_control()];

        for volume in histogram.values() {
            prop_assert!(poc_volume >= *volume);
        }
    }

    #[test]
    fn value_area_is_a_minimal_greedy_cover(histogram in arb_histogram(), coverage in arb_coverage()) {
        let profile = analyze(&histogram, coverage).unwrap();
        let target = coverage * profile.total_volume();

        let volumes: Vec<Decimal> = profile.included().iter().map(|p| histogram[p]).collect();

        // Descending volume order
        for pair in volumes.windows(2) {
            prop_assert!(pair[0] >= pair[1]);
        }

        let cumulative: Decimal = volumes.iter().copied().sum();
        prop_assert!(cumulative >= target);

        let without_last = cumulative - volumes[volumes.len() - 1];
        prop_assert!(without_last < target);

        let value_area = profile.value_area();
        for price in profile.included() {
            prop_assert!(value_area.contains(*price));
        }
    }

    #[test]
    fn skew_sign_follows_poc(histogram in arb_histogram(), coverage in arb_coverage()) {
        let profile = analyze(&histogram, coverage).unwrap();
        let midpoint = profile.value_area().midpoint();
        let skew = profile.skew();

        if profile.value_area().width().is_zero() {
            prop_assert_eq!(skew, Decimal::ZERO);
        } else if profile.point_of_control() > midpoint {
            prop_assert!(skew > Decimal::ZERO);
        } else if profile.point_of_control() < midpoint {
            prop_assert!(skew < Decimal::ZERO);
        }
    }

    #[test]
    fn analyze_is_idempotent(histogram in arb_histogram(), coverage in arb_coverage()) {
        prop_assert_eq!(analyze(&histogram, coverage), analyze(&histogram, coverage));
    }
}

// ── 5. Ratchet monotonicity ──────────────────────────────────────────

proptest! {
    #[test]
    fn trailing_stop_only_tightens(
        direction in arb_direction(),
        moves in prop::collection::vec(-20i64..20, 1..60),
    ) {
        let rule = TrailingRule::default();
        let point = Decimal::new(1, 2);
        let entry = Price::new(Decimal::new(200_000, 2)).unwrap();

        let mut price = entry.as_decimal();
        let mut stop: Option<Price> = None;

        for step in moves {
            price += Decimal::from(step) * point;
            let Ok(current) = Price::new(price) else { continue };

            if let Some(update) = update_trailing_stop(&rule, direction, entry, current, stop, point) {
                prop_assert!(tightens(direction, stop, update.new_stop));
                stop = Some(update.new_stop);
            }
        }
    }
}
