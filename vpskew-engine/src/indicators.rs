//! Volatility and activity indicators.
//!
//! `atr` gates signal generation on having enough history. The
//! `ActivityWindow` keeps the rolling baseline for the spike filter.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use vpskew_domain::Bar;

/// True range per bar, oldest first.
///
/// `max(h - l, |h - prev_close|, |l - prev_close|)`; the first bar has no
/// previous close and uses `h - l`.
pub fn true_ranges(bars: &[Bar]) -> Vec<Decimal> {
    let mut ranges = Vec::with_capacity(bars.len());
    let mut prev_close: Option<Decimal> = None;

    for bar in bars {
        let hl = bar.high - bar.low;
        let tr = match prev_close {
            Some(close) => hl.max((bar.high - close).abs()).max((bar.low - close).abs()),
            None => hl,
        };
        ranges.push(tr);
        prev_close = Some(bar.close);
    }

    ranges
}

/// Mean true range of the last `period` bars.
///
/// Returns `None` until at least `period` bars are available.
pub fn atr(bars: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period {
        return None;
    }

    let ranges = true_ranges(bars);
    let window = &ranges[ranges.len() - period..];
    let sum: Decimal = window.iter().copied().sum();
    Some(sum / Decimal::from(period as u64))
}

/// Fixed-size rolling mean of per-bar activity.
///
/// Each bar is recorded at most once; re-recording the same or an older
/// bar is ignored so a repeated cycle cannot skew the baseline.
#[derive(Debug, Clone)]
pub struct ActivityWindow {
    capacity: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
    last_bar: Option<DateTime<Utc>>,
}

impl ActivityWindow {
    /// Empty window holding at most `capacity` bars
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            sum: Decimal::ZERO,
            last_bar: None,
        }
    }

    /// Seed from historical bars (oldest first)
    pub fn seed(&mut self, bars: &[Bar]) {
        for bar in bars {
            self.record(bar.open_time, Decimal::from(bar.tick_volume));
        }
    }

    /// Record one bar's activity; returns false for an already seen bar
    pub fn record(&mut self, bar_time: DateTime<Utc>, activity: Decimal) -> bool {
        if self.last_bar.is_some_and(|last| bar_time <= last) {
            return false;
        }
        if self.values.len() == self.capacity {
            if let Some(evicted) = self.values.pop_front() {
                self.sum -= evicted;
            }
        }
        self.values.push_back(activity);
        self.sum += activity;
        self.last_bar = Some(bar_time);
        true
    }

    /// Rolling mean, `None` while empty
    pub fn average(&self) -> Option<Decimal> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum / Decimal::from(self.values.len() as u64))
        }
    }

    /// Bars currently in the window
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no bar has been recorded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Open time of the newest recorded bar
    pub fn last_bar(&self) -> Option<DateTime<Utc>> {
        self.last_bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn bar(minute: i64, high: Decimal, low: Decimal, close: Decimal, ticks: u64) -> Bar {
        Bar {
            open_time: Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap() + Duration::minutes(minute),
            open: close,
            high,
            low,
            close,
            tick_volume: ticks,
        }
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let bars = vec![
            bar(0, dec!(10), dec!(9), dec!(9.5), 1),
            // gap up: |12 - 9.5| = 2.5 beats h-l = 1
            bar(1, dec!(12), dec!(11), dec!(11.5), 1),
        ];

        assert_eq!(true_ranges(&bars), vec![dec!(1), dec!(2.5)]);
    }

    #[test]
    fn test_atr_not_ready_until_period() {
        let bars: Vec<Bar> = (0..3).map(|i| bar(i, dec!(2), dec!(1), dec!(1.5), 1)).collect();

        assert!(atr(&bars, 4).is_none());
        assert_eq!(atr(&bars, 3), Some(dec!(1)));
        assert!(atr(&bars, 0).is_none());
    }

    #[test]
    fn test_atr_averages_last_period() {
        let bars = vec![
            bar(0, dec!(20), dec!(10), dec!(15), 1), // tr 10, outside window
            bar(1, dec!(16), dec!(14), dec!(15), 1), // tr 2
            bar(2, dec!(19), dec!(15), dec!(18), 1), // tr 4
        ];

        assert_eq!(atr(&bars, 2), Some(dec!(3)));
    }

    #[test]
    fn test_activity_window_rolls() {
        let mut window = ActivityWindow::new(3);
        let bars: Vec<Bar> = (0..4).map(|i| bar(i, dec!(2), dec!(1), dec!(1), (i as u64 + 1) * 10)).collect();

        window.seed(&bars);

        // 20, 30, 40 remain
        assert_eq!(window.len(), 3);
        assert_eq!(window.average(), Some(dec!(30)));
    }

    #[test]
    fn test_activity_window_ignores_repeated_bar() {
        let mut window = ActivityWindow::new(10);
        let t = Utc::now();

        assert!(window.record(t, dec!(10)));
        assert!(!window.record(t, dec!(1000)));
        assert!(!window.record(t - Duration::minutes(1), dec!(1000)));

        assert_eq!(window.average(), Some(dec!(10)));
        assert!(ActivityWindow::new(5).average().is_none());
    }
}
