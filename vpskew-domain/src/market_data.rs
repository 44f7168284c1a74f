//! Market Data Types
//!
//! Venue-agnostic market data used by both the live driver and the
//! backtest harness.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{Direction, DomainError, Price};

// =============================================================================
// Tick
// =============================================================================

/// Single quote update from the venue.
///
/// Venues that do not report per-tick volume send zero; such ticks are
/// normalized to a volume of 1 so every tick still weighs in the histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Venue timestamp
    pub time: DateTime<Utc>,
    /// Best bid
    pub bid: Decimal,
    /// Best ask
    pub ask: Decimal,
    /// Traded volume (>= 1 after normalization)
    pub volume: Decimal,
}

impl Tick {
    /// Create a new tick, normalizing non-positive volume to 1.
    pub fn new(time: DateTime<Utc>, bid: Decimal, ask: Decimal, volume: Decimal) -> Self {
        Self {
            time,
            bid,
            ask,
            volume: Self::normalize_volume(volume),
        }
    }

    /// Synthetic mid price (bid + ask) / 2.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Volume floor applied to every tick.
    pub fn normalize_volume(volume: Decimal) -> Decimal {
        if volume <= Decimal::ZERO {
            Decimal::ONE
        } else {
            volume
        }
    }

    /// Volume after normalization.
    ///
    /// Ticks deserialized from tapes bypass `new`, so consumers use this.
    pub fn weight(&self) -> Decimal {
        Self::normalize_volume(self.volume)
    }
}

// =============================================================================
// Timeframe
// =============================================================================

/// Bar duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    /// One minute
    #[default]
    M1,
    /// Five minutes
    M5,
    /// Fifteen minutes
    M15,
}

impl Timeframe {
    /// Length of one bar
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            other => Err(DomainError::InvalidInstrument(format!("unknown timeframe {other}"))),
        }
    }
}

// =============================================================================
// Bar
// =============================================================================

/// OHLC bar with the venue's tick count.
///
/// Exactly one bar exists per aggregation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time (window start)
    pub open_time: DateTime<Utc>,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Number of ticks in the window
    pub tick_volume: u64,
}

impl Bar {
    /// Window end (exclusive).
    pub fn close_time(&self, timeframe: Timeframe) -> DateTime<Utc> {
        self.open_time + timeframe.duration()
    }

    /// Range of this bar, stamped with its close time.
    pub fn range(&self, timeframe: Timeframe) -> BarRange {
        BarRange {
            high: self.high,
            low: self.low,
            closed_at: self.close_time(timeframe),
        }
    }
}

/// Price range of a closed bar, used by bar-level stop/target checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarRange {
    /// Highest traded price
    pub high: Decimal,
    /// Lowest traded price
    pub low: Decimal,
    /// When the bar closed
    pub closed_at: DateTime<Utc>,
}

// =============================================================================
// Quote
// =============================================================================

/// Current best bid/ask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Best bid
    pub bid: Price,
    /// Best ask
    pub ask: Price,
    /// Quote time
    pub time: DateTime<Utc>,
}

impl Quote {
    /// Price a new position in `direction` would be opened at.
    pub fn entry_price(&self, direction: Direction) -> Price {
        match direction {
            Direction::Buy => self.ask,
            Direction::Sell => self.bid,
        }
    }

    /// Price a position held in `direction` would be closed at.
    pub fn exit_price(&self, direction: Direction) -> Price {
        match direction {
            Direction::Buy => self.bid,
            Direction::Sell => self.ask,
        }
    }

    /// Ask minus bid.
    pub fn spread(&self) -> Decimal {
        self.ask.as_decimal() - self.bid.as_decimal()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_zero_volume_normalized() {
        let tick = Tick::new(Utc::now(), dec!(2000.00), dec!(2000.02), dec!(0));
        assert_eq!(tick.volume, dec!(1));
        assert_eq!(tick.mid(), dec!(2000.01));
    }

    #[test]
    fn test_tick_weight_covers_raw_construction() {
        let tick = Tick {
            time: Utc::now(),
            bid: dec!(1),
            ask: dec!(1),
            volume: dec!(0),
        };
        assert_eq!(tick.weight(), dec!(1));
    }

    #[test]
    fn test_bar_close_time() {
        let open = Utc.with_ymd_and_hms(2025, 1, 6, 10, 15, 0).unwrap();
        let bar = Bar {
            open_time: open,
            open: dec!(2000),
            high: dec!(2001),
            low: dec!(1999),
            close: dec!(2000.5),
            tick_volume: 120,
        };
        assert_eq!(bar.close_time(Timeframe::M1), open + Duration::minutes(1));
        assert_eq!(bar.range(Timeframe::M5).closed_at, open + Duration::minutes(5));
    }

    #[test]
    fn test_quote_sides() {
        let quote = Quote {
            bid: Price::new(dec!(2000.00)).unwrap(),
            ask: Price::new(dec!(2000.03)).unwrap(),
            time: Utc::now(),
        };
        assert_eq!(quote.entry_price(Direction::Buy).as_decimal(), dec!(2000.03));
        assert_eq!(quote.exit_price(Direction::Buy).as_decimal(), dec!(2000.00));
        assert_eq!(quote.entry_price(Direction::Sell).as_decimal(), dec!(2000.00));
        assert_eq!(quote.exit_price(Direction::Sell).as_decimal(), dec!(2000.03));
        assert_eq!(quote.spread(), dec!(0.03));
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("m5".parse::<Timeframe>().unwrap(), Timeframe::M5);
        assert!("H4".parse::<Timeframe>().is_err());
    }
}
