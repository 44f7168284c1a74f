//! Recorded market tape.
//!
//! A tape holds closed bars and raw ticks for one instrument, both oldest
//! first, serialized as JSON:
//!
//! ```json
//! {
//!   "instrument": { "symbol": "XAUUSDm", "digits": 2, "price_step": "0.01" },
//!   "timeframe": "M1",
//!   "spread": "0.02",
//!   "bars": [ { "open_time": "...", "open": "...", ..., "tick_volume": 120 } ],
//!   "ticks": [ { "time": "...", "bid": "...", "ask": "...", "volume": "1" } ]
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vpskew_domain::{Bar, Instrument, Tick, Timeframe};

use crate::error::{SimError, SimResult};

/// Bars and ticks of one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTape {
    pub instrument: Instrument,
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Spread applied around bar closes when no tick is available
    #[serde(default)]
    pub spread: Decimal,
    pub bars: Vec<Bar>,
    #[serde(default)]
    pub ticks: Vec<Tick>,
}

impl MarketTape {
    /// Read and validate a tape file
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let tape: MarketTape = serde_json::from_reader(reader)?;
        tape.validate()?;
        Ok(tape)
    }

    /// Parse and validate a tape from a JSON string
    pub fn from_json(json: &str) -> SimResult<Self> {
        let tape: MarketTape = serde_json::from_str(json)?;
        tape.validate()?;
        Ok(tape)
    }

    /// Check ordering and grid consistency.
    ///
    /// Deserialization bypasses `Instrument::new`, so the instrument is
    /// rebuilt here to re-run its checks.
    pub fn validate(&self) -> SimResult<()> {
        Instrument::new(
            self.instrument.symbol().clone(),
            self.instrument.digits(),
            self.instrument.price_step(),
        )?;

        if self.spread < Decimal::ZERO {
            return Err(SimError::InvalidTape(format!("spread must be >= 0, got {}", self.spread)));
        }
        if let Some(pair) = self.bars.windows(2).find(|w| w[1].open_time <= w[0].open_time) {
            return Err(SimError::InvalidTape(format!(
                "bars out of order at {}",
                pair[1].open_time
            )));
        }
        if let Some(pair) = self.ticks.windows(2).find(|w| w[1].time < w[0].time) {
            return Err(SimError::InvalidTape(format!("ticks out of order at {}", pair[1].time)));
        }
        if let Some(bar) = self.bars.iter().find(|b| b.low > b.high) {
            return Err(SimError::InvalidTape(format!("bar {} has low > high", bar.open_time)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAPE: &str = r#"{
        "instrument": { "symbol": "XAUUSDm", "digits": 2, "price_step": "0.01" },
        "bars": [
            { "open_time": "2025-03-03T10:00:00Z", "open": "2000", "high": "2001", "low": "1999", "close": "2000.5", "tick_volume": 10 },
            { "open_time": "2025-03-03T10:01:00Z", "open": "2000.5", "high": "2001", "low": "2000", "close": "2000.7", "tick_volume": 12 }
        ],
        "ticks": [
            { "time": "2025-03-03T10:00:05Z", "bid": "2000.00", "ask": "2000.02", "volume": "0" }
        ]
    }"#;

    #[test]
    fn test_parse_tape_with_defaults() {
        let tape = MarketTape::from_json(TAPE).unwrap();

        assert_eq!(tape.timeframe, Timeframe::M1);
        assert_eq!(tape.spread, Decimal::ZERO);
        assert_eq!(tape.bars.len(), 2);
        // Raw zero volume still weighs one
        assert_eq!(tape.ticks[0].weight(), Decimal::ONE);
    }

    #[test]
    fn test_out_of_order_bars_rejected() {
        let mut tape = MarketTape::from_json(TAPE).unwrap();
        tape.bars.reverse();

        assert!(matches!(tape.validate(), Err(SimError::InvalidTape(_))));
    }

    #[test]
    fn test_bad_grid_rejected() {
        let json = TAPE.replace("\"price_step\": \"0.01\"", "\"price_step\": \"0\"");

        assert!(matches!(MarketTape::from_json(&json), Err(SimError::Domain(_))));
    }
}
