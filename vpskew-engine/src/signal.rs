//! Signal Generator
//!
//! One generator, parameterized by `SignalConfig`, covers every threshold
//! variant. Filters short-circuit in a fixed order:
//!
//! 1. Trading window (bar open time, UTC)
//! 2. ATR readiness
//! 3. Activity spike
//! 4. Non-empty profile
//! 5. Skew magnitude
//!
//! The generator holds no state across bars; the rolling activity
//! average is an input.

use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vpskew_domain::{Bar, Direction, Price, Signal, SkipReason, VolumeProfile};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Trading window
// =============================================================================

/// Time-of-day window `[start, end)` in UTC.
///
/// `start > end` wraps over midnight; `start == end` means all day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingWindow {
    /// Window from start (inclusive) to end (exclusive)
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Window that never filters
    pub fn all_day() -> Self {
        Self::new(NaiveTime::MIN, NaiveTime::MIN)
    }

    /// Whether `time` falls inside the window
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        // Drop sub-second noise so venue timestamps compare cleanly
        let t = time.time().with_nanosecond(0).unwrap_or_else(|| time.time());
        if self.start == self.end {
            true
        } else if self.start < self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl Default for TradingWindow {
    fn default() -> Self {
        Self::new(
            NaiveTime::MIN,
            NaiveTime::from_hms_opt(20, 55, 0).unwrap_or(NaiveTime::MIN),
        )
    }
}

// =============================================================================
// Config
// =============================================================================

/// What the spike filter measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMeasure {
    /// Venue tick count of the bar
    #[default]
    TickCount,
    /// Summed (normalized) tick volume of the bar window
    TickVolume,
}

impl FromStr for ActivityMeasure {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tick_count" | "ticks" => Ok(ActivityMeasure::TickCount),
            "tick_volume" | "volume" => Ok(ActivityMeasure::TickVolume),
            other => Err(EngineError::InvalidConfig(format!("unknown activity measure '{other}'"))),
        }
    }
}

/// Signal thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub window: TradingWindow,
    /// Bars in the ATR mean
    pub atr_period: usize,
    /// Activity must exceed `rolling_average * spike_factor`
    pub spike_factor: Decimal,
    /// Minimum |skew|
    pub skew_threshold: Decimal,
    /// Value area coverage in (0, 1]
    pub coverage: Decimal,
    pub activity_measure: ActivityMeasure,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window: TradingWindow::default(),
            atr_period: 14,
            spike_factor: dec!(0.8),
            skew_threshold: dec!(0.1),
            coverage: dec!(0.7),
            activity_measure: ActivityMeasure::TickCount,
        }
    }
}

impl SignalConfig {
    /// Validate thresholds
    pub fn validate(&self) -> EngineResult<()> {
        if self.atr_period == 0 {
            return Err(EngineError::InvalidConfig("atr_period must be > 0".to_string()));
        }
        if self.coverage <= Decimal::ZERO || self.coverage > Decimal::ONE {
            return Err(EngineError::InvalidConfig(format!(
                "coverage must be in (0, 1], got {}",
                self.coverage
            )));
        }
        if self.spike_factor < Decimal::ZERO {
            return Err(EngineError::InvalidConfig(format!(
                "spike_factor must be >= 0, got {}",
                self.spike_factor
            )));
        }
        if self.skew_threshold < Decimal::ZERO {
            return Err(EngineError::InvalidConfig(format!(
                "skew_threshold must be >= 0, got {}",
                self.skew_threshold
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Outcome of evaluating one closed bar
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// All filters passed
    Trade(Signal),
    /// A filter rejected the bar
    Skip(SkipReason),
}

impl Evaluation {
    /// Signal, if any
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Evaluation::Trade(signal) => Some(signal),
            Evaluation::Skip(_) => None,
        }
    }

    /// Rejecting filter, if any
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Evaluation::Trade(_) => None,
            Evaluation::Skip(reason) => Some(*reason),
        }
    }
}

/// Turns a closed bar and its profile into a trade signal
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    /// Create a generator with validated thresholds
    pub fn new(config: SignalConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Thresholds in use
    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Whether a bar opened at `time` is tradable
    pub fn in_trading_window(&self, time: DateTime<Utc>) -> bool {
        self.config.window.contains(time)
    }

    /// Observed activity of a bar under the configured measure
    pub fn activity(&self, bar: &Bar, profile: Option<&VolumeProfile>) -> Decimal {
        match self.config.activity_measure {
            ActivityMeasure::TickCount => Decimal::from(bar.tick_volume),
            ActivityMeasure::TickVolume => profile.map(|p| p.total_volume()).unwrap_or(Decimal::ZERO),
        }
    }

    /// Evaluate one closed bar
    pub fn generate(
        &self,
        bar: &Bar,
        profile: Option<&VolumeProfile>,
        rolling_average: Decimal,
        atr: Option<Decimal>,
    ) -> Evaluation {
        if !self.in_trading_window(bar.open_time) {
            return self.skip(bar, SkipReason::OutsideTradingWindow);
        }

        if atr.is_none() {
            return self.skip(bar, SkipReason::AtrNotReady);
        }

        let activity = self.activity(bar, profile);
        let threshold = rolling_average * self.config.spike_factor;
        if activity <= threshold {
            debug!(bar = %bar.open_time, %activity, %threshold, "Quiet bar");
            return Evaluation::Skip(SkipReason::QuietBar);
        }

        let Some(profile) = profile else {
            return self.skip(bar, SkipReason::EmptyProfile);
        };

        let skew = profile.skew();
        if skew.abs() < self.config.skew_threshold || skew.is_zero() {
            debug!(bar = %bar.open_time, %skew, "Weak skew");
            return Evaluation::Skip(SkipReason::WeakSkew);
        }

        let Ok(reference_price) = Price::new(profile.point_of_control()) else {
            return self.skip(bar, SkipReason::EmptyProfile);
        };

        let direction = if skew > Decimal::ZERO { Direction::Buy } else { Direction::Sell };

        Evaluation::Trade(Signal {
            direction,
            reference_price,
            strength: skew,
            bar_time: bar.open_time,
        })
    }

    fn skip(&self, bar: &Bar, reason: SkipReason) -> Evaluation {
        debug!(bar = %bar.open_time, reason = reason.as_str(), "No signal");
        Evaluation::Skip(reason)
    }
}

// =============================================================================
// Tests
// =============================================================================
