//! Daemon configuration.
//!
//! Loads configuration from environment variables (and `.env`) with
//! sensible defaults. Every value is validated before the daemon starts;
//! an invalid value aborts startup with `DaemonError::Config`.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use chrono::{Duration, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vpskew_domain::{FixedLot, Instrument, LotRules, MarginCapped, Quantity, RiskPercent, SizingPolicy, Symbol, Timeframe};
use vpskew_engine::{
    ActivityMeasure, AtrBrackets, ControllerConfig, ExitRule, SignalConfig, TradingWindow,
};
use vpskew_exec::CycleConfig;

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Environment (test, development, production)
    pub environment: Environment,
    pub instrument: InstrumentConfig,
    pub signal: SignalConfig,
    pub controller: ControllerConfig,
    pub cycle: CycleConfig,
    pub sizing: SizingConfig,
    /// Delay after each minute boundary before pulling the closed bar
    pub boundary_settle: Duration,
}

/// Traded instrument settings.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Quoted decimal places (point = 10^-digits)
    pub digits: u32,
    /// Histogram bin width (defaults to one point)
    pub price_step: Option<Decimal>,
}

/// Position sizing policy selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingConfig {
    /// Constant volume
    FixedLot { lot: Decimal },
    /// Risk a share of balance per trade
    RiskPercent { lot_rules: LotRules },
    /// Risk-based, capped by a share of free margin
    MarginCapped {
        lot_rules: LotRules,
        margin_per_lot: Decimal,
        margin_fraction: Decimal,
    },
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an explicit key/value map.
    pub fn from_map(values: &HashMap<String, String>) -> DaemonResult<Self> {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DaemonResult<Self> {
        let vars = Vars { lookup: &lookup };

        let environment = match vars.raw("VPSKEW_ENV").unwrap_or_else(|| "development".to_string()).to_lowercase().as_str() {
            "test" => Environment::Test,
            "development" | "dev" => Environment::Development,
            "production" | "prod" => Environment::Production,
            other => {
                return Err(DaemonError::Config(format!(
                    "Invalid VPSKEW_ENV: {other}. Expected: test, development, production"
                )))
            },
        };

        let defaults = Self::default();

        let instrument = InstrumentConfig {
            symbol: vars.raw("VPSKEW_SYMBOL").unwrap_or(defaults.instrument.symbol),
            digits: vars.parse("VPSKEW_DIGITS", defaults.instrument.digits)?,
            price_step: vars.optional("VPSKEW_PRICE_STEP")?,
        };

        let window = TradingWindow::new(
            vars.time("VPSKEW_TRADING_START", defaults.signal.window.start)?,
            vars.time("VPSKEW_TRADING_END", defaults.signal.window.end)?,
        );
        let signal = SignalConfig {
            window,
            atr_period: vars.parse("VPSKEW_ATR_PERIOD", defaults.signal.atr_period)?,
            spike_factor: vars.parse("VPSKEW_SPIKE_FACTOR", defaults.signal.spike_factor)?,
            skew_threshold: vars.parse("VPSKEW_SKEW_THRESHOLD", defaults.signal.skew_threshold)?,
            coverage: vars.parse("VPSKEW_COVERAGE", defaults.signal.coverage)?,
            activity_measure: vars.parse::<ActivityMeasure>("VPSKEW_ACTIVITY_MEASURE", defaults.signal.activity_measure)?,
        };

        let mut trailing = defaults.controller.trailing;
        trailing.trigger_points = vars.parse("VPSKEW_TRAIL_TRIGGER", trailing.trigger_points)?;
        trailing.buffer_points = vars.parse("VPSKEW_TRAIL_BUFFER", trailing.buffer_points)?;
        trailing.min_move_points = vars.parse("VPSKEW_MIN_STOP_MOVE", trailing.min_move_points)?;

        let brackets = match vars.optional::<Decimal>("VPSKEW_SL_ATR_MULT")? {
            Some(sl_mult) => Some(AtrBrackets {
                sl_mult,
                tp_mult: vars.optional("VPSKEW_TP_ATR_MULT")?,
            }),
            None => None,
        };

        let controller = ControllerConfig {
            max_positions: vars.parse("VPSKEW_MAX_POSITIONS", defaults.controller.max_positions)?,
            trailing,
            stop_cooldown: vars.seconds("VPSKEW_TRAIL_COOLDOWN_SECS", 30)?,
            recovery_zone_points: vars.parse("VPSKEW_RECOVERY_ZONE", defaults.controller.recovery_zone_points)?,
            cluster_ratio: vars.parse("VPSKEW_CLUSTER_RATIO", defaults.controller.cluster_ratio)?,
            exit_priority: vars.exit_priority("VPSKEW_EXIT_PRIORITY", defaults.controller.exit_priority)?,
            brackets,
        };

        let cycle = CycleConfig {
            timeframe: vars.parse::<Timeframe>("VPSKEW_TIMEFRAME", defaults.cycle.timeframe)?,
            activity_lookback: vars.parse("VPSKEW_ACTIVITY_LOOKBACK", defaults.cycle.activity_lookback)?,
            cluster_window: vars.seconds("VPSKEW_CLUSTER_WINDOW_SECS", 10)?,
            cluster_max_ticks: vars.parse("VPSKEW_CLUSTER_MAX_TICKS", defaults.cycle.cluster_max_ticks)?,
            risk_fraction: vars.parse("VPSKEW_RISK_FRACTION", defaults.cycle.risk_fraction)?,
            point_value: vars.parse("VPSKEW_POINT_VALUE", defaults.cycle.point_value)?,
        };

        let lot_rules = LotRules {
            min_lot: vars.parse("VPSKEW_MIN_LOT", LotRules::default().min_lot)?,
            lot_step: vars.parse("VPSKEW_LOT_STEP", LotRules::default().lot_step)?,
        };
        let sizing = match vars.raw("VPSKEW_SIZING").unwrap_or_else(|| "fixed".to_string()).to_lowercase().as_str() {
            "fixed" | "fixed_lot" => SizingConfig::FixedLot {
                lot: vars.parse("VPSKEW_LOT_SIZE", dec!(0.01))?,
            },
            "risk" | "risk_percent" => SizingConfig::RiskPercent { lot_rules },
            "margin" | "margin_capped" => SizingConfig::MarginCapped {
                lot_rules,
                margin_per_lot: vars.required("VPSKEW_MARGIN_PER_LOT")?,
                margin_fraction: vars.parse("VPSKEW_MARGIN_FRACTION", MarginCapped::DEFAULT_MARGIN_FRACTION)?,
            },
            other => {
                return Err(DaemonError::Config(format!(
                    "Invalid VPSKEW_SIZING: {other}. Expected: fixed, risk, margin"
                )))
            },
        };

        let boundary_settle = vars.milliseconds("VPSKEW_BOUNDARY_SETTLE_MS", 500)?;

        let config = Self {
            environment,
            instrument,
            signal,
            controller,
            cycle,
            sizing,
            boundary_settle,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            environment: Environment::Test,
            signal: SignalConfig {
                window: TradingWindow::all_day(),
                ..SignalConfig::default()
            },
            boundary_settle: Duration::zero(),
            ..Self::default()
        }
    }

    /// Check every section; the first problem aborts startup.
    pub fn validate(&self) -> DaemonResult<()> {
        self.instrument()?;
        self.signal.validate().map_err(|e| DaemonError::Config(e.to_string()))?;
        self.controller.validate().map_err(|e| DaemonError::Config(e.to_string()))?;
        self.cycle.validate().map_err(|e| DaemonError::Config(e.to_string()))?;
        self.sizing_policy()?;
        if self.boundary_settle < Duration::zero() {
            return Err(DaemonError::Config("VPSKEW_BOUNDARY_SETTLE_MS must be >= 0".to_string()));
        }
        Ok(())
    }

    /// Validated instrument description
    pub fn instrument(&self) -> DaemonResult<Instrument> {
        let symbol = Symbol::new(self.instrument.symbol.clone()).map_err(|e| DaemonError::Config(e.to_string()))?;
        let result = match self.instrument.price_step {
            Some(step) => Instrument::new(symbol, self.instrument.digits, step),
            None => Instrument::with_point_grid(symbol, self.instrument.digits),
        };
        result.map_err(|e| DaemonError::Config(e.to_string()))
    }

    /// Sizing policy for the cycle
    pub fn sizing_policy(&self) -> DaemonResult<Box<dyn SizingPolicy>> {
        let invalid = |msg: String| DaemonError::Config(msg);
        match &self.sizing {
            SizingConfig::FixedLot { lot } => {
                let lot = Quantity::new(*lot).map_err(|e| invalid(e.to_string()))?;
                Ok(Box::new(FixedLot::new(lot)))
            },
            SizingConfig::RiskPercent { lot_rules } => {
                check_lot_rules(lot_rules)?;
                Ok(Box::new(RiskPercent::new(*lot_rules)))
            },
            SizingConfig::MarginCapped {
                lot_rules,
                margin_per_lot,
                margin_fraction,
            } => {
                check_lot_rules(lot_rules)?;
                if *margin_per_lot <= Decimal::ZERO {
                    return Err(invalid(format!("VPSKEW_MARGIN_PER_LOT must be > 0, got {margin_per_lot}")));
                }
                if *margin_fraction <= Decimal::ZERO || *margin_fraction > Decimal::ONE {
                    return Err(invalid(format!("VPSKEW_MARGIN_FRACTION must be in (0, 1], got {margin_fraction}")));
                }
                let mut policy = MarginCapped::new(RiskPercent::new(*lot_rules), *margin_per_lot);
                policy.margin_fraction = *margin_fraction;
                Ok(Box::new(policy))
            },
        }
    }
}

fn check_lot_rules(rules: &LotRules) -> DaemonResult<()> {
    if rules.min_lot <= Decimal::ZERO || rules.lot_step <= Decimal::ZERO {
        return Err(DaemonError::Config(format!(
            "lot grid must be positive (VPSKEW_MIN_LOT={}, VPSKEW_LOT_STEP={})",
            rules.min_lot, rules.lot_step
        )));
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            instrument: InstrumentConfig {
                symbol: "XAUUSDm".to_string(),
                digits: 2,
                price_step: None,
            },
            signal: SignalConfig::default(),
            controller: ControllerConfig::default(),
            cycle: CycleConfig::default(),
            sizing: SizingConfig::FixedLot { lot: dec!(0.01) },
            boundary_settle: Duration::milliseconds(500),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Variable parsing
// =============================================================================

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> DaemonResult<T> {
        match self.raw(key) {
            Some(val) => val
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {key} value: {val}"))),
            None => Ok(default),
        }
    }

    fn optional<T: FromStr>(&self, key: &str) -> DaemonResult<Option<T>> {
        match self.raw(key) {
            Some(val) => val
                .parse::<T>()
                .map(Some)
                .map_err(|_| DaemonError::Config(format!("Invalid {key} value: {val}"))),
            None => Ok(None),
        }
    }

    fn required<T: FromStr>(&self, key: &str) -> DaemonResult<T> {
        self.optional(key)?
            .ok_or_else(|| DaemonError::Config(format!("{key} is required")))
    }

    fn seconds(&self, key: &str, default: i64) -> DaemonResult<Duration> {
        let secs = self.parse(key, default)?;
        Duration::try_seconds(secs).ok_or_else(|| DaemonError::Config(format!("{key} out of range: {secs}")))
    }

    fn milliseconds(&self, key: &str, default: i64) -> DaemonResult<Duration> {
        let millis = self.parse(key, default)?;
        Duration::try_milliseconds(millis).ok_or_else(|| DaemonError::Config(format!("{key} out of range: {millis}")))
    }

    fn time(&self, key: &str, default: NaiveTime) -> DaemonResult<NaiveTime> {
        match self.raw(key) {
            Some(val) => NaiveTime::parse_from_str(&val, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(&val, "%H:%M:%S"))
                .map_err(|_| DaemonError::Config(format!("Invalid {key} value: {val} (expected HH:MM)"))),
            None => Ok(default),
        }
    }

    fn exit_priority(&self, key: &str, default: Vec<ExitRule>) -> DaemonResult<Vec<ExitRule>> {
        match self.raw(key) {
            Some(val) => val
                .split(',')
                .map(|rule| rule.parse::<ExitRule>().map_err(|e| DaemonError::Config(format!("{key}: {e}"))))
                .collect(),
            None => Ok(default),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.controller.max_positions, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.signal.window, TradingWindow::all_day());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_map_uses_defaults() {
        let config = Config::from_map(&HashMap::new()).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_map(&vars(&[
            ("VPSKEW_ENV", "prod"),
            ("VPSKEW_SYMBOL", "EURUSD"),
            ("VPSKEW_DIGITS", "5"),
            ("VPSKEW_MAX_POSITIONS", "3"),
            ("VPSKEW_SKEW_THRESHOLD", "0.25"),
            ("VPSKEW_TRADING_START", "07:00"),
            ("VPSKEW_TRADING_END", "16:30"),
            ("VPSKEW_TRAIL_COOLDOWN_SECS", "45"),
            ("VPSKEW_EXIT_PRIORITY", "cluster,recovery,hard_stop"),
            ("VPSKEW_SL_ATR_MULT", "0.5"),
            ("VPSKEW_TP_ATR_MULT", "2.2"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.instrument().unwrap().point(), dec!(0.00001));
        assert_eq!(config.controller.max_positions, 3);
        assert_eq!(config.signal.skew_threshold, dec!(0.25));
        assert_eq!(config.signal.window.start, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(config.controller.stop_cooldown, Duration::seconds(45));
        assert_eq!(
            config.controller.exit_priority,
            vec![ExitRule::Cluster, ExitRule::Recovery, ExitRule::HardStop]
        );
        assert_eq!(
            config.controller.brackets,
            Some(AtrBrackets {
                sl_mult: dec!(0.5),
                tp_mult: Some(dec!(2.2)),
            })
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for pairs in [
            vec![("VPSKEW_ENV", "staging")],
            vec![("VPSKEW_MAX_POSITIONS", "five")],
            vec![("VPSKEW_MAX_POSITIONS", "0")],
            vec![("VPSKEW_COVERAGE", "1.5")],
            vec![("VPSKEW_TRADING_START", "25:00")],
            vec![("VPSKEW_EXIT_PRIORITY", "recovery,recovery")],
            vec![("VPSKEW_SIZING", "martingale")],
            vec![("VPSKEW_SIZING", "margin")],
            vec![("VPSKEW_LOT_SIZE", "0")],
            vec![("VPSKEW_TRAIL_COOLDOWN_SECS", "9223372036854775807")],
            vec![("VPSKEW_CLUSTER_WINDOW_SECS", "-9223372036854775808")],
        ] {
            let result = Config::from_map(&vars(&pairs));
            assert!(matches!(result, Err(DaemonError::Config(_))), "{pairs:?} should be rejected");
        }
    }

    #[test]
    fn test_sizing_selection() {
        let config = Config::from_map(&vars(&[
            ("VPSKEW_SIZING", "margin"),
            ("VPSKEW_MARGIN_PER_LOT", "400"),
        ]))
        .unwrap();

        assert_eq!(config.sizing_policy().unwrap().name(), "margin_capped");
        assert_eq!(Config::default().sizing_policy().unwrap().name(), "fixed_lot");
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
