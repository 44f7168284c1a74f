//! vpskew backtest CLI
//!
//! Replays a recorded tape through the live cycle pipeline.
//!
//! # Usage
//!
//! ```bash
//! vpskew-backtest tape.json
//! vpskew-backtest tape.json --skew-threshold 0.2 --max-positions 3 --json
//! RUST_LOG=vpskew::audit=info vpskew-backtest tape.json   # full decision log
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vpskew_engine::TradingWindow;
use vpskew_sim::{Backtest, BacktestConfig, MarketTape};

#[derive(Parser)]
#[command(name = "vpskew-backtest", about = "Replay a market tape through the volume-profile skew strategy")]
struct Cli {
    /// Tape file (JSON).
    tape: PathBuf,

    /// Fixed volume per entry.
    #[arg(long, default_value = "0.01")]
    lot: Decimal,

    /// Starting balance.
    #[arg(long, default_value = "10000")]
    balance: Decimal,

    /// Concurrent position cap.
    #[arg(long, default_value_t = 5)]
    max_positions: usize,

    /// Minimum |skew| for a signal.
    #[arg(long, default_value = "0.1")]
    skew_threshold: Decimal,

    /// Activity must exceed the rolling average times this factor.
    #[arg(long, default_value = "0.8")]
    spike_factor: Decimal,

    /// Value area coverage.
    #[arg(long, default_value = "0.7")]
    coverage: Decimal,

    /// ATR period in bars.
    #[arg(long, default_value_t = 14)]
    atr_period: usize,

    /// Bars used to seed the activity baseline before trading.
    #[arg(long, default_value_t = 20)]
    warmup: usize,

    /// Trade around the clock instead of 00:00-20:55 UTC.
    #[arg(long, default_value_t = false)]
    all_day: bool,

    /// Print the report (with the decision log) as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let tape = MarketTape::load(&cli.tape).with_context(|| format!("loading {}", cli.tape.display()))?;

    let mut config = BacktestConfig {
        lot: cli.lot,
        initial_balance: cli.balance,
        warmup_bars: cli.warmup,
        ..BacktestConfig::default()
    };
    config.controller.max_positions = cli.max_positions;
    config.signal.skew_threshold = cli.skew_threshold;
    config.signal.spike_factor = cli.spike_factor;
    config.signal.coverage = cli.coverage;
    config.signal.atr_period = cli.atr_period;
    if cli.all_day {
        config.signal.window = TradingWindow::all_day();
    }

    let report = Backtest::new(config).run(tape).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
