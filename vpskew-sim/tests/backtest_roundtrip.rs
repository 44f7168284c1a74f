//! Backtest over a hand-built tape.
//!
//! Flow:
//! 1. Bars 0-2 seed the activity baseline (warm-up)
//! 2. Bars 3-4 have no ticks → skipped
//! 3. Bar 5 spikes with POC above the value-area midpoint → BUY at 2000.11
//! 4. Bar 6 rallies → trailing stop to 2000.26
//! 5. Bar 7 dips through the stop → SL_HIT at the bid

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vpskew_domain::{Bar, Direction, Event, ExitReason, Instrument, Symbol, Tick, Timeframe};
use vpskew_engine::TradingWindow;
use vpskew_sim::{Backtest, BacktestConfig, MarketTape};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
}

fn bar(i: i64, high: Decimal, low: Decimal, close: Decimal, tick_volume: u64) -> Bar {
    Bar {
        open_time: t0() + Duration::minutes(i),
        open: dec!(2000.10),
        high,
        low,
        close,
        tick_volume,
    }
}

fn tape() -> MarketTape {
    let mut bars: Vec<Bar> = (0..5)
        .map(|i| bar(i, dec!(2000.20), dec!(2000.00), dec!(2000.10), 100))
        .collect();
    bars.push(bar(5, dec!(2000.20), dec!(2000.00), dec!(2000.10), 300));
    bars.push(bar(6, dec!(2000.35), dec!(2000.10), dec!(2000.30), 100));
    bars.push(bar(7, dec!(2000.30), dec!(2000.15), dec!(2000.20), 100));

    let at = t0() + Duration::minutes(5) + Duration::seconds(10);
    let ticks = [
        (dec!(2000.10), dec!(1)),
        (dec!(2000.11), dec!(1)),
        (dec!(2000.12), dec!(1)),
        (dec!(2000.13), dec!(1)),
        (dec!(2000.14), dec!(6)),
    ]
    .into_iter()
    .map(|(p, v)| Tick::new(at, p, p, v))
    .collect();

    MarketTape {
        instrument: Instrument::with_point_grid(Symbol::new("XAUUSDm").unwrap(), 2).unwrap(),
        timeframe: Timeframe::M1,
        spread: dec!(0.02),
        bars,
        ticks,
    }
}

fn config() -> BacktestConfig {
    let mut config = BacktestConfig {
        warmup_bars: 3,
        ..BacktestConfig::default()
    };
    config.signal.atr_period = 3;
    config.signal.window = TradingWindow::all_day();
    config
}

#[tokio::test]
async fn test_entry_trail_and_stop_out() {
    let report = Backtest::new(config()).run(tape()).await.unwrap();

    assert_eq!(report.cycles, 5);
    assert_eq!(report.failed_cycles, 0);
    assert_eq!(report.signals, 1);
    assert_eq!(report.trades.len(), 1);

    let trade = &report.trades[0];
    assert_eq!(trade.direction, Direction::Buy);
    assert_eq!(trade.entry_price.as_decimal(), dec!(2000.11));
    assert_eq!(trade.reason, ExitReason::StopLossHit);
    assert_eq!(trade.exit_price.as_decimal(), dec!(2000.19));
    assert_eq!(trade.pnl, dec!(0.0008));

    assert_eq!(report.wins, 1);
    assert_eq!(report.open_at_end, 0);
    assert_eq!(report.exit_reasons.get("SL_HIT"), Some(&1));

    let stop_updates: Vec<_> = report
        .events
        .iter()
        .filter_map(|e| match e {
            Event::StopUpdated { new_stop, accepted: true, .. } => Some(new_stop.as_decimal()),
            _ => None,
        })
        .collect();
    assert_eq!(stop_updates, vec![dec!(2000.26)]);
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let first = Backtest::new(config()).run(tape()).await.unwrap();
    let second = Backtest::new(config()).run(tape()).await.unwrap();

    assert_eq!(first.trades, second.trades);
    assert_eq!(first.events.len(), second.events.len());
}

#[tokio::test]
async fn test_empty_tape_fails_health_check() {
    let mut empty = tape();
    empty.bars.clear();
    empty.ticks.clear();

    assert!(Backtest::new(config()).run(empty).await.is_err());
}
