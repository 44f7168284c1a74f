//! Backtest report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vpskew_domain::{Direction, Event, ExitReason, PositionId, Price, Quantity};
use vpskew_exec::ClosedPosition;

/// One round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: PositionId,
    pub direction: Direction,
    pub entry_price: Price,
    pub exit_price: Price,
    pub volume: Quantity,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub reason: ExitReason,
    /// Price units times volume
    pub pnl: Decimal,
}

impl TradeRecord {
    /// Record a confirmed close
    pub fn from_closed(closed: &ClosedPosition, closed_at: DateTime<Utc>) -> Self {
        Self {
            position_id: closed.position.id.clone(),
            direction: closed.position.direction,
            entry_price: closed.position.entry_price,
            exit_price: closed.exit_price,
            volume: closed.position.volume,
            opened_at: closed.position.opened_at,
            closed_at,
            reason: closed.reason,
            pnl: closed.pnl(),
        }
    }
}

/// Summary of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Cycles run (one per replayed bar)
    pub cycles: usize,
    /// Cycles that aborted on a venue read error
    pub failed_cycles: usize,
    pub signals: usize,
    pub trades: Vec<TradeRecord>,
    pub wins: usize,
    pub losses: usize,
    pub net_pnl: Decimal,
    /// Closed trades per exit reason
    pub exit_reasons: BTreeMap<String, usize>,
    /// Positions still open when the tape ended
    pub open_at_end: usize,
    /// Full decision log
    pub events: Vec<Event>,
}

impl BacktestReport {
    /// Aggregate trades and events
    pub fn new(
        cycles: usize,
        failed_cycles: usize,
        signals: usize,
        trades: Vec<TradeRecord>,
        open_at_end: usize,
        events: Vec<Event>,
    ) -> Self {
        let wins = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let losses = trades.iter().filter(|t| t.pnl < Decimal::ZERO).count();
        let net_pnl = trades.iter().map(|t| t.pnl).sum();

        let mut exit_reasons = BTreeMap::new();
        for trade in &trades {
            *exit_reasons.entry(trade.reason.as_str().to_string()).or_insert(0) += 1;
        }

        Self {
            cycles,
            failed_cycles,
            signals,
            trades,
            wins,
            losses,
            net_pnl,
            exit_reasons,
            open_at_end,
            events,
        }
    }

    /// Winning share of closed trades
    pub fn win_rate(&self) -> Option<Decimal> {
        if self.trades.is_empty() {
            None
        } else {
            Some(Decimal::from(self.wins as u64) / Decimal::from(self.trades.len() as u64))
        }
    }
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cycles:       {} ({} failed)", self.cycles, self.failed_cycles)?;
        writeln!(f, "signals:      {}", self.signals)?;
        writeln!(f, "trades:       {} ({} wins, {} losses)", self.trades.len(), self.wins, self.losses)?;
        match self.win_rate() {
            Some(rate) => writeln!(f, "win rate:     {}%", (rate * Decimal::ONE_HUNDRED).round_dp(1))?,
            None => writeln!(f, "win rate:     n/a")?,
        }
        writeln!(f, "net pnl:      {}", self.net_pnl)?;
        for (reason, count) in &self.exit_reasons {
            writeln!(f, "  {reason:<12} {count}")?;
        }
        write!(f, "open at end:  {}", self.open_at_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(id: &str, reason: ExitReason, pnl: Decimal) -> TradeRecord {
        TradeRecord {
            position_id: PositionId::new(id),
            direction: Direction::Buy,
            entry_price: Price::new(dec!(2000)).unwrap(),
            exit_price: Price::new(dec!(2000) + pnl).unwrap(),
            volume: Quantity::new(dec!(1)).unwrap(),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
            reason,
            pnl,
        }
    }

    #[test]
    fn test_report_aggregates() {
        let report = BacktestReport::new(
            10,
            0,
            3,
            vec![
                trade("SIM-1", ExitReason::TakeProfitHit, dec!(0.50)),
                trade("SIM-2", ExitReason::Recovery, dec!(-0.20)),
                trade("SIM-3", ExitReason::Recovery, dec!(-0.10)),
            ],
            1,
            Vec::new(),
        );

        assert_eq!(report.wins, 1);
        assert_eq!(report.losses, 2);
        assert_eq!(report.net_pnl, dec!(0.20));
        assert_eq!(report.exit_reasons.get("RECOVERY_EXIT"), Some(&2));
        assert_eq!(report.exit_reasons.get("TP_HIT"), Some(&1));
        assert!(report.to_string().contains("net pnl:      0.20"));
    }

    #[test]
    fn test_empty_report_has_no_win_rate() {
        let report = BacktestReport::new(0, 0, 0, Vec::new(), 0, Vec::new());

        assert_eq!(report.win_rate(), None);
        assert!(report.to_string().contains("n/a"));
    }
}
