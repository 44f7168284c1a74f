//! Replay venue.
//!
//! Implements `VenuePort` over a `MarketTape`. A replay clock decides what
//! is visible: bars that closed at or before the clock, ticks strictly
//! before it. Orders fill immediately at the quote. Positions only leave
//! the venue through `close_position`; SL/TP crossings are left to the
//! controller's bar-level rule.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use vpskew_domain::{Bar, Position, PositionId, Price, Quantity, Quote, Symbol, Tick, Timeframe};
use vpskew_exec::{AccountInfo, ExecError, OrderRequest, VenueAck, VenuePort};

use crate::tape::MarketTape;

#[derive(Debug)]
struct ReplayState {
    clock: DateTime<Utc>,
    positions: BTreeMap<PositionId, Position>,
    order_counter: u64,
    balance: Decimal,
}

/// Venue replaying a recorded tape
#[derive(Debug)]
pub struct ReplayVenue {
    tape: MarketTape,
    state: RwLock<ReplayState>,
}

impl ReplayVenue {
    /// Replay `tape` starting with the clock at its first bar's open.
    pub fn new(tape: MarketTape, balance: Decimal) -> Self {
        let clock = tape.bars.first().map(|b| b.open_time).unwrap_or_else(Utc::now);
        Self {
            tape,
            state: RwLock::new(ReplayState {
                clock,
                positions: BTreeMap::new(),
                order_counter: 0,
                balance,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ReplayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReplayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tape being replayed
    pub fn tape(&self) -> &MarketTape {
        &self.tape
    }

    /// Current replay time
    pub fn clock(&self) -> DateTime<Utc> {
        self.read().clock
    }

    /// Move the clock forward. Moving backwards is ignored.
    pub fn advance_to(&self, time: DateTime<Utc>) {
        let mut state = self.write();
        if time > state.clock {
            state.clock = time;
        }
    }

    /// Balance after realised P&L
    pub fn balance(&self) -> Decimal {
        self.read().balance
    }

    /// Bars closed at `clock`
    fn closed_bars(&self, clock: DateTime<Utc>) -> &[Bar] {
        let timeframe = self.tape.timeframe;
        let end = self.tape.bars.partition_point(|b| b.close_time(timeframe) <= clock);
        &self.tape.bars[..end]
    }

    fn quote_at(&self, clock: DateTime<Utc>) -> Option<Quote> {
        let visible = self.tape.ticks.partition_point(|t| t.time <= clock);
        let last_tick = visible.checked_sub(1).map(|i| &self.tape.ticks[i]);
        let last_bar = self.closed_bars(clock).last();

        let from_tick = |tick: &Tick| -> Option<Quote> {
            Some(Quote {
                bid: Price::new(tick.bid).ok()?,
                ask: Price::new(tick.ask).ok()?,
                time: tick.time,
            })
        };
        let from_bar = |bar: &Bar| -> Option<Quote> {
            let half = self.tape.spread / Decimal::TWO;
            Some(Quote {
                bid: Price::new(self.tape.instrument.normalize(bar.close - half)).ok()?,
                ask: Price::new(self.tape.instrument.normalize(bar.close + half)).ok()?,
                time: bar.close_time(self.tape.timeframe),
            })
        };

        match (last_tick, last_bar) {
            (Some(tick), Some(bar)) if bar.close_time(self.tape.timeframe) > tick.time => from_bar(bar),
            (Some(tick), _) => from_tick(tick),
            (None, Some(bar)) => from_bar(bar),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl VenuePort for ReplayVenue {
    async fn health_check(&self) -> Result<(), ExecError> {
        if self.tape.bars.is_empty() {
            return Err(ExecError::Connectivity("Tape has no bars".to_string()));
        }
        Ok(())
    }

    async fn get_recent_bars(
        &self,
        _symbol: &Symbol,
        timeframe: Timeframe,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Bar>, ExecError> {
        if timeframe != self.tape.timeframe {
            return Err(ExecError::Venue(format!(
                "Tape recorded in {:?}, requested {:?}",
                self.tape.timeframe, timeframe
            )));
        }
        let closed = self.closed_bars(self.clock());
        let end = closed.len().saturating_sub(offset.saturating_sub(1));
        let start = end.saturating_sub(count);
        Ok(closed[start..end].to_vec())
    }

    async fn get_ticks(
        &self,
        _symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Tick>, ExecError> {
        let end = end.min(self.clock());
        let from = self.tape.ticks.partition_point(|t| t.time < start);
        let to = self.tape.ticks.partition_point(|t| t.time < end);
        Ok(self.tape.ticks[from..to.max(from)].to_vec())
    }

    async fn get_current_quote(&self, symbol: &Symbol) -> Result<Quote, ExecError> {
        self.quote_at(self.clock())
            .ok_or_else(|| ExecError::Venue(format!("No quote for {symbol} yet")))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<VenueAck, ExecError> {
        let mut state = self.write();
        let Some(quote) = self.quote_at(state.clock) else {
            return Ok(VenueAck::rejected("No quote"));
        };
        let fill = quote.entry_price(request.direction);

        state.order_counter += 1;
        let id = PositionId::new(format!("SIM-{}", state.order_counter));
        let position = Position::new(
            id.clone(),
            request.symbol.clone(),
            request.direction,
            fill,
            request.volume,
            state.clock,
        )
        .with_bracket(request.stop, request.take_profit);
        state.positions.insert(id.clone(), position);

        debug!(position_id = %id, %fill, clock = %state.clock, "Replay: order filled");
        Ok(VenueAck::accepted(Some(id), Some(fill)))
    }

    async fn modify_stop(&self, position_id: &PositionId, new_stop: Price) -> Result<VenueAck, ExecError> {
        let mut state = self.write();
        match state.positions.get_mut(position_id) {
            Some(position) => {
                position.current_stop = Some(new_stop);
                Ok(VenueAck::accepted(None, None))
            },
            None => Ok(VenueAck::rejected(format!("Unknown position {position_id}"))),
        }
    }

    async fn close_position(
        &self,
        position_id: &PositionId,
        _volume: Quantity,
        price: Price,
    ) -> Result<VenueAck, ExecError> {
        let mut state = self.write();
        match state.positions.remove(position_id) {
            Some(position) => {
                state.balance += position.pnl(price);
                Ok(VenueAck::accepted(None, Some(price)))
            },
            None => Ok(VenueAck::rejected(format!("Unknown position {position_id}"))),
        }
    }

    async fn list_open_positions(&self, symbol: &Symbol) -> Result<Vec<Position>, ExecError> {
        Ok(self
            .read()
            .positions
            .values()
            .filter(|p| &p.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn get_account(&self) -> Result<AccountInfo, ExecError> {
        let balance = self.balance();
        Ok(AccountInfo {
            balance,
            free_margin: balance,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use vpskew_domain::{Direction, Instrument};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
    }

    fn symbol() -> Symbol {
        Symbol::new("XAUUSDm").unwrap()
    }

    fn tape() -> MarketTape {
        MarketTape {
            instrument: Instrument::with_point_grid(symbol(), 2).unwrap(),
            timeframe: Timeframe::M1,
            spread: dec!(0.02),
            bars: (0..3)
                .map(|i| Bar {
                    open_time: t0() + Duration::minutes(i),
                    open: dec!(2000),
                    high: dec!(2001),
                    low: dec!(1999),
                    close: dec!(2000.50),
                    tick_volume: 10,
                })
                .collect(),
            ticks: vec![
                Tick::new(t0() + Duration::seconds(30), dec!(2000.10), dec!(2000.12), dec!(1)),
                Tick::new(t0() + Duration::seconds(90), dec!(2000.20), dec!(2000.22), dec!(1)),
            ],
        }
    }

    #[tokio::test]
    async fn test_only_closed_bars_visible() {
        let venue = ReplayVenue::new(tape(), dec!(1000));

        let none = venue.get_recent_bars(&symbol(), Timeframe::M1, 1, 10).await.unwrap();
        assert!(none.is_empty());

        venue.advance_to(t0() + Duration::minutes(2));
        let bars = venue.get_recent_bars(&symbol(), Timeframe::M1, 1, 10).await.unwrap();
        assert_eq!(bars.len(), 2);

        // Clock never goes back
        venue.advance_to(t0());
        assert_eq!(venue.clock(), t0() + Duration::minutes(2));
    }

    #[tokio::test]
    async fn test_ticks_stop_at_clock() {
        let venue = ReplayVenue::new(tape(), dec!(1000));
        venue.advance_to(t0() + Duration::minutes(1));

        let ticks = venue
            .get_ticks(&symbol(), t0(), t0() + Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(ticks.len(), 1);
    }

    #[tokio::test]
    async fn test_quote_prefers_most_recent_source() {
        let venue = ReplayVenue::new(tape(), dec!(1000));

        // Tick at 10:01:30 is newer than the 10:01 bar close
        venue.advance_to(t0() + Duration::seconds(100));
        let quote = venue.get_current_quote(&symbol()).await.unwrap();
        assert_eq!(quote.bid.as_decimal(), dec!(2000.20));

        // 10:02 bar close is newer than the last tick: close ± half spread
        venue.advance_to(t0() + Duration::minutes(2));
        let quote = venue.get_current_quote(&symbol()).await.unwrap();
        assert_eq!(quote.bid.as_decimal(), dec!(2000.49));
        assert_eq!(quote.ask.as_decimal(), dec!(2000.51));
    }

    #[tokio::test]
    async fn test_fill_and_close_update_balance() {
        let venue = ReplayVenue::new(tape(), dec!(1000));
        venue.advance_to(t0() + Duration::seconds(45));

        let ack = venue
            .place_order(&OrderRequest {
                symbol: symbol(),
                direction: Direction::Buy,
                volume: Quantity::new(dec!(1)).unwrap(),
                price: Price::new(dec!(2000.12)).unwrap(),
                stop: None,
                take_profit: None,
                comment: "test".to_string(),
            })
            .await
            .unwrap();
        let id = ack.position_id.unwrap();
        assert_eq!(id, PositionId::new("SIM-1"));
        assert_eq!(ack.price.unwrap().as_decimal(), dec!(2000.12));

        let closed = venue
            .close_position(&id, Quantity::new(dec!(1)).unwrap(), Price::new(dec!(2000.62)).unwrap())
            .await
            .unwrap();

        assert!(closed.accepted);
        assert_eq!(venue.balance(), dec!(1000.50));
        assert!(venue.list_open_positions(&symbol()).await.unwrap().is_empty());
    }
}
