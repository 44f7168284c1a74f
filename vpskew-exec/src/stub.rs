//! Stub venue for testing.
//!
//! Serves scripted bars, ticks and quotes and fills orders immediately
//! at the quote, without talking to a real venue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use vpskew_domain::{Bar, Position, PositionId, Price, Quantity, Quote, Symbol, Tick, Timeframe};

use crate::error::ExecError;
use crate::ports::{AccountInfo, OrderRequest, VenueAck, VenuePort};

#[derive(Debug)]
struct StubState {
    bars: Vec<Bar>,
    ticks: Vec<Tick>,
    quote: Option<Quote>,
    positions: BTreeMap<PositionId, Position>,
    account: AccountInfo,
    order_counter: u64,
    reject_orders: bool,
    reject_modify: bool,
    reject_close: bool,
    fail_next: bool,
    healthy: bool,
    orders: Vec<OrderRequest>,
    stop_requests: Vec<(PositionId, Price)>,
}

/// Stub venue for testing.
///
/// Simulates immediate fills at the configured quote.
#[derive(Debug)]
pub struct StubVenue {
    state: RwLock<StubState>,
}

impl StubVenue {
    /// Create a healthy stub with an empty market and the given balance.
    pub fn new(balance: Decimal) -> Self {
        Self {
            state: RwLock::new(StubState {
                bars: Vec::new(),
                ticks: Vec::new(),
                quote: None,
                positions: BTreeMap::new(),
                account: AccountInfo {
                    balance,
                    free_margin: balance,
                },
                order_counter: 0,
                reject_orders: false,
                reject_modify: false,
                reject_close: false,
                fail_next: false,
                healthy: true,
                orders: Vec::new(),
                stop_requests: Vec::new(),
            }),
        }
    }

    fn state(&self) -> RwLockWriteGuard<'_, StubState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the closed bars (oldest first).
    pub fn set_bars(&self, bars: Vec<Bar>) {
        self.state().bars = bars;
    }

    /// Replace the tick history (oldest first).
    pub fn set_ticks(&self, ticks: Vec<Tick>) {
        self.state().ticks = ticks;
    }

    /// Set the current quote.
    pub fn set_quote(&self, bid: Price, ask: Price, time: DateTime<Utc>) {
        self.state().quote = Some(Quote { bid, ask, time });
    }

    /// Put a position on the venue directly (e.g. opened before a restart).
    pub fn insert_position(&self, position: Position) {
        self.state().positions.insert(position.id.clone(), position);
    }

    /// Remove a position venue-side (e.g. SL/TP hit on the venue).
    pub fn remove_position(&self, id: &PositionId) -> Option<Position> {
        self.state().positions.remove(id)
    }

    /// Reject every order while set.
    pub fn set_reject_orders(&self, reject: bool) {
        self.state().reject_orders = reject;
    }

    /// Reject every stop modification while set.
    pub fn set_reject_modify(&self, reject: bool) {
        self.state().reject_modify = reject;
    }

    /// Reject every close while set.
    pub fn set_reject_close(&self, reject: bool) {
        self.state().reject_close = reject;
    }

    /// Configure the next call to fail with a transport error.
    pub fn set_fail_next(&self, fail: bool) {
        self.state().fail_next = fail;
    }

    /// Make `health_check` fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.state().healthy = healthy;
    }

    /// Orders received so far.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.state().orders.clone()
    }

    /// Stop modifications received so far (accepted or not).
    pub fn stop_requests(&self) -> Vec<(PositionId, Price)> {
        self.state().stop_requests.clone()
    }

    /// Snapshot of one venue position.
    pub fn position(&self, id: &PositionId) -> Option<Position> {
        self.state().positions.get(id).cloned()
    }

    /// Check if we should fail the next operation.
    fn should_fail(state: &mut StubState) -> bool {
        let fail = state.fail_next;
        state.fail_next = false; // Reset after check
        fail
    }
}

#[async_trait]
impl VenuePort for StubVenue {
    async fn health_check(&self) -> Result<(), ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) || !state.healthy {
            return Err(ExecError::Connectivity("Simulated health check failure".to_string()));
        }
        Ok(())
    }

    async fn get_recent_bars(
        &self,
        _symbol: &Symbol,
        _timeframe: Timeframe,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Bar>, ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated bar fetch failure".to_string()));
        }

        // Stored bars are all closed: offset 1 is the newest one
        let skip = offset.saturating_sub(1);
        let end = state.bars.len().saturating_sub(skip);
        let start = end.saturating_sub(count);
        Ok(state.bars[start..end].to_vec())
    }

    async fn get_ticks(
        &self,
        _symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Tick>, ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated tick fetch failure".to_string()));
        }

        Ok(state
            .ticks
            .iter()
            .filter(|t| t.time >= start && t.time < end)
            .cloned()
            .collect())
    }

    async fn get_current_quote(&self, symbol: &Symbol) -> Result<Quote, ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated quote failure".to_string()));
        }

        state
            .quote
            .ok_or_else(|| ExecError::Venue(format!("No quote for {symbol}")))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<VenueAck, ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated order failure".to_string()));
        }
        state.orders.push(request.clone());

        if state.reject_orders {
            return Ok(VenueAck::rejected("Simulated order rejection"));
        }

        let Some(quote) = state.quote else {
            return Ok(VenueAck::rejected("No quote"));
        };
        let fill = quote.entry_price(request.direction);

        state.order_counter += 1;
        let id = PositionId::new(format!("STUB-{}", state.order_counter));

        let position = Position::new(
            id.clone(),
            request.symbol.clone(),
            request.direction,
            fill,
            request.volume,
            quote.time,
        )
        .with_bracket(request.stop, request.take_profit);
        state.positions.insert(id.clone(), position);

        tracing::debug!(position_id = %id, %fill, "Stub: order filled");
        Ok(VenueAck::accepted(Some(id), Some(fill)))
    }

    async fn modify_stop(&self, position_id: &PositionId, new_stop: Price) -> Result<VenueAck, ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated modify failure".to_string()));
        }
        state.stop_requests.push((position_id.clone(), new_stop));

        if state.reject_modify {
            return Ok(VenueAck::rejected("Simulated modify rejection"));
        }

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
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated close failure".to_string()));
        }

        if state.reject_close {
            return Ok(VenueAck::rejected("Simulated close rejection"));
        }

        match state.positions.remove(position_id) {
            Some(_) => Ok(VenueAck::accepted(None, Some(price))),
            None => Ok(VenueAck::rejected(format!("Unknown position {position_id}"))),
        }
    }

    async fn list_open_positions(&self, symbol: &Symbol) -> Result<Vec<Position>, ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated position list failure".to_string()));
        }

        Ok(state
            .positions
            .values()
            .filter(|p| &p.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn get_account(&self) -> Result<AccountInfo, ExecError> {
        let mut state = self.state();
        if Self::should_fail(&mut state) {
            return Err(ExecError::Venue("Simulated account failure".to_string()));
        }
        Ok(state.account)
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
    use vpskew_domain::Direction;

    fn symbol() -> Symbol {
        Symbol::new("XAUUSDm").unwrap()
    }

    fn price(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    fn request(direction: Direction) -> OrderRequest {
        OrderRequest {
            symbol: symbol(),
            direction,
            volume: Quantity::new(dec!(0.01)).unwrap(),
            price: price(dec!(2000)),
            stop: None,
            take_profit: None,
            comment: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stub_fills_at_quote_side() {
        let venue = StubVenue::new(dec!(1000));
        venue.set_quote(price(dec!(2000.00)), price(dec!(2000.03)), Utc::now());

        let buy = venue.place_order(&request(Direction::Buy)).await.unwrap();
        let sell = venue.place_order(&request(Direction::Sell)).await.unwrap();

        assert_eq!(buy.position_id, Some(PositionId::new("STUB-1")));
        assert_eq!(buy.price.unwrap().as_decimal(), dec!(2000.03));
        assert_eq!(sell.price.unwrap().as_decimal(), dec!(2000.00));
        assert_eq!(venue.list_open_positions(&symbol()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stub_recent_bars_offset() {
        let venue = StubVenue::new(dec!(1000));
        let t0 = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..5)
            .map(|i| Bar {
                open_time: t0 + Duration::minutes(i),
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                tick_volume: i as u64,
            })
            .collect();
        venue.set_bars(bars);

        let last_two = venue.get_recent_bars(&symbol(), Timeframe::M1, 1, 2).await.unwrap();
        assert_eq!(last_two.iter().map(|b| b.tick_volume).collect::<Vec<_>>(), vec![3, 4]);

        let shifted = venue.get_recent_bars(&symbol(), Timeframe::M1, 2, 10).await.unwrap();
        assert_eq!(shifted.len(), 4);
    }

    #[tokio::test]
    async fn test_stub_rejections_are_values() {
        let venue = StubVenue::new(dec!(1000));
        venue.set_quote(price(dec!(2000.00)), price(dec!(2000.03)), Utc::now());
        venue.set_reject_orders(true);

        let ack = venue.place_order(&request(Direction::Buy)).await.unwrap();

        assert!(!ack.accepted);
        assert!(venue.list_open_positions(&symbol()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stub_simulated_failure() {
        let venue = StubVenue::new(dec!(1000));
        venue.set_fail_next(true);

        assert!(venue.health_check().await.is_err());
        // Next call should succeed
        assert!(venue.health_check().await.is_ok());

        venue.set_healthy(false);
        assert!(matches!(venue.health_check().await, Err(ExecError::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_stub_modify_and_close() {
        let venue = StubVenue::new(dec!(1000));
        venue.set_quote(price(dec!(2000.00)), price(dec!(2000.03)), Utc::now());
        let ack = venue.place_order(&request(Direction::Buy)).await.unwrap();
        let id = ack.position_id.unwrap();

        let modified = venue.modify_stop(&id, price(dec!(1999.50))).await.unwrap();
        assert!(modified.accepted);
        assert_eq!(venue.position(&id).unwrap().current_stop, Some(price(dec!(1999.50))));

        let closed = venue
            .close_position(&id, Quantity::new(dec!(0.01)).unwrap(), price(dec!(2000.00)))
            .await
            .unwrap();
        assert!(closed.accepted);

        let again = venue
            .close_position(&id, Quantity::new(dec!(0.01)).unwrap(), price(dec!(2000.00)))
            .await
            .unwrap();
        assert!(!again.accepted);
    }
}
