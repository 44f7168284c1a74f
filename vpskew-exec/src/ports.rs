//! Execution layer port definitions.
//!
//! `VenuePort` is everything the cycle needs from the trading venue:
//! market data pulls, order placement, stop modification, closes and
//! account queries. Adapters implement it for a concrete venue; the
//! stub and the backtest replay venue implement it in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vpskew_domain::{Bar, Direction, Position, PositionId, Price, Quantity, Quote, Symbol, Tick, Timeframe};

use crate::error::ExecError;

// =============================================================================
// Venue Port
// =============================================================================

/// Port for venue operations.
///
/// Implementations:
/// - `StubVenue` - For testing (scripted market data, immediate fills)
/// - `ReplayVenue` (vpskew-sim) - Recorded tape replay for backtests
#[async_trait]
pub trait VenuePort: Send + Sync {
    /// Check the venue is reachable and the session initialised.
    ///
    /// A failure at startup is fatal.
    async fn health_check(&self) -> Result<(), ExecError>;

    /// Closed bars, oldest first.
    ///
    /// `offset` counts back from the bar in progress (1 = last closed bar).
    /// May return fewer than `count` bars, or none.
    async fn get_recent_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Bar>, ExecError>;

    /// Ticks with `start <= time < end`, oldest first. May be empty.
    async fn get_ticks(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Tick>, ExecError>;

    /// Current best bid/ask.
    async fn get_current_quote(&self, symbol: &Symbol) -> Result<Quote, ExecError>;

    /// Open a position at market.
    async fn place_order(&self, request: &OrderRequest) -> Result<VenueAck, ExecError>;

    /// Move the venue-side stop of a position.
    async fn modify_stop(&self, position_id: &PositionId, new_stop: Price) -> Result<VenueAck, ExecError>;

    /// Close (the whole volume of) a position.
    async fn close_position(
        &self,
        position_id: &PositionId,
        volume: Quantity,
        price: Price,
    ) -> Result<VenueAck, ExecError>;

    /// Positions the venue currently holds on `symbol`.
    async fn list_open_positions(&self, symbol: &Symbol) -> Result<Vec<Position>, ExecError>;

    /// Balance and free margin.
    async fn get_account(&self) -> Result<AccountInfo, ExecError>;
}

/// Market order with optional protection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub direction: Direction,
    pub volume: Quantity,
    /// Expected price (ask for BUY, bid for SELL)
    pub price: Price,
    pub stop: Option<Price>,
    pub take_profit: Option<Price>,
    /// Free-form tag shown on the venue
    pub comment: String,
}

/// Venue acknowledgement.
///
/// `accepted = false` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueAck {
    pub accepted: bool,
    /// Position ticket (entries only)
    pub position_id: Option<PositionId>,
    /// Fill price, when the venue reports one
    pub price: Option<Price>,
    /// Venue explanation for a rejection
    pub reason: Option<String>,
}

impl VenueAck {
    /// Accepted acknowledgement
    pub fn accepted(position_id: Option<PositionId>, price: Option<Price>) -> Self {
        Self {
            accepted: true,
            position_id,
            price,
            reason: None,
        }
    }

    /// Rejected acknowledgement
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            position_id: None,
            price: None,
            reason: Some(reason.into()),
        }
    }
}

/// Account snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: Decimal,
    pub free_margin: Decimal,
}

// =============================================================================
// Tests
// =============================================================================
