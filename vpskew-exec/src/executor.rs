//! Executor: turns controller decisions into venue requests.
//!
//! The Executor is the bridge between the pure controller (decisions)
//! and the impure venue (I/O). It never mutates controller state: the
//! cycle confirms whatever the venue accepted.
//!
//! # Flow
//!
//! ```text
//! Controller Decision → Executor → Venue → ActionResult → Cycle confirms
//! ```
//!
//! A write that fails in transport is reported as a rejection. The
//! controller state stays untouched, so the next cycle re-derives the
//! same decision and retries.

use std::sync::Arc;
use tracing::{debug, info, warn};

use vpskew_domain::{ExitDecision, PositionId, Price, Symbol};
use vpskew_engine::EntryOrder;

use crate::ports::{OrderRequest, VenueAck, VenuePort};

/// Comment attached to every order
pub const ORDER_COMMENT: &str = "vpskew";

// =============================================================================
// Execution Result
// =============================================================================

/// Outcome of one venue write.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    /// Venue accepted the request
    Accepted {
        /// Ticket of the opened position (entries only)
        position_id: Option<PositionId>,
        /// Fill price reported by the venue
        price: Option<Price>,
    },
    /// Venue refused the request, or it never reached the venue
    Rejected {
        /// Venue or transport explanation
        reason: String,
    },
}

impl ActionResult {
    /// Whether the venue accepted the request
    pub fn is_accepted(&self) -> bool {
        matches!(self, ActionResult::Accepted { .. })
    }

    /// Rejection reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            ActionResult::Accepted { .. } => None,
            ActionResult::Rejected { reason } => Some(reason),
        }
    }

    fn from_ack(ack: VenueAck) -> Self {
        if ack.accepted {
            ActionResult::Accepted {
                position_id: ack.position_id,
                price: ack.price,
            }
        } else {
            ActionResult::Rejected {
                reason: ack.reason.unwrap_or_else(|| "rejected by venue".to_string()),
            }
        }
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Sends entries, stop revisions and closes for one symbol.
pub struct Executor<V: VenuePort> {
    venue: Arc<V>,
    symbol: Symbol,
}

impl<V: VenuePort> Executor<V> {
    /// Create a new executor.
    pub fn new(venue: Arc<V>, symbol: Symbol) -> Self {
        Self { venue, symbol }
    }

    /// Open a position.
    pub async fn enter(&self, order: &EntryOrder) -> ActionResult {
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            direction: order.direction,
            volume: order.volume,
            price: order.price,
            stop: order.stop,
            take_profit: order.take_profit,
            comment: ORDER_COMMENT.to_string(),
        };

        debug!(
            symbol = %self.symbol,
            direction = %order.direction,
            price = %order.price,
            volume = %order.volume,
            "Placing entry order"
        );

        let result = match self.venue.place_order(&request).await {
            Ok(ack) => ActionResult::from_ack(ack),
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Entry order failed in transport");
                ActionResult::Rejected { reason: e.to_string() }
            },
        };

        match &result {
            ActionResult::Accepted { position_id, price } => info!(
                position_id = ?position_id,
                fill = ?price,
                direction = %order.direction,
                "Entry accepted"
            ),
            ActionResult::Rejected { reason } => warn!(direction = %order.direction, %reason, "Entry rejected"),
        }
        result
    }

    /// Apply one exit decision.
    pub async fn apply(&self, decision: &ExitDecision) -> ActionResult {
        let outcome = match decision {
            ExitDecision::UpdateStop { position_id, new_stop, .. } => {
                debug!(%position_id, stop = %new_stop, "Modifying stop");
                self.venue.modify_stop(position_id, *new_stop).await
            },
            ExitDecision::Close {
                position_id,
                reason,
                price,
                volume,
            } => {
                debug!(%position_id, %reason, %price, "Closing position");
                self.venue.close_position(position_id, *volume, *price).await
            },
        };

        let result = match outcome {
            Ok(ack) => ActionResult::from_ack(ack),
            Err(e) => {
                warn!(
                    position_id = %decision.position_id(),
                    action = decision.reason(),
                    error = %e,
                    "Exit request failed in transport"
                );
                ActionResult::Rejected { reason: e.to_string() }
            },
        };

        if let ActionResult::Rejected { reason } = &result {
            warn!(
                position_id = %decision.position_id(),
                action = decision.reason(),
                %reason,
                "Exit request rejected, will retry next cycle"
            );
        }
        result
    }
}

// =============================================================================
// Tests
// =============================================================================
