//! Order book metrics calculation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Computed metrics for an order book
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    /// Highest bid price
    pub best_bid: Option<Decimal>,

    /// Lowest ask price
    pub best_ask: Option<Decimal>,

    /// Ask minus bid
    pub spread: Option<Decimal>,

    /// Price of the most recent trade
    pub last_price: Option<Decimal>,

    /// Total bid size
    pub bid_depth: Decimal,

    /// Total ask size
    pub ask_depth: Decimal,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,
}

impl OrderBookMetrics {
    /// Check if the order book has both sides populated
    pub fn is_healthy(&self) -> bool {
        self.best_bid.is_some() && self.best_ask.is_some() && self.bid_levels > 0 && self.ask_levels > 0
    }

    /// Mid price (average of best bid and ask)
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }
}
