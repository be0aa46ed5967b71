//! Order book module
//!
//! Maintains price-grouped bids and asks per trading pair from a snapshot plus
//! the order lifecycle events that follow it.

mod aggregator;
mod book;
mod manager;
mod metrics;
mod side;

pub use aggregator::OrderBookAggregator;
pub use book::OrderBook;
pub use manager::OrderBookManager;
pub use metrics::OrderBookMetrics;
pub use side::BookSide;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::protocol::{OrderSide, PriceLevel, Trade};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl From<OrderSide> for Side {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Side::Bid,
            OrderSide::Sell => Side::Ask,
        }
    }
}

/// Synchronization state of one book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// No snapshot requested yet
    Uninitialized,
    /// Waiting for a snapshot; events are not applied
    Syncing,
    /// Snapshot applied; events are applied as they arrive
    Live,
}

/// A level with the cumulative size from the best price up to and including it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub size: Decimal,
    pub total: Decimal,
}

/// Point-in-time copy of a book for readers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookState {
    pub trading_pair: String,
    pub sync: SyncState,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub trades: Vec<Trade>,
    /// Events applied since the last snapshot
    pub updates_since_snapshot: u64,
    pub metrics: OrderBookMetrics,
}
