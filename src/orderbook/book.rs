//! Order book for one trading pair
//!
//! Events are applied only while the book is live, and only when they belong
//! to this pair.

use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{debug, trace};

use super::{BookSide, DepthLevel, OrderBookMetrics, OrderBookState, Side, SyncState};
use crate::protocol::{PriceLevel, ServerEvent, SubscribeResponse, Trade};

/// Order book for a single trading pair
#[derive(Debug)]
pub struct OrderBook {
    trading_pair: String,
    sync: SyncState,
    bids: BookSide,
    asks: BookSide,
    /// Most recent trade first
    trades: VecDeque<Trade>,
    history_len: usize,
    /// Events applied since the last snapshot
    updates_since_snapshot: u64,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(trading_pair: &str, history_len: usize) -> Self {
        Self {
            trading_pair: trading_pair.to_string(),
            sync: SyncState::Uninitialized,
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            trades: VecDeque::with_capacity(history_len),
            history_len,
            updates_since_snapshot: 0,
        }
    }

    pub fn trading_pair(&self) -> &str {
        &self.trading_pair
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    pub fn is_live(&self) -> bool {
        self.sync == SyncState::Live
    }

    /// Stop applying events until the next snapshot
    pub fn begin_sync(&mut self) {
        self.sync = SyncState::Syncing;
    }

    /// Reset both sides from a snapshot and go live.
    ///
    /// Returns false if the snapshot is for another pair.
    pub fn apply_snapshot(&mut self, snapshot: &SubscribeResponse) -> bool {
        if snapshot.trading_pair != self.trading_pair {
            return false;
        }

        self.bids.reset(&snapshot.summary_bids);
        self.asks.reset(&snapshot.summary_asks);
        self.sync = SyncState::Live;
        self.updates_since_snapshot = 0;
        true
    }

    /// Apply one server event.
    ///
    /// Returns true if the book or its trade history changed.
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        if event.trading_pair() != self.trading_pair {
            return false;
        }
        if !self.is_live() {
            trace!(pair = %self.trading_pair, kind = event.kind(), "Book not live, skipping event");
            return false;
        }

        let applied = match event {
            ServerEvent::OrderPlaced { order } => {
                self.side_mut(order.side.into())
                    .add(order.details.price, order.details.funds);
                true
            }
            ServerEvent::OrderCanceled { order } => {
                self.reduce(order.side.into(), order.details.price, order.details.funds)
            }
            ServerEvent::OrdersMatched { trade } => {
                // The resting order sits on the side opposite the executing one
                let resting = match Side::from(trade.executing_order_side) {
                    Side::Bid => Side::Ask,
                    Side::Ask => Side::Bid,
                };
                self.reduce(resting, trade.price, trade.existing_order_funds)
            }
            ServerEvent::SwapSuccess { trade } => {
                self.record_trade(trade.clone());
                true
            }
            ServerEvent::MyOrderMatched { .. } | ServerEvent::MyMatchedOrderCanceled { .. } => false,
        };

        if applied {
            self.updates_since_snapshot += 1;
        }
        applied
    }

    fn reduce(&mut self, side: Side, price: Decimal, size: Decimal) -> bool {
        let found = self.side_mut(side).remove(price, size);
        if !found {
            debug!(
                pair = %self.trading_pair,
                side = ?side,
                price = %price,
                size = %size,
                "No level at price, ignoring reduction"
            );
        }
        found
    }

    fn record_trade(&mut self, trade: Trade) {
        self.trades.push_front(trade);
        self.trades.truncate(self.history_len);
    }

    /// Replace the trade history with trades fetched from the engine, newest
    /// first
    pub fn load_trades(&mut self, trades: &[Trade]) {
        self.trades = trades
            .iter()
            .filter(|trade| trade.trading_pair == self.trading_pair)
            .take(self.history_len)
            .cloned()
            .collect();
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn levels(&self, side: Side) -> Vec<PriceLevel> {
        self.side(side).levels()
    }

    pub fn depth(&self, side: Side) -> Vec<DepthLevel> {
        self.side(side).depth()
    }

    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter()
    }

    pub fn last_trade(&self) -> Option<&Trade> {
        self.trades.front()
    }

    /// Get current state for readers
    pub fn state(&self) -> OrderBookState {
        OrderBookState {
            trading_pair: self.trading_pair.clone(),
            sync: self.sync,
            bids: self.bids.levels(),
            asks: self.asks.levels(),
            trades: self.trades.iter().cloned().collect(),
            updates_since_snapshot: self.updates_since_snapshot,
            metrics: self.calculate_metrics(),
        }
    }

    fn calculate_metrics(&self) -> OrderBookMetrics {
        let best_bid = self.bids.best().map(|level| level.price);
        let best_ask = self.asks.best().map(|level| level.price);

        OrderBookMetrics {
            best_bid,
            best_ask,
            spread: best_bid.zip(best_ask).map(|(bid, ask)| ask - bid),
            last_price: self.last_trade().map(|trade| trade.price),
            bid_depth: self.bids.total_size(),
            ask_depth: self.asks.total_size(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }
}
