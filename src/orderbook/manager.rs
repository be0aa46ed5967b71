//! Order book manager
//!
//! Tracks the order books of every subscribed trading pair.

use std::collections::HashMap;

use super::{DepthLevel, OrderBook, OrderBookState, Side, SyncState};
use crate::protocol::{PriceLevel, ServerEvent, SubscribeResponse, Trade};

/// Manages order books for multiple trading pairs
#[derive(Debug)]
pub struct OrderBookManager {
    books: HashMap<String, OrderBook>,
    history_len: usize,
}

impl OrderBookManager {
    /// Create a new order book manager keeping `history_len` trades per book
    pub fn new(history_len: usize) -> Self {
        Self {
            books: HashMap::new(),
            history_len,
        }
    }

    /// Start tracking a pair. Existing books are kept.
    pub fn track(&mut self, trading_pair: &str) {
        self.books
            .entry(trading_pair.to_string())
            .or_insert_with(|| OrderBook::new(trading_pair, self.history_len));
    }

    /// Stop tracking a pair and drop its book
    pub fn untrack(&mut self, trading_pair: &str) -> bool {
        self.books.remove(trading_pair).is_some()
    }

    /// Put a tracked book into `Syncing`. Returns false if untracked.
    pub fn begin_sync(&mut self, trading_pair: &str) -> bool {
        match self.books.get_mut(trading_pair) {
            Some(book) => {
                book.begin_sync();
                true
            }
            None => false,
        }
    }

    /// Mark every book as needing a new snapshot
    pub fn begin_sync_all(&mut self) {
        for book in self.books.values_mut() {
            book.begin_sync();
        }
    }

    /// Apply a snapshot to the book of its pair
    pub fn apply_snapshot(&mut self, snapshot: &SubscribeResponse) -> bool {
        self.books
            .get_mut(&snapshot.trading_pair)
            .map(|book| book.apply_snapshot(snapshot))
            .unwrap_or(false)
    }

    /// Apply a server event to the book of its pair
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        self.books
            .get_mut(event.trading_pair())
            .map(|book| book.apply_event(event))
            .unwrap_or(false)
    }

    pub fn load_trades(&mut self, trading_pair: &str, trades: &[Trade]) -> bool {
        match self.books.get_mut(trading_pair) {
            Some(book) => {
                book.load_trades(trades);
                true
            }
            None => false,
        }
    }

    pub fn book(&self, trading_pair: &str) -> Option<&OrderBook> {
        self.books.get(trading_pair)
    }

    /// Levels of one side of a book, best price first
    pub fn side(&self, trading_pair: &str, side: Side) -> Option<Vec<PriceLevel>> {
        self.books.get(trading_pair).map(|book| book.levels(side))
    }

    pub fn depth(&self, trading_pair: &str, side: Side) -> Option<Vec<DepthLevel>> {
        self.books.get(trading_pair).map(|book| book.depth(side))
    }

    pub fn trades(&self, trading_pair: &str) -> Vec<Trade> {
        self.books
            .get(trading_pair)
            .map(|book| book.trades().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sync_state(&self, trading_pair: &str) -> SyncState {
        self.books
            .get(trading_pair)
            .map(|book| book.sync_state())
            .unwrap_or(SyncState::Uninitialized)
    }

    pub fn is_live(&self, trading_pair: &str) -> bool {
        self.sync_state(trading_pair) == SyncState::Live
    }

    /// Get the state of a specific book
    pub fn get_state(&self, trading_pair: &str) -> Option<OrderBookState> {
        self.books.get(trading_pair).map(|book| book.state())
    }

    /// Get list of trading pairs being tracked
    pub fn trading_pairs(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OrderSide;
    use crate::testing::{order, snapshot};
    use rust_decimal_macros::dec;

    #[test]
    fn test_routes_by_pair() {
        let mut manager = OrderBookManager::new(20);
        manager.track("XSN_BTC");
        manager.track("LTC_BTC");
        manager.begin_sync_all();

        assert!(manager.apply_snapshot(&snapshot("XSN_BTC", &[(dec!(10), dec!(1))], &[])));
        assert!(manager.apply_snapshot(&snapshot("LTC_BTC", &[(dec!(20), dec!(1))], &[])));
        assert!(!manager.apply_snapshot(&snapshot("BTC_USDT", &[], &[])));

        assert!(manager.apply_event(&ServerEvent::OrderPlaced {
            order: order("LTC_BTC", OrderSide::Buy, dec!(20), dec!(2)),
        }));

        assert_eq!(
            manager.side("XSN_BTC", Side::Bid).unwrap(),
            vec![PriceLevel::new(dec!(10), dec!(1))]
        );
        assert_eq!(
            manager.side("LTC_BTC", Side::Bid).unwrap(),
            vec![PriceLevel::new(dec!(20), dec!(3))]
        );
    }

    #[test]
    fn test_untrack_destroys_book() {
        let mut manager = OrderBookManager::new(20);
        manager.track("XSN_BTC");
        assert!(manager.begin_sync("XSN_BTC"));
        assert!(manager.apply_snapshot(&snapshot("XSN_BTC", &[(dec!(10), dec!(1))], &[])));
        assert!(manager.is_live("XSN_BTC"));

        assert!(manager.untrack("XSN_BTC"));
        assert_eq!(manager.sync_state("XSN_BTC"), SyncState::Uninitialized);
        assert!(manager.side("XSN_BTC", Side::Bid).is_none());
        assert!(!manager.begin_sync("XSN_BTC"));
    }

    #[test]
    fn test_track_keeps_existing_book() {
        let mut manager = OrderBookManager::new(20);
        manager.track("XSN_BTC");
        manager.begin_sync("XSN_BTC");
        manager.apply_snapshot(&snapshot("XSN_BTC", &[(dec!(10), dec!(1))], &[]));

        manager.track("XSN_BTC");
        assert!(manager.is_live("XSN_BTC"));
        assert_eq!(manager.trading_pairs(), vec!["XSN_BTC".to_string()]);
    }
}
