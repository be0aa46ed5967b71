//! Order Book Client Library
//!
//! This crate connects to a remote matching engine over a reconnecting
//! WebSocket session, correlates requests with their responses, and maintains
//! live order books and OHLCV bars from the engine's event stream.

use std::sync::Arc;

pub mod amounts;
pub mod bars;
pub mod client;
pub mod config;
pub mod correlator;
pub mod error;
pub mod metrics;
pub mod orderbook;
pub mod protocol;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use bars::{Bar, BarAggregator, Resolution};
pub use client::MarketClient;
pub use config::Config;
pub use correlator::Correlator;
pub use error::{ClientError, Result};
pub use metrics::ClientMetrics;
pub use orderbook::{OrderBook, OrderBookManager, OrderBookMetrics, OrderBookState, Side, SyncState};
pub use protocol::{Order, OrderSide, OrderType, PriceLevel, Trade};
pub use websocket::{Session, SessionState, Transport, WebSocketClient};

/// Application state shared across components
pub struct AppState {
    pub client: Arc<MarketClient>,
    pub config: Arc<Config>,
}
