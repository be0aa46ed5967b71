//! Market client
//!
//! Wires the session, correlator, order book aggregator and bar aggregator
//! together and exposes the operations the rest of an application uses.

use std::sync::Arc;

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::amounts::CoinLevel;
use crate::bars::{Bar, BarAggregator};
use crate::config::Config;
use crate::correlator::{Correlator, CorrelatorSettings};
use crate::error::Result;
use crate::metrics::ClientMetrics;
use crate::orderbook::{DepthLevel, OrderBookAggregator, OrderBookState, Side, SyncState};
use crate::protocol::{Order, PlaceOrderResponse, PriceLevel, Trade};
use crate::websocket::{
    ConnectionSignal, Session, SessionSettings, SessionState, Transport, WebSocketClient,
};

pub struct MarketClient {
    config: Config,
    session: Arc<Session>,
    correlator: Arc<Correlator>,
    books: Arc<OrderBookAggregator>,
    bars: BarAggregator,
    metrics: Arc<ClientMetrics>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MarketClient {
    /// Build a client over any transport. Nothing connects until
    /// [`MarketClient::connect`].
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let metrics = Arc::new(ClientMetrics::new()?);
        let session = Session::new(
            transport,
            SessionSettings::from(&config),
            Arc::clone(&metrics),
        );
        let correlator = Correlator::new(
            Arc::clone(&session),
            CorrelatorSettings::from(&config),
            Arc::clone(&metrics),
        );
        let books = OrderBookAggregator::new(
            Arc::clone(&session),
            Arc::clone(&correlator),
            config.trade_history_len,
            config.request_timeout(),
            Arc::clone(&metrics),
        );
        let bars = BarAggregator::new(Arc::clone(&session), Arc::clone(&correlator));

        Ok(Self {
            config,
            session,
            correlator,
            books,
            bars,
            metrics,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Client over a WebSocket connection to `config.server_url`
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = Arc::new(WebSocketClient::new(
            &config.server_url,
            &config.protocol_version,
        ));
        Self::new(config, transport)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the background tasks and the connection loop. Calling it again
    /// is a no-op.
    pub fn connect(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        // Listeners first so the first connection signal is not missed
        tasks.push(self.correlator.spawn());
        tasks.push(self.books.spawn());
        tasks.push(self.session.open());
        info!(url = %self.config.server_url, "Market client started");
    }

    /// Follow a pair's order book. Resolves once the book is live, or at once
    /// while disconnected.
    pub async fn subscribe(&self, trading_pair: &str) -> Result<()> {
        self.books.subscribe(trading_pair).await
    }

    pub async fn unsubscribe(&self, trading_pair: &str) -> Result<()> {
        self.bars.unsubscribe_bars(trading_pair);
        self.books.unsubscribe(trading_pair).await
    }

    /// Recent trades straight from the engine, newest first
    pub async fn historic_trades(&self, trading_pair: &str) -> Result<Vec<Trade>> {
        Ok(self
            .correlator
            .get_historic_trades(trading_pair)
            .await?
            .trades)
    }

    pub async fn open_orders(&self, trading_pair: &str) -> Result<Vec<Order>> {
        Ok(self.correlator.get_open_orders(trading_pair).await?.orders)
    }

    pub async fn place_order(&self, order: Order) -> Result<PlaceOrderResponse> {
        info!(
            pair = %order.trading_pair,
            side = ?order.side,
            order_type = ?order.order_type,
            "Placing order"
        );
        self.correlator.place_order(order).await
    }

    /// Cancel an order, returning it if the engine still had it
    pub async fn cancel_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.correlator.cancel_order(order_id).await?.order)
    }

    pub async fn ping(&self) -> Result<()> {
        self.correlator.ping().await
    }

    /// Epoch of every connection established from now on. Ends on shutdown.
    pub fn connection_established(&self) -> impl Stream<Item = u64> + Send + 'static {
        let shutdown = self.session.shutdown_token();
        let epochs =
            BroadcastStream::new(self.session.connection_signals()).filter_map(|signal| match signal {
                Ok(ConnectionSignal::Connected { epoch }) => Some(epoch),
                Ok(ConnectionSignal::Disconnected { .. }) => None,
                Err(e) => {
                    warn!(error = %e, "Connection signal listener lagged");
                    None
                }
            });
        futures_util::StreamExt::take_until(epochs, async move { shutdown.cancelled().await })
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.session.state_watch()
    }

    /// Levels of one side of a book, best price first. Empty if the pair is
    /// not followed.
    pub async fn book_side(&self, trading_pair: &str, side: Side) -> Vec<PriceLevel> {
        self.books
            .books()
            .read()
            .await
            .side(trading_pair, side)
            .unwrap_or_default()
    }

    /// One side in whole coins, best price first
    pub async fn book_side_in_coins(&self, trading_pair: &str, side: Side) -> Vec<CoinLevel> {
        self.book_side(trading_pair, side)
            .await
            .iter()
            .map(CoinLevel::from)
            .collect()
    }

    /// One side with running totals from the best price outward
    pub async fn depth(&self, trading_pair: &str, side: Side) -> Vec<DepthLevel> {
        self.books
            .books()
            .read()
            .await
            .depth(trading_pair, side)
            .unwrap_or_default()
    }

    pub async fn sync_state(&self, trading_pair: &str) -> SyncState {
        self.books.books().read().await.sync_state(trading_pair)
    }

    pub async fn book_state(&self, trading_pair: &str) -> Option<OrderBookState> {
        self.books.books().read().await.get_state(trading_pair)
    }

    /// Trades seen for a followed pair, newest first
    pub async fn trade_history(&self, trading_pair: &str) -> Vec<Trade> {
        self.books.books().read().await.trades(trading_pair)
    }

    pub async fn historical_bars(
        &self,
        trading_pair: &str,
        resolution: &str,
        from: i64,
        to: i64,
        limit: Option<u32>,
    ) -> Result<Vec<Bar>> {
        self.bars
            .historical_bars(trading_pair, resolution, from, to, limit)
            .await
    }

    /// Live bars for a pair. Follows the pair first if needed, since matched
    /// trades only flow for subscribed pairs.
    pub async fn bars(
        &self,
        trading_pair: &str,
        resolution: &str,
    ) -> Result<impl Stream<Item = Bar> + Send + 'static> {
        let stream = self.bars.stream_bars(trading_pair, resolution)?;

        let followed = self.books.books().read().await.book(trading_pair).is_some();
        if !followed {
            self.subscribe(trading_pair).await?;
        }
        Ok(stream)
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Stop the connection loop and wait for the background tasks
    pub async fn shutdown(&self) {
        info!("Shutting down market client");
        self.session.shutdown();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task failed");
            }
        }
    }
}
