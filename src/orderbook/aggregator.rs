//! Order book aggregator
//!
//! Consumes the session's event stream in arrival order. Snapshots are taken
//! from the stream itself rather than from the request future, so a snapshot
//! is always followed by exactly the events sent after it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::OrderBookManager;
use crate::correlator::Correlator;
use crate::error::{ClientError, Result};
use crate::metrics::ClientMetrics;
use crate::protocol::{Event, ResponsePayload, ServerEvent};
use crate::websocket::{ConnectionSignal, Session};

pub struct OrderBookAggregator {
    session: Arc<Session>,
    correlator: Arc<Correlator>,
    books: Arc<RwLock<OrderBookManager>>,
    /// Woken whenever a snapshot is applied
    synced: Notify,
    sync_timeout: Duration,
    metrics: Arc<ClientMetrics>,
}

impl OrderBookAggregator {
    pub fn new(
        session: Arc<Session>,
        correlator: Arc<Correlator>,
        history_len: usize,
        sync_timeout: Duration,
        metrics: Arc<ClientMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            correlator,
            books: Arc::new(RwLock::new(OrderBookManager::new(history_len))),
            synced: Notify::new(),
            sync_timeout,
            metrics,
        })
    }

    /// Shared handle on the books for readers
    pub fn books(&self) -> Arc<RwLock<OrderBookManager>> {
        Arc::clone(&self.books)
    }

    /// Start applying events. Must run before the session opens.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.session.events();
        let mut signals = self.session.connection_signals();
        let shutdown = self.session.shutdown_token();
        let aggregator = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    event = events.recv() => match event {
                        Ok(event) => aggregator.handle_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            // Missed events cannot be recovered, start over from snapshots
                            warn!(skipped, "Aggregator lagged behind, resyncing all books");
                            aggregator.resync_all().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    signal = signals.recv() => match signal {
                        Ok(ConnectionSignal::Connected { epoch }) => {
                            info!(epoch, "Connection established, resyncing books");
                            aggregator.resync_all().await;
                        }
                        Ok(ConnectionSignal::Disconnected { epoch }) => {
                            debug!(epoch, "Connection lost, books are stale");
                            aggregator.books.write().await.begin_sync_all();
                        }
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown.cancelled() => break,
                }
            }
            debug!("Order book aggregator stopped");
        })
    }

    /// Track a pair and, when connected, fetch its snapshot and trade history.
    /// While disconnected the pair is synced on the next connection.
    pub async fn subscribe(&self, trading_pair: &str) -> Result<()> {
        self.books.write().await.track(trading_pair);
        info!(pair = %trading_pair, "Tracking order book");

        if self.session.is_connected() {
            self.sync(trading_pair).await
        } else {
            Ok(())
        }
    }

    /// Stop tracking a pair and tell the engine
    pub async fn unsubscribe(&self, trading_pair: &str) -> Result<()> {
        self.books.write().await.untrack(trading_pair);
        info!(pair = %trading_pair, "Dropped order book");

        self.correlator.unsubscribe(trading_pair).await?;
        Ok(())
    }

    /// Request a fresh snapshot and wait until it has been applied
    async fn sync(&self, trading_pair: &str) -> Result<()> {
        if !self.books.write().await.begin_sync(trading_pair) {
            return Ok(());
        }

        let (snapshot, history) = tokio::join!(
            self.correlator.subscribe(trading_pair),
            self.correlator.get_historic_trades(trading_pair),
        );

        match history {
            Ok(history) => {
                self.books
                    .write()
                    .await
                    .load_trades(trading_pair, &history.trades);
            }
            Err(e) => warn!(pair = %trading_pair, error = %e, "Failed to load trade history"),
        }

        snapshot?;
        self.wait_live(trading_pair).await
    }

    async fn wait_live(&self, trading_pair: &str) -> Result<()> {
        let wait = async {
            loop {
                let notified = self.synced.notified();
                {
                    let books = self.books.read().await;
                    // Untracked meanwhile counts as done
                    if books.book(trading_pair).map_or(true, |book| book.is_live()) {
                        return;
                    }
                }
                notified.await;
            }
        };

        tokio::time::timeout(self.sync_timeout, wait)
            .await
            .map_err(|_| ClientError::Timeout {
                id: format!("sync:{}", trading_pair),
                timeout_ms: self.sync_timeout.as_millis() as u64,
            })
    }

    async fn resync_all(self: &Arc<Self>) {
        let pairs = {
            let mut books = self.books.write().await;
            books.begin_sync_all();
            books.trading_pairs()
        };

        for pair in pairs {
            let aggregator = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = aggregator.sync(&pair).await {
                    warn!(pair = %pair, error = %e, "Failed to resync order book");
                }
            });
        }
    }

    async fn handle_event(&self, event: Event) {
        match event {
            Event::Response(response) => {
                if let ResponsePayload::Subscribe(snapshot) = &response.value {
                    let applied = self.books.write().await.apply_snapshot(snapshot);
                    if applied {
                        info!(
                            pair = %snapshot.trading_pair,
                            bids = snapshot.summary_bids.len(),
                            asks = snapshot.summary_asks.len(),
                            "Order book snapshot applied"
                        );
                        self.synced.notify_waiters();
                    }
                }
            }
            Event::ServerEvent(event) => {
                if self.books.write().await.apply_event(&event) {
                    self.metrics.book_updates.inc();
                } else if matches!(
                    event,
                    ServerEvent::OrderCanceled { .. } | ServerEvent::OrdersMatched { .. }
                ) {
                    self.metrics.missing_levels.inc();
                }
            }
        }
    }
}
