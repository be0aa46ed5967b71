//! Bar aggregator
//!
//! Each stream owns its own [`BarState`] and its own receiver on the session's
//! event stream. The shared map only remembers the latest bar per pair and
//! resolution so new streams pick up where history or an earlier stream of the
//! same width left off.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::Stream;
use parking_lot::Mutex;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::{Bar, BarState, Resolution};
use crate::correlator::Correlator;
use crate::error::Result;
use crate::protocol::{Event, ServerEvent};
use crate::websocket::Session;

/// Bars requested when the caller gives no limit
pub const DEFAULT_BAR_LIMIT: u32 = 700;

pub struct BarAggregator {
    session: Arc<Session>,
    correlator: Arc<Correlator>,
    last_bars: Arc<Mutex<HashMap<BarKey, Bar>>>,
}

type BarKey = (String, Resolution);

impl BarAggregator {
    pub fn new(session: Arc<Session>, correlator: Arc<Correlator>) -> Self {
        Self {
            session,
            correlator,
            last_bars: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch bars in `[from, to]`, oldest first. The newest one seeds later
    /// streams for the pair at the same resolution.
    pub async fn historical_bars(
        &self,
        trading_pair: &str,
        resolution: &str,
        from: i64,
        to: i64,
        limit: Option<u32>,
    ) -> Result<Vec<Bar>> {
        let resolution: Resolution = resolution.parse()?;
        let limit = limit.unwrap_or(DEFAULT_BAR_LIMIT);

        let response = self
            .correlator
            .get_bars_prices(trading_pair, &resolution.to_string(), from, to, limit)
            .await?;
        let bars: Vec<Bar> = response.bar_prices.into_iter().map(Bar::from).collect();

        match bars.last() {
            Some(last) => {
                self.last_bars
                    .lock()
                    .insert((trading_pair.to_string(), resolution), last.clone());
            }
            None => debug!(pair = %trading_pair, %resolution, "No historical bars"),
        }
        Ok(bars)
    }

    /// Latest known bar for a pair at one resolution
    pub fn last_bar(&self, trading_pair: &str, resolution: Resolution) -> Option<Bar> {
        self.last_bars
            .lock()
            .get(&(trading_pair.to_string(), resolution))
            .cloned()
    }

    /// Live bars built from matched trades of `trading_pair`.
    ///
    /// The stream sees only trades that arrive after this call and ends when
    /// the session shuts down.
    pub fn stream_bars(
        &self,
        trading_pair: &str,
        resolution: &str,
    ) -> Result<impl Stream<Item = Bar> + Send + 'static> {
        let resolution: Resolution = resolution.parse()?;
        let pair = trading_pair.to_string();
        let mut state = BarState::new(resolution, self.last_bar(trading_pair, resolution));
        let last_bars = Arc::clone(&self.last_bars);
        let shutdown = self.session.shutdown_token();

        let stream = BroadcastStream::new(self.session.events()).filter_map(move |event| {
            let trade = match event {
                Ok(Event::ServerEvent(ServerEvent::OrdersMatched { trade })) => trade,
                Ok(_) => return None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(pair = %pair, skipped, "Bar stream lagged, trades lost");
                    return None;
                }
            };
            if trade.trading_pair != pair {
                return None;
            }

            match state.apply_trade(trade.price, trade.executed_on) {
                Ok(bar) => {
                    last_bars
                        .lock()
                        .insert((pair.clone(), resolution), bar.clone());
                    Some(bar)
                }
                Err(e) => {
                    warn!(pair = %pair, error = %e, "Dropping trade from bar stream");
                    None
                }
            }
        });

        // The session keeps its event sender alive, so end on its shutdown instead
        let stream = futures_util::StreamExt::take_until(stream, async move {
            shutdown.cancelled().await
        });
        Ok(stream)
    }

    /// Forget the latest bars of a pair at every resolution
    pub fn unsubscribe_bars(&self, trading_pair: &str) {
        self.last_bars
            .lock()
            .retain(|(pair, _), _| pair != trading_pair);
    }
}
