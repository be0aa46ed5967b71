//! Request/response correlation over the shared session
//!
//! Every request gets a fresh client message id. A dispatcher task watches the
//! inbound stream and hands each response to the request waiting on its id.
//! The waiting side races that against a timer; whichever loses is cleaned up
//! by [`PendingGuard`], so an entry never outlives its request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::metrics::ClientMetrics;
use crate::protocol::{
    CancelOrderResponse, Command, CommandPayload, CommandResponse, Event, GetBarsPricesResponse,
    GetHistoricTradesResponse, GetOpenOrdersResponse, Order, PlaceOrderResponse, ResponsePayload,
    SubscribeResponse, UnsubscribeResponse,
};
use crate::websocket::{ConnectionSignal, Session};

#[derive(Debug, Clone)]
pub struct CorrelatorSettings {
    pub request_timeout: Duration,
    pub fail_pending_on_disconnect: bool,
}

impl From<&Config> for CorrelatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            fail_pending_on_disconnect: config.fail_pending_on_disconnect,
        }
    }
}

struct PendingRequest {
    kind: &'static str,
    /// Connection the command went out on, `None` if it was never sent
    epoch: Option<u64>,
    created_at: Instant,
    responder: oneshot::Sender<Result<ResponsePayload>>,
}

type PendingMap = Mutex<HashMap<String, PendingRequest>>;

/// Removes the pending entry however the awaiting future ends
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

pub struct Correlator {
    session: Arc<Session>,
    settings: CorrelatorSettings,
    pending: PendingMap,
    metrics: Arc<ClientMetrics>,
}

impl Correlator {
    pub fn new(
        session: Arc<Session>,
        settings: CorrelatorSettings,
        metrics: Arc<ClientMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            settings,
            pending: Mutex::new(HashMap::new()),
            metrics,
        })
    }

    /// Start routing responses. Must run before the session opens so no
    /// response is missed.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.session.events();
        let mut signals = self.session.connection_signals();
        let shutdown = self.session.shutdown_token();
        let correlator = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Responses already received must win over a later disconnect
                    biased;

                    event = events.recv() => match event {
                        Ok(Event::Response(response)) => correlator.resolve(response),
                        Ok(Event::ServerEvent(_)) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Correlator lagged behind the event stream");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    signal = signals.recv() => match signal {
                        Ok(ConnectionSignal::Disconnected { epoch }) => {
                            if correlator.settings.fail_pending_on_disconnect {
                                correlator.fail_all(epoch);
                            }
                        }
                        Ok(ConnectionSignal::Connected { .. }) => {}
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown.cancelled() => break,
                }
            }
            debug!("Correlator dispatcher stopped");
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send a command and wait for its response with the default timeout
    pub async fn request(&self, payload: CommandPayload) -> Result<ResponsePayload> {
        self.request_with_timeout(payload, self.settings.request_timeout)
            .await
    }

    /// Send a command and wait for its response.
    ///
    /// Resolves with the response payload, or rejects with `CommandFailed` when
    /// the engine reports a failure, `Timeout` when nothing matching arrives in
    /// time, or `Disconnected` when the connection drops first and fail-fast is
    /// enabled.
    pub async fn request_with_timeout(
        &self,
        payload: CommandPayload,
        timeout: Duration,
    ) -> Result<ResponsePayload> {
        let id = Uuid::new_v4().to_string();
        let kind = payload.kind();
        let (responder, response) = oneshot::channel();

        let command = Command::new(id.clone(), payload);

        // Registered under the same lock as the send so a disconnect signal
        // never sees a sent request without its epoch
        let sent = {
            let mut pending = self.pending.lock();
            let sent = self.session.send(&command);
            pending.insert(
                id.clone(),
                PendingRequest {
                    kind,
                    epoch: sent.as_ref().ok().copied(),
                    created_at: Instant::now(),
                    responder,
                },
            );
            sent
        };
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        match sent {
            Ok(epoch) => debug!(id = %id, kind, epoch, "Request sent"),
            Err(ClientError::NotConnected) if self.settings.fail_pending_on_disconnect => {
                self.metrics.record_request("disconnected");
                return Err(ClientError::Disconnected { id });
            }
            Err(ClientError::NotConnected) => {
                debug!(id = %id, kind, "Not connected, request left to time out");
            }
            Err(e) => {
                self.metrics.record_request("failed");
                return Err(e);
            }
        }

        let result = match tokio::time::timeout(timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Disconnected { id: id.clone() }),
            Err(_) => {
                warn!(id = %id, kind, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                Err(ClientError::Timeout {
                    id: id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        self.metrics.record_request(match &result {
            Ok(_) => "ok",
            Err(ClientError::CommandFailed(_)) => "failed",
            Err(ClientError::Timeout { .. }) => "timeout",
            Err(ClientError::Disconnected { .. }) => "disconnected",
            Err(_) => "error",
        });

        result
    }

    fn resolve(&self, response: CommandResponse) {
        let CommandResponse {
            client_message_id,
            value,
        } = response;

        let Some(pending) = self.pending.lock().remove(&client_message_id) else {
            debug!(id = %client_message_id, kind = value.kind(), "Discarding unmatched response");
            return;
        };

        debug!(
            id = %client_message_id,
            kind = pending.kind,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            "Response received"
        );

        let result = match value {
            ResponsePayload::CommandFailed(failure) => {
                warn!(id = %client_message_id, kind = pending.kind, reason = %failure.reason, "Command failed");
                Err(ClientError::CommandFailed(failure.reason))
            }
            other => Ok(other),
        };

        // The requester may have given up already
        let _ = pending.responder.send(result);
    }

    /// Reject every request sent on connection `epoch` or earlier. Requests
    /// already sent on a newer connection stay pending.
    fn fail_all(&self, epoch: u64) {
        let drained: Vec<(String, PendingRequest)> = {
            let mut pending = self.pending.lock();
            let stale: Vec<String> = pending
                .iter()
                .filter(|(_, request)| matches!(request.epoch, Some(sent_on) if sent_on <= epoch))
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|id| pending.remove_entry(&id))
                .collect()
        };
        if drained.is_empty() {
            return;
        }

        info!(epoch, count = drained.len(), "Failing pending requests after disconnect");
        for (id, pending) in drained {
            let _ = pending
                .responder
                .send(Err(ClientError::Disconnected { id }));
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self.request(CommandPayload::Ping).await? {
            ResponsePayload::Pong => Ok(()),
            other => Err(unexpected("pong", other)),
        }
    }

    pub async fn get_historic_trades(&self, trading_pair: &str) -> Result<GetHistoricTradesResponse> {
        let payload = CommandPayload::GetHistoricTrades {
            trading_pair: trading_pair.to_string(),
        };
        match self.request(payload).await? {
            ResponsePayload::GetHistoricTrades(response) => Ok(response),
            other => Err(unexpected("get_historic_trades", other)),
        }
    }

    pub async fn get_open_orders(&self, trading_pair: &str) -> Result<GetOpenOrdersResponse> {
        let payload = CommandPayload::GetOpenOrders {
            trading_pair: trading_pair.to_string(),
        };
        match self.request(payload).await? {
            ResponsePayload::GetOpenOrders(response) => Ok(response),
            other => Err(unexpected("get_open_orders", other)),
        }
    }

    /// Subscribe to a trading pair; the response is the order book snapshot
    pub async fn subscribe(&self, trading_pair: &str) -> Result<SubscribeResponse> {
        let payload = CommandPayload::Subscribe {
            trading_pair: trading_pair.to_string(),
        };
        match self.request(payload).await? {
            ResponsePayload::Subscribe(response) => Ok(response),
            other => Err(unexpected("subscribe", other)),
        }
    }

    pub async fn unsubscribe(&self, trading_pair: &str) -> Result<UnsubscribeResponse> {
        let payload = CommandPayload::Unsubscribe {
            trading_pair: trading_pair.to_string(),
        };
        match self.request(payload).await? {
            ResponsePayload::Unsubscribe(response) => Ok(response),
            other => Err(unexpected("unsubscribe", other)),
        }
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<CancelOrderResponse> {
        let payload = CommandPayload::CancelOrder {
            order_id: order_id.to_string(),
        };
        match self.request(payload).await? {
            ResponsePayload::CancelOrder(response) => Ok(response),
            other => Err(unexpected("cancel_order", other)),
        }
    }

    pub async fn get_bars_prices(
        &self,
        trading_pair: &str,
        resolution: &str,
        from: i64,
        to: i64,
        limit: u32,
    ) -> Result<GetBarsPricesResponse> {
        let payload = CommandPayload::GetBarsPrices {
            trading_pair: trading_pair.to_string(),
            resolution: resolution.to_string(),
            from,
            to,
            limit,
        };
        match self.request(payload).await? {
            ResponsePayload::GetBarsPrices(response) => Ok(response),
            other => Err(unexpected("get_bars_prices", other)),
        }
    }

    pub async fn place_order(&self, order: Order) -> Result<PlaceOrderResponse> {
        match self.request(CommandPayload::PlaceOrder { order }).await? {
            ResponsePayload::PlaceOrder(response) => Ok(response),
            other => Err(unexpected("place_order", other)),
        }
    }
}

fn unexpected(expected: &'static str, got: ResponsePayload) -> ClientError {
    ClientError::UnexpectedResponse {
        expected,
        got: got.kind().to_string(),
    }
}
