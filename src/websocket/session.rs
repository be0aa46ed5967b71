//! Connection session
//!
//! Keeps one logical session alive on top of a [`Transport`]: reconnects after
//! a fixed delay, sends keepalive pings, decodes inbound frames and fans them
//! out to every listener. Nothing is re-sent after a reconnect; listeners get a
//! [`ConnectionSignal::Connected`] and re-issue what they need.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FrameChannel, Transport};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::metrics::ClientMetrics;
use crate::protocol::{decode_event, encode_command, Command, CommandPayload, Event};

/// Capacity of the connection signal channel
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle notification, emitted once per open and once per loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSignal {
    Connected { epoch: u64 },
    Disconnected { epoch: u64 },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
    pub event_capacity: usize,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            heartbeat_interval: config.heartbeat_interval(),
            event_capacity: config.event_channel_capacity,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Writer half of the current connection
struct Outbound {
    epoch: u64,
    frames: mpsc::UnboundedSender<Vec<u8>>,
}

/// One logical session over a reconnecting transport
pub struct Session {
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    outbound: Mutex<Option<Outbound>>,
    events: broadcast::Sender<Event>,
    signals: broadcast::Sender<ConnectionSignal>,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
    metrics: Arc<ClientMetrics>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: SessionSettings,
        metrics: Arc<ClientMetrics>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(SessionState::Disconnected);

        Arc::new(Self {
            transport,
            settings,
            outbound: Mutex::new(None),
            events,
            signals,
            state,
            shutdown: CancellationToken::new(),
            metrics,
        })
    }

    /// Start the connection loop in the background
    pub fn open(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.run().await })
    }

    /// Subscribe to decoded inbound events. Nothing is replayed: a receiver
    /// only sees events that arrive after it was created.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn connection_signals(&self) -> broadcast::Receiver<ConnectionSignal> {
        self.signals.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Token cancelled when the session shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Encode and enqueue a command on the current channel, returning the
    /// epoch of the connection it went out on.
    ///
    /// Fails with [`ClientError::NotConnected`] when there is no channel; the
    /// command is not kept for a later connection.
    pub fn send(&self, command: &Command) -> Result<u64> {
        let frame = encode_command(command)?;

        let guard = self.outbound.lock();
        let Some(outbound) = guard.as_ref() else {
            debug!(
                id = %command.client_message_id,
                kind = command.value.kind(),
                "Dropping command while disconnected"
            );
            return Err(ClientError::NotConnected);
        };

        outbound
            .frames
            .send(frame)
            .map_err(|_| ClientError::NotConnected)?;
        self.metrics.frames_sent.inc();
        Ok(outbound.epoch)
    }

    async fn run(self: Arc<Self>) {
        info!("Starting session with infinite retry");
        let mut epoch = 0u64;

        loop {
            self.state.send_replace(SessionState::Connecting);

            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                attempt = self.transport.connect() => attempt,
            };

            match attempt {
                Ok(channel) => {
                    epoch += 1;
                    self.serve(channel, epoch).await;
                }
                Err(e) => warn!(error = %e, "Connection attempt failed"),
            }

            self.state.send_replace(SessionState::Disconnected);

            if self.shutdown.is_cancelled() {
                break;
            }

            debug!(delay_ms = self.settings.reconnect_delay.as_millis() as u64, "Reconnecting");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.settings.reconnect_delay) => {}
            }
        }

        self.state.send_replace(SessionState::Disconnected);
        info!("Session stopped");
    }

    /// Pump one connection until it closes
    async fn serve(&self, channel: FrameChannel, epoch: u64) {
        let FrameChannel {
            outbound,
            mut inbound,
        } = channel;

        *self.outbound.lock() = Some(Outbound {
            epoch,
            frames: outbound,
        });
        self.state.send_replace(SessionState::Connected);
        self.metrics.connections.inc();
        self.metrics.connected.set(1);
        info!(epoch, "Session connected");
        let _ = self.signals.send(ConnectionSignal::Connected { epoch });

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = inbound.recv() => match frame {
                    Some(frame) => self.dispatch(&frame),
                    None => {
                        warn!(epoch, "Channel closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    let ping = Command::new(Uuid::new_v4().to_string(), CommandPayload::Ping);
                    if let Err(e) = self.send(&ping) {
                        warn!(error = %e, "Failed to send keepalive ping");
                    }
                }
            }
        }

        self.outbound.lock().take();
        self.state.send_replace(SessionState::Disconnected);
        self.metrics.connected.set(0);
        info!(epoch, "Session disconnected");
        let _ = self.signals.send(ConnectionSignal::Disconnected { epoch });
    }

    fn dispatch(&self, frame: &[u8]) {
        self.metrics.frames_received.inc();
        match decode_event(frame) {
            Ok(event) => {
                // No receivers is fine: nobody is listening yet
                let _ = self.events.send(event);
            }
            Err(e) => {
                self.metrics.decode_failures.inc();
                warn!(error = %e, len = frame.len(), "Dropping undecodable frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ServerEvent, OrderSide};
    use crate::testing::{order, ChannelTransport};
    use crate::websocket::MockTransport;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> SessionSettings {
        SessionSettings {
            reconnect_delay: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(60),
            event_capacity: 64,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_fan_out() {
        let (transport, mut servers) = ChannelTransport::new();
        let metrics = Arc::new(ClientMetrics::new().unwrap());
        let session = Session::new(transport, settings(), metrics.clone());
        let mut signals = session.connection_signals();
        let mut first = session.events();
        let mut second = session.events();
        session.open();

        let server = servers.recv().await.unwrap();
        assert_eq!(
            signals.recv().await.unwrap(),
            ConnectionSignal::Connected { epoch: 1 }
        );
        assert!(session.is_connected());

        let event = Event::ServerEvent(ServerEvent::OrderPlaced {
            order: order("XSN_BTC", OrderSide::Buy, dec!(100), dec!(5)),
        });
        server.push_raw(vec![0xc1, 0xc1]);
        server.push(&event);

        // The garbage frame is dropped; both listeners see the event in order
        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
        assert_eq!(metrics.decode_failures.get(), 1);
        assert_eq!(metrics.frames_received.get(), 2);

        session.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_fails() {
        let (transport, _servers) = ChannelTransport::new();
        let session = Session::new(
            transport,
            settings(),
            Arc::new(ClientMetrics::new().unwrap()),
        );

        let err = session
            .send(&Command::new("1", CommandPayload::Ping))
            .unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_sends_ping() {
        let (transport, mut servers) = ChannelTransport::new();
        let session = Session::new(
            transport,
            settings(),
            Arc::new(ClientMetrics::new().unwrap()),
        );
        session.open();

        let mut server = servers.recv().await.unwrap();
        let started = Instant::now();
        let command = server.next_command().await.unwrap();

        assert_eq!(command.value, CommandPayload::Ping);
        assert!(started.elapsed() >= Duration::from_secs(60));

        session.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_close_without_replay() {
        let (transport, mut servers) = ChannelTransport::new();
        let session = Session::new(
            transport,
            settings(),
            Arc::new(ClientMetrics::new().unwrap()),
        );
        let mut signals = session.connection_signals();
        session.open();

        let server = servers.recv().await.unwrap();
        assert_eq!(
            signals.recv().await.unwrap(),
            ConnectionSignal::Connected { epoch: 1 }
        );
        drop(server);

        assert_eq!(
            signals.recv().await.unwrap(),
            ConnectionSignal::Disconnected { epoch: 1 }
        );
        assert!(session
            .send(&Command::new("lost", CommandPayload::Ping))
            .is_err());

        let started = Instant::now();
        let mut server = servers.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(
            signals.recv().await.unwrap(),
            ConnectionSignal::Connected { epoch: 2 }
        );

        let epoch = session
            .send(&Command::new("fresh", CommandPayload::Ping))
            .unwrap();
        assert_eq!(epoch, 2);
        assert_eq!(server.next_command().await.unwrap().client_message_id, "fresh");

        session.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connects_retry_at_fixed_delay() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let mut transport = MockTransport::new();
        transport.expect_connect().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::WebSocketConnection("refused".to_string()))
        });

        let session = Session::new(
            Arc::new(transport),
            settings(),
            Arc::new(ClientMetrics::new().unwrap()),
        );
        let handle = session.open();

        // Attempts at 0, 500, 1000 and 1500ms
        sleep(Duration::from_millis(1750)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_ne!(session.state(), SessionState::Connected);

        session.shutdown();
        handle.await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
