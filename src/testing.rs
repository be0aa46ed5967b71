//! Test fixtures and an in-memory transport standing in for the engine

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::metrics::ClientMetrics;
use crate::protocol::{
    decode_command, encode_event, Command, CommandPayload, CommandResponse, Event, Order,
    OrderDetails, OrderSide, OrderType, PriceLevel, ResponsePayload, SubscribeResponse, Trade,
};
use crate::websocket::{FrameChannel, Session, SessionSettings, Transport};

pub(crate) fn order(pair: &str, side: OrderSide, price: Decimal, funds: Decimal) -> Order {
    Order {
        trading_pair: pair.to_string(),
        order_type: OrderType::Limit,
        side,
        details: OrderDetails {
            order_id: Uuid::new_v4().to_string(),
            price,
            funds,
        },
    }
}

pub(crate) fn trade(
    pair: &str,
    executing_side: OrderSide,
    price: Decimal,
    existing_order_funds: Decimal,
    executed_on: i64,
) -> Trade {
    Trade {
        id: Uuid::new_v4().to_string(),
        trading_pair: pair.to_string(),
        price,
        size: existing_order_funds,
        existing_order_id: Uuid::new_v4().to_string(),
        executing_order_id: Uuid::new_v4().to_string(),
        executing_order_side: executing_side,
        existing_order_funds,
        executed_on,
    }
}

pub(crate) fn snapshot(
    pair: &str,
    bids: &[(Decimal, Decimal)],
    asks: &[(Decimal, Decimal)],
) -> SubscribeResponse {
    let levels = |levels: &[(Decimal, Decimal)]| {
        levels
            .iter()
            .map(|(price, size)| PriceLevel::new(*price, *size))
            .collect()
    };
    SubscribeResponse {
        trading_pair: pair.to_string(),
        summary_bids: levels(bids),
        summary_asks: levels(asks),
    }
}

/// The engine's half of one in-memory connection
pub(crate) struct ServerEnd {
    commands: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<Vec<u8>>,
}

impl ServerEnd {
    pub(crate) async fn next_command(&mut self) -> Option<Command> {
        let frame = self.commands.recv().await?;
        Some(decode_command(&frame).expect("client sent an undecodable command"))
    }

    /// Next command that is not a keepalive ping
    pub(crate) async fn next_request(&mut self) -> Option<Command> {
        loop {
            let command = self.next_command().await?;
            if command.value != CommandPayload::Ping {
                return Some(command);
            }
        }
    }

    pub(crate) fn push(&self, event: &Event) {
        let _ = self.events.send(encode_event(event).expect("event encodes"));
    }

    pub(crate) fn push_raw(&self, frame: Vec<u8>) {
        let _ = self.events.send(frame);
    }

    pub(crate) fn respond(&self, command: &Command, value: ResponsePayload) {
        self.push(&Event::Response(CommandResponse {
            client_message_id: command.client_message_id.clone(),
            value,
        }));
    }
}

/// Transport whose connections are handed to the test as [`ServerEnd`]s
pub(crate) struct ChannelTransport {
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl ChannelTransport {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { servers }), rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self) -> Result<FrameChannel> {
        let (outbound, commands) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();

        self.servers
            .send(ServerEnd { commands, events })
            .map_err(|_| ClientError::WebSocketConnection("no server".to_string()))?;

        Ok(FrameChannel { outbound, inbound })
    }
}

pub(crate) fn session_settings() -> SessionSettings {
    SessionSettings {
        reconnect_delay: Duration::from_millis(500),
        heartbeat_interval: Duration::from_secs(60),
        event_capacity: 256,
    }
}

/// A session that is not opened yet, plus the stream of server ends
pub(crate) fn new_session() -> (Arc<Session>, mpsc::UnboundedReceiver<ServerEnd>) {
    let (transport, servers) = ChannelTransport::new();
    let metrics = Arc::new(ClientMetrics::new().expect("metrics"));
    (Session::new(transport, session_settings(), metrics), servers)
}

/// Poll `check` until it holds, letting paused time advance in between
pub(crate) async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
