//! Wire protocol for the matching engine
//!
//! Commands flow out, events flow in. Every command carries a client message
//! id that the engine echoes back in the matching response.

mod codec;

pub use codec::{decode_command, decode_event, encode_command, encode_event};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// Price level (price, size pair). Prices and sizes are satoshi amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_id: String,
    pub price: Decimal,
    pub funds: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub trading_pair: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub details: OrderDetails,
}

/// Executed trade between a resting (existing) order and an incoming
/// (executing) order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub trading_pair: String,
    pub price: Decimal,
    pub size: Decimal,
    pub existing_order_id: String,
    pub executing_order_id: String,
    pub executing_order_side: OrderSide,
    /// Funds consumed from the resting order
    pub existing_order_funds: Decimal,
    /// Execution time (epoch milliseconds)
    pub executed_on: i64,
}

/// Historical OHLCV bar as served by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarPrices {
    /// Bar open time (epoch milliseconds)
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Outbound command envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub client_message_id: String,
    pub value: CommandPayload,
}

impl Command {
    pub fn new(client_message_id: impl Into<String>, value: CommandPayload) -> Self {
        Self {
            client_message_id: client_message_id.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandPayload {
    Ping,
    GetHistoricTrades {
        trading_pair: String,
    },
    GetOpenOrders {
        trading_pair: String,
    },
    Subscribe {
        trading_pair: String,
    },
    Unsubscribe {
        trading_pair: String,
    },
    CancelOrder {
        order_id: String,
    },
    GetBarsPrices {
        trading_pair: String,
        resolution: String,
        from: i64,
        to: i64,
        limit: u32,
    },
    PlaceOrder {
        order: Order,
    },
}

impl CommandPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandPayload::Ping => "ping",
            CommandPayload::GetHistoricTrades { .. } => "get_historic_trades",
            CommandPayload::GetOpenOrders { .. } => "get_open_orders",
            CommandPayload::Subscribe { .. } => "subscribe",
            CommandPayload::Unsubscribe { .. } => "unsubscribe",
            CommandPayload::CancelOrder { .. } => "cancel_order",
            CommandPayload::GetBarsPrices { .. } => "get_bars_prices",
            CommandPayload::PlaceOrder { .. } => "place_order",
        }
    }
}

/// Inbound event envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Response(CommandResponse),
    ServerEvent(ServerEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub client_message_id: String,
    pub value: ResponsePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    Pong,
    GetHistoricTrades(GetHistoricTradesResponse),
    GetOpenOrders(GetOpenOrdersResponse),
    Subscribe(SubscribeResponse),
    Unsubscribe(UnsubscribeResponse),
    CancelOrder(CancelOrderResponse),
    GetBarsPrices(GetBarsPricesResponse),
    PlaceOrder(PlaceOrderResponse),
    CommandFailed(CommandFailed),
}

impl ResponsePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponsePayload::Pong => "pong",
            ResponsePayload::GetHistoricTrades(_) => "get_historic_trades",
            ResponsePayload::GetOpenOrders(_) => "get_open_orders",
            ResponsePayload::Subscribe(_) => "subscribe",
            ResponsePayload::Unsubscribe(_) => "unsubscribe",
            ResponsePayload::CancelOrder(_) => "cancel_order",
            ResponsePayload::GetBarsPrices(_) => "get_bars_prices",
            ResponsePayload::PlaceOrder(_) => "place_order",
            ResponsePayload::CommandFailed(_) => "command_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHistoricTradesResponse {
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOpenOrdersResponse {
    pub orders: Vec<Order>,
}

/// Order book snapshot for one trading pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub trading_pair: String,
    pub summary_bids: Vec<PriceLevel>,
    pub summary_asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub trading_pair: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderResponse {
    pub order: Option<Order>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBarsPricesResponse {
    pub bar_prices: Vec<BarPrices>,
}

/// Result of placing an order: it either rests on the book or matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    pub order: Option<Order>,
    pub trade: Option<Trade>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailed {
    pub reason: String,
}

/// Unsolicited event pushed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerEvent {
    OrderPlaced { order: Order },
    OrderCanceled { order: Order },
    OrdersMatched { trade: Trade },
    SwapSuccess { trade: Trade },
    MyOrderMatched { trade: Trade },
    MyMatchedOrderCanceled { trade: Trade },
}

impl ServerEvent {
    pub fn trading_pair(&self) -> &str {
        match self {
            ServerEvent::OrderPlaced { order } | ServerEvent::OrderCanceled { order } => {
                &order.trading_pair
            }
            ServerEvent::OrdersMatched { trade }
            | ServerEvent::SwapSuccess { trade }
            | ServerEvent::MyOrderMatched { trade }
            | ServerEvent::MyMatchedOrderCanceled { trade } => &trade.trading_pair,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::OrderPlaced { .. } => "order_placed",
            ServerEvent::OrderCanceled { .. } => "order_canceled",
            ServerEvent::OrdersMatched { .. } => "orders_matched",
            ServerEvent::SwapSuccess { .. } => "swap_success",
            ServerEvent::MyOrderMatched { .. } => "my_order_matched",
            ServerEvent::MyMatchedOrderCanceled { .. } => "my_matched_order_canceled",
        }
    }
}
