//! WebSocket transport to the matching engine
//!
//! Handles connection and the raw binary frame pumps. Reconnection is the
//! session's job.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::Message},
};
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, Result};

/// One established duplex channel carrying raw binary frames.
///
/// Dropping `outbound` closes the connection; `inbound` yields `None` once the
/// peer is gone.
#[derive(Debug)]
pub struct FrameChannel {
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
    pub inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Something that can open a [`FrameChannel`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<FrameChannel>;
}

/// WebSocket transport for a single endpoint
pub struct WebSocketClient {
    endpoint: String,
    protocol_version: String,
}

impl WebSocketClient {
    /// Create a new WebSocket client
    pub fn new(endpoint: &str, protocol_version: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            protocol_version: protocol_version.to_string(),
        }
    }
}

#[async_trait]
impl Transport for WebSocketClient {
    async fn connect(&self) -> Result<FrameChannel> {
        let mut request = self.endpoint.as_str().into_client_request()?;
        let protocol = HeaderValue::from_str(&self.protocol_version)
            .map_err(|e| ClientError::ConfigError(format!("Invalid protocol version: {}", e)))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", protocol);

        info!(url = %self.endpoint, protocol = %self.protocol_version, "Connecting to WebSocket");

        let (ws_stream, response) = connect_async(request).await.map_err(|e| {
            ClientError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");

        let (mut sink, mut stream) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<Vec<u8>>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Binary(frame)).await {
                    warn!(error = %e, "Failed to write frame");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Binary(data)) => {
                        if inbound_tx.send(data).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Text(text)) => {
                        debug!(len = text.len(), "Ignoring text frame");
                    }
                    Ok(Message::Ping(_)) => debug!("Received ping"),
                    Ok(Message::Pong(_)) => debug!("Received pong"),
                    Ok(Message::Close(frame)) => {
                        warn!(frame = ?frame, "Received close frame");
                        break;
                    }
                    Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        error!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            debug!("WebSocket reader finished");
        });

        Ok(FrameChannel { outbound, inbound })
    }
}
