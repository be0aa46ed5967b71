//! Error types for the order book client

use thiserror::Error;

/// Order book client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to encode frame: {0}")]
    EncodeError(String),

    #[error("Failed to decode frame: {0}")]
    DecodeError(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Connection lost before request {id} was answered")]
    Disconnected { id: String },

    #[error("Request {id} timed out in {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse { expected: &'static str, got: String },

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocketConnection(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ClientError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ClientError::EncodeError(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ClientError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ClientError::DecodeError(err.to_string())
    }
}

impl From<prometheus::Error> for ClientError {
    fn from(err: prometheus::Error) -> Self {
        ClientError::MetricsError(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
