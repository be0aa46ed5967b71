//! WebSocket transport and session management

mod client;
mod session;

pub use client::{FrameChannel, Transport, WebSocketClient};
pub use session::{ConnectionSignal, Session, SessionSettings, SessionState};

#[cfg(test)]
pub use client::MockTransport;
