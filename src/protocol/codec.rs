//! Binary frame codec
//!
//! One MessagePack document per WebSocket frame, fields encoded by name.

use super::{Command, Event};
use crate::error::Result;

/// Encode an outbound command into a binary frame
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(command)?)
}

/// Decode an inbound binary frame into an event
pub fn decode_event(frame: &[u8]) -> Result<Event> {
    Ok(rmp_serde::from_slice(frame)?)
}

/// Encode an event, as the engine does when answering
pub fn encode_event(event: &Event) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(event)?)
}

/// Decode a command frame, as the engine does when receiving
pub fn decode_command(frame: &[u8]) -> Result<Command> {
    Ok(rmp_serde::from_slice(frame)?)
}
