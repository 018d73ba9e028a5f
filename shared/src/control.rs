//! Control messages sent inside reliable envelopes.
//!
//! A reliable payload is `message_type:u8` followed by a bincode-encoded body. Types not
//! listed here are left to the game simulation.

use crate::error::{DecodeError, EncodeError};
use serde::{Deserialize, Serialize};

pub const MSG_PING: u8 = 1;
pub const MSG_PONG: u8 = 2;
pub const MSG_LEAVE: u8 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct PingBody {
    sent_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Liveness check; the peer answers with a [`ControlMessage::Pong`] echoing `sent_at_ms`.
    Ping { sent_at_ms: u64 },
    Pong { sent_at_ms: u64 },
    /// The sender is going away and its session can be dropped.
    Leave,
}

impl ControlMessage {
    pub fn message_type(&self) -> u8 {
        match self {
            ControlMessage::Ping { .. } => MSG_PING,
            ControlMessage::Pong { .. } => MSG_PONG,
            ControlMessage::Leave => MSG_LEAVE,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![self.message_type()];
        match *self {
            ControlMessage::Ping { sent_at_ms } | ControlMessage::Pong { sent_at_ms } => {
                out.extend(bincode::serialize(&PingBody { sent_at_ms })?);
            }
            ControlMessage::Leave => {}
        }
        Ok(out)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let (message_type, body) = split_message(payload)?;
        Self::from_parts(message_type, body)
    }

    /// Builds a message from an already split type byte and body.
    pub fn from_parts(message_type: u8, body: &[u8]) -> Result<Self, DecodeError> {
        match message_type {
            MSG_PING | MSG_PONG => {
                let PingBody { sent_at_ms } = bincode::deserialize(body)
                    .map_err(|_| DecodeError::MalformedControl(message_type))?;
                Ok(if message_type == MSG_PING {
                    ControlMessage::Ping { sent_at_ms }
                } else {
                    ControlMessage::Pong { sent_at_ms }
                })
            }
            MSG_LEAVE => Ok(ControlMessage::Leave),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }
}

/// Splits a reliable payload into its type byte and body.
pub fn split_message(payload: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    match payload.split_first() {
        Some((&message_type, body)) => Ok((message_type, body)),
        None => Err(DecodeError::EmptyMessage),
    }
}
