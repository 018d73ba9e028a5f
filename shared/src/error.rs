//! Typed errors for the wire codec.
//!
//! Decoding never panics on hostile input; every failure maps to a [`DecodeError`]
//! and the receive path drops the datagram.

use thiserror::Error;

/// Failure to parse bytes received from the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{what} length mismatch: expected {expected} bytes, found {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown input command {0}")]
    UnknownInput(u32),

    #[error("empty reliable payload")]
    EmptyMessage,

    #[error("unknown control message type {0}")]
    UnknownMessageType(u8),

    #[error("malformed body for control message type {0}")]
    MalformedControl(u8),
}

/// Failure to build an outgoing payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("too many {what}: {count} exceeds wire limit {limit}")]
    TooMany {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("snapshot of {0} bytes does not fit a u16 length prefix")]
    SnapshotTooLarge(usize),

    #[error("control body serialization failed: {0}")]
    ControlBody(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_display_mentions_sizes() {
        let err = DecodeError::Truncated {
            what: "header",
            needed: 8,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("header"));
        assert!(msg.contains('8'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn snapshot_too_large_display() {
        let err = EncodeError::SnapshotTooLarge(70_000);
        assert!(err.to_string().contains("70000"));
    }
}
