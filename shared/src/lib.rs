//! Protocol pieces shared by the Ball Battle server and client.
//!
//! The transport is plain UDP. Every datagram carries a [`PacketHeader`] whose
//! `(ack, ack_bits)` pair acknowledges the remote side's recent packets, which lets
//! [`reliable::Link`] retransmit control messages until they are confirmed while
//! frames and inputs stay fire-and-forget.

pub mod control;
pub mod error;
pub mod packet;
pub mod reliable;
pub mod sequence;
pub mod snapshot;

pub use control::ControlMessage;
pub use error::{DecodeError, EncodeError};
pub use packet::{
    ClientBound, FramePacket, InputPacket, PacketHeader, ServerBound, HEADER_SIZE, INPUT_SIZE,
};
pub use reliable::{AckedMessage, Link, ReliableReceiver, ReliableSender};
pub use sequence::{ack_covers, sequence_greater_than, sequence_less_than};
pub use snapshot::{FoodState, PlayerState, Snapshot};

use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_PORT: u16 = 30000;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Number of older packet sequences described by `ack_bits`.
pub const ACK_WINDOW: u32 = 32;

pub const RETRANSMIT_INTERVAL_MS: u64 = 100;
pub const RETRANSMIT_THRESHOLD_MS: u64 = 200;

/// Receive buffer size; large enough for any UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

pub const PLAYER_START_RADIUS: f32 = 1.2;
pub const FOOD_VALUE: f32 = 0.15;
pub const FOOD_RADIUS: f32 = 0.35;
pub const DEFAULT_ARENA_HALF: f32 = 100.0;
pub const DEFAULT_FOOD_COUNT: usize = 120;
pub const BASE_SPEED: f32 = 2.0;

/// A player's directional command for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum InputCommand {
    #[default]
    None = 0,
    Left = 1,
    Right = 2,
    Up = 3,
    Down = 4,
}

impl InputCommand {
    pub fn to_wire(self) -> u32 {
        self as u32
    }

    /// Unit step for this command, `+y` being up.
    pub fn direction(self) -> (f32, f32) {
        match self {
            InputCommand::None => (0.0, 0.0),
            InputCommand::Left => (-1.0, 0.0),
            InputCommand::Right => (1.0, 0.0),
            InputCommand::Up => (0.0, 1.0),
            InputCommand::Down => (0.0, -1.0),
        }
    }
}

impl TryFrom<u32> for InputCommand {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InputCommand::None),
            1 => Ok(InputCommand::Left),
            2 => Ok(InputCommand::Right),
            3 => Ok(InputCommand::Up),
            4 => Ok(InputCommand::Down),
            other => Err(DecodeError::UnknownInput(other)),
        }
    }
}

/// Milliseconds since the Unix epoch, used for input and ping timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_command_wire_values() {
        for command in [
            InputCommand::None,
            InputCommand::Left,
            InputCommand::Right,
            InputCommand::Up,
            InputCommand::Down,
        ] {
            assert_eq!(InputCommand::try_from(command.to_wire()), Ok(command));
        }
        assert_eq!(InputCommand::Left.to_wire(), 1);
        assert_eq!(InputCommand::Down.to_wire(), 4);
        assert_eq!(
            InputCommand::try_from(5),
            Err(DecodeError::UnknownInput(5))
        );
    }

    #[test]
    fn test_input_command_direction() {
        assert_eq!(InputCommand::Left.direction(), (-1.0, 0.0));
        assert_eq!(InputCommand::Up.direction(), (0.0, 1.0));
        assert_eq!(InputCommand::default().direction(), (0.0, 0.0));
    }

    #[test]
    fn test_now_millis_is_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
