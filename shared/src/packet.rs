//! Wire codec for datagrams exchanged between client and server.
//!
//! Every datagram starts with an 8-byte [`PacketHeader`] followed by exactly one payload:
//!
//! | payload          | direction        | layout (little-endian)                                              |
//! |------------------|------------------|---------------------------------------------------------------------|
//! | frame            | server → client  | `tick:u32, n:u8, (player:u16, input:u32)×n, len:u16, snapshot[len]` |
//! | input            | client → server  | `tick:u32, player:u16, input:u32, timestamp_ms:u64`                 |
//! | reliable envelope| both             | `msg_seq:u16, payload[..]`                                          |
//!
//! Payloads carry no kind tag. Receivers classify them heuristically: the high-frequency
//! kind for that direction (frames on the client, inputs on the server) is tried first with
//! a strict length check, then the reliable envelope, and anything else is dropped as
//! unknown.

use crate::error::{DecodeError, EncodeError};
use crate::InputCommand;
use bytes::{Buf, BufMut};

/// Size of the fixed datagram header in bytes.
pub const HEADER_SIZE: usize = 2 + 2 + 4;

/// Size of an input payload in bytes.
pub const INPUT_SIZE: usize = 4 + 2 + 4 + 8;

const FRAME_PREFIX_SIZE: usize = 4 + 1;
const FRAME_INPUT_SIZE: usize = 2 + 4;
const ENVELOPE_PREFIX_SIZE: usize = 2;

/// Header prefixed to every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Sender's packet sequence for this datagram.
    pub packet_seq: u16,
    /// Highest remote packet sequence the sender has seen.
    pub ack: u16,
    /// Bit `k - 1` set when `ack - k` was also seen, for `k` in `1..=32`.
    pub ack_bits: u32,
}

/// Authoritative per-tick broadcast. Never retransmitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramePacket {
    pub tick: u32,
    /// Inputs applied during this tick as `(player_id, raw input)`, for diagnostics.
    pub inputs: Vec<(u16, u32)>,
    /// Opaque snapshot produced by the simulation.
    pub snapshot: Vec<u8>,
}

/// A player's command for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPacket {
    /// Tick the producer intends this input for.
    pub tick: u32,
    pub player_id: u16,
    pub input: InputCommand,
    /// Producer wall clock in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

fn ensure(buf: &[u8], needed: usize, what: &'static str) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            what,
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

pub fn encode_header(packet_seq: u16, ack: u16, ack_bits: u32) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    let mut buf = &mut out[..];
    buf.put_u16_le(packet_seq);
    buf.put_u16_le(ack);
    buf.put_u32_le(ack_bits);
    out
}

/// Splits a datagram into its header and the remaining payload bytes.
pub fn decode_header(bytes: &[u8]) -> Result<(PacketHeader, &[u8]), DecodeError> {
    let mut buf = bytes;
    ensure(buf, HEADER_SIZE, "header")?;
    let header = PacketHeader {
        packet_seq: buf.get_u16_le(),
        ack: buf.get_u16_le(),
        ack_bits: buf.get_u32_le(),
    };
    Ok((header, buf))
}

/// Concatenates a header and an already encoded payload.
pub fn encode_datagram(header: &PacketHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.put_slice(&encode_header(header.packet_seq, header.ack, header.ack_bits));
    out.put_slice(payload);
    out
}

/// Encoded size of a frame echoing `inputs` inputs around a snapshot of `snapshot_len` bytes.
pub fn frame_len(inputs: usize, snapshot_len: usize) -> usize {
    FRAME_PREFIX_SIZE + inputs * FRAME_INPUT_SIZE + 2 + snapshot_len
}

pub fn encode_frame(frame: &FramePacket) -> Result<Vec<u8>, EncodeError> {
    if frame.inputs.len() > u8::MAX as usize {
        return Err(EncodeError::TooMany {
            what: "echoed inputs",
            count: frame.inputs.len(),
            limit: u8::MAX as usize,
        });
    }
    if frame.snapshot.len() > u16::MAX as usize {
        return Err(EncodeError::SnapshotTooLarge(frame.snapshot.len()));
    }

    let mut buf = Vec::with_capacity(frame_len(frame.inputs.len(), frame.snapshot.len()));
    buf.put_u32_le(frame.tick);
    buf.put_u8(frame.inputs.len() as u8);
    for &(player_id, input) in &frame.inputs {
        buf.put_u16_le(player_id);
        buf.put_u32_le(input);
    }
    buf.put_u16_le(frame.snapshot.len() as u16);
    buf.put_slice(&frame.snapshot);
    Ok(buf)
}

/// Decodes a frame payload. The snapshot length prefix must account for every
/// remaining byte, which keeps frames from being mistaken for other payloads.
pub fn decode_frame(bytes: &[u8]) -> Result<FramePacket, DecodeError> {
    let mut buf = bytes;
    ensure(buf, FRAME_PREFIX_SIZE, "frame")?;
    let tick = buf.get_u32_le();
    let count = buf.get_u8() as usize;

    ensure(buf, count * FRAME_INPUT_SIZE + 2, "frame inputs")?;
    let mut inputs = Vec::with_capacity(count);
    for _ in 0..count {
        let player_id = buf.get_u16_le();
        let input = buf.get_u32_le();
        inputs.push((player_id, input));
    }

    let snapshot_len = buf.get_u16_le() as usize;
    if buf.remaining() != snapshot_len {
        return Err(DecodeError::LengthMismatch {
            what: "frame snapshot",
            expected: snapshot_len,
            actual: buf.remaining(),
        });
    }

    Ok(FramePacket {
        tick,
        inputs,
        snapshot: buf.to_vec(),
    })
}

pub fn encode_reliable_envelope(msg_seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENVELOPE_PREFIX_SIZE + payload.len());
    buf.put_u16_le(msg_seq);
    buf.put_slice(payload);
    buf
}

pub fn decode_reliable_envelope(bytes: &[u8]) -> Result<(u16, &[u8]), DecodeError> {
    let mut buf = bytes;
    ensure(buf, ENVELOPE_PREFIX_SIZE, "reliable envelope")?;
    let msg_seq = buf.get_u16_le();
    Ok((msg_seq, buf))
}

pub fn encode_input(packet: &InputPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(INPUT_SIZE);
    buf.put_u32_le(packet.tick);
    buf.put_u16_le(packet.player_id);
    buf.put_u32_le(packet.input.to_wire());
    buf.put_u64_le(packet.timestamp);
    buf
}

pub fn decode_input(bytes: &[u8]) -> Result<InputPacket, DecodeError> {
    if bytes.len() != INPUT_SIZE {
        return Err(DecodeError::LengthMismatch {
            what: "input",
            expected: INPUT_SIZE,
            actual: bytes.len(),
        });
    }
    let mut buf = bytes;
    let tick = buf.get_u32_le();
    let player_id = buf.get_u16_le();
    let input = InputCommand::try_from(buf.get_u32_le())?;
    let timestamp = buf.get_u64_le();
    Ok(InputPacket {
        tick,
        player_id,
        input,
        timestamp,
    })
}

/// Payload kinds a client can receive.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientBound<'a> {
    Frame(FramePacket),
    Reliable { msg_seq: u16, payload: &'a [u8] },
    Unknown,
}

impl<'a> ClientBound<'a> {
    /// Frames are tried first because they arrive every tick.
    pub fn classify(payload: &'a [u8]) -> Self {
        if let Ok(frame) = decode_frame(payload) {
            return ClientBound::Frame(frame);
        }
        match decode_reliable_envelope(payload) {
            Ok((msg_seq, payload)) => ClientBound::Reliable { msg_seq, payload },
            Err(_) => ClientBound::Unknown,
        }
    }
}

/// Payload kinds a server can receive.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerBound<'a> {
    Input(InputPacket),
    Reliable { msg_seq: u16, payload: &'a [u8] },
    Unknown,
}

impl<'a> ServerBound<'a> {
    /// Inputs are tried first because every client sends one per tick.
    pub fn classify(payload: &'a [u8]) -> Self {
        if let Ok(input) = decode_input(payload) {
            return ServerBound::Input(input);
        }
        match decode_reliable_envelope(payload) {
            Ok((msg_seq, payload)) => ServerBound::Reliable { msg_seq, payload },
            Err(_) => ServerBound::Unknown,
        }
    }
}
