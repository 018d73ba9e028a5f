//! Selective acknowledgment and retransmission over an unreliable datagram transport.
//!
//! Two sequence spaces are in play:
//! - the *packet sequence*, stamped on every datagram and acknowledged through the
//!   `(ack, ack_bits)` pair that piggybacks on all traffic;
//! - the *reliable message sequence*, identifying a control message that must eventually
//!   arrive. A message is re-sent under a fresh packet sequence until one of the packets
//!   that carried it is acknowledged.

use crate::packet::{encode_datagram, encode_reliable_envelope, PacketHeader};
use crate::sequence::{ack_covers, sequence_greater_than};
use crate::ACK_WINDOW;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Transmissions remembered per message. Older carriers are forgotten first.
const MAX_CARRIERS: usize = 16;

/// Message sequences tracked behind the newest processed one. Anything older
/// counts as already processed.
pub const PROCESSED_WINDOW: u16 = 1024;

/// A message awaiting acknowledgment.
#[derive(Debug, Clone)]
pub struct ReliableMessage {
    pub seq: u16,
    pub payload: Vec<u8>,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
    pub acknowledged: bool,
    /// Packet sequences that carried this message and when each was sent.
    carriers: Vec<(u16, Instant)>,
}

impl ReliableMessage {
    fn add_carrier(&mut self, packet_seq: u16, now: Instant) {
        if self.carriers.len() >= MAX_CARRIERS {
            self.carriers.remove(0);
        }
        self.carriers.push((packet_seq, now));
    }
}

/// A reliable message that was just confirmed by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckedMessage {
    pub seq: u16,
    /// Time between sending the acknowledged carrier and observing its ack.
    pub rtt: Duration,
}

/// Outgoing half of a link: packet numbering plus the pending reliable queue.
#[derive(Debug)]
pub struct ReliableSender {
    next_packet_seq: u16,
    next_message_seq: u16,
    pending: HashMap<u16, ReliableMessage>,
}

impl Default for ReliableSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableSender {
    pub fn new() -> Self {
        Self {
            // 0 is what an empty receiver reports as `ack`, so numbering starts at 1
            next_packet_seq: 1,
            next_message_seq: 1,
            pending: HashMap::new(),
        }
    }

    /// Returns the sequence for the next outgoing datagram, wrapping at 65536.
    pub fn next_packet_seq(&mut self) -> u16 {
        let seq = self.next_packet_seq;
        self.next_packet_seq = self.next_packet_seq.wrapping_add(1);
        seq
    }

    /// Queues `payload` for guaranteed delivery and returns its message sequence.
    pub fn enqueue_reliable(&mut self, payload: Vec<u8>, now: Instant) -> u16 {
        let seq = self.next_message_seq;
        self.next_message_seq = self.next_message_seq.wrapping_add(1);
        self.pending.insert(
            seq,
            ReliableMessage {
                seq,
                payload,
                sent_at: now,
                acknowledged: false,
                carriers: Vec::new(),
            },
        );
        seq
    }

    /// Records that datagram `packet_seq` carries message `seq`.
    pub fn attach_carrier(&mut self, seq: u16, packet_seq: u16, now: Instant) {
        if let Some(message) = self.pending.get_mut(&seq) {
            message.add_carrier(packet_seq, now);
        }
    }

    /// Messages whose last transmission is more than `threshold` old, oldest sequence first.
    pub fn pending_older_than(&self, threshold: Duration, now: Instant) -> Vec<ReliableMessage> {
        let mut due: Vec<ReliableMessage> = self
            .pending
            .values()
            .filter(|m| !m.acknowledged && now.saturating_duration_since(m.sent_at) > threshold)
            .cloned()
            .collect();
        due.sort_by(|a, b| match (a.seq == b.seq, sequence_greater_than(a.seq, b.seq)) {
            (true, _) => Ordering::Equal,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Less,
        });
        due
    }

    /// Restarts the resend clock for `seq` after it went out again as `packet_seq`.
    pub fn mark_resent(&mut self, seq: u16, packet_seq: u16, now: Instant) {
        if let Some(message) = self.pending.get_mut(&seq) {
            message.sent_at = now;
            message.add_carrier(packet_seq, now);
        }
    }

    /// Applies a remote acknowledgment window and evicts every message it confirms.
    ///
    /// Acks for sequences that were never sent, or that were already processed, are ignored.
    pub fn process_incoming_ack(
        &mut self,
        ack: u16,
        ack_bits: u32,
        now: Instant,
    ) -> Vec<AckedMessage> {
        let mut acked = Vec::new();
        for message in self.pending.values_mut() {
            let hit = message
                .carriers
                .iter()
                .rev()
                .find(|(packet_seq, _)| ack_covers(ack, ack_bits, *packet_seq));
            if let Some(&(_, carried_at)) = hit {
                message.acknowledged = true;
                acked.push(AckedMessage {
                    seq: message.seq,
                    rtt: now.saturating_duration_since(carried_at),
                });
            }
        }
        self.pending.retain(|_, m| !m.acknowledged);
        acked
    }

    pub fn is_pending(&self, seq: u16) -> bool {
        self.pending.contains_key(&seq)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Incoming half of a link: the ack window and the processed-message guard.
#[derive(Debug, Default)]
pub struct ReliableReceiver {
    /// Highest packet sequence seen, `None` until the first datagram arrives.
    latest: Option<u16>,
    /// Bit `k - 1` set when `latest - k` was seen.
    window: u32,
    /// Newest message sequence handed to the application.
    processed_latest: Option<u16>,
    /// Processed sequences within `PROCESSED_WINDOW` of `processed_latest`.
    processed: HashSet<u16>,
}

impl ReliableReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an incoming packet sequence. Returns false for duplicates and for
    /// sequences too old to be represented in the window.
    pub fn mark_received(&mut self, packet_seq: u16) -> bool {
        let Some(latest) = self.latest else {
            self.latest = Some(packet_seq);
            self.window = 0;
            return true;
        };

        if packet_seq == latest {
            return false;
        }

        if sequence_greater_than(packet_seq, latest) {
            let shift = packet_seq.wrapping_sub(latest) as u32;
            // the previous `latest` lands at offset `shift`
            self.window = if shift <= ACK_WINDOW {
                self.window.checked_shl(shift).unwrap_or(0) | (1 << (shift - 1))
            } else {
                0
            };
            self.latest = Some(packet_seq);
            return true;
        }

        let offset = latest.wrapping_sub(packet_seq) as u32;
        if offset > ACK_WINDOW {
            return false;
        }
        let bit = 1 << (offset - 1);
        if self.window & bit != 0 {
            return false;
        }
        self.window |= bit;
        true
    }

    /// The `(ack, ack_bits)` pair to stamp on the next outgoing datagram.
    pub fn build_ack_and_bits(&self) -> (u16, u32) {
        (self.latest.unwrap_or(0), self.window)
    }

    pub fn already_processed(&self, msg_seq: u16) -> bool {
        let Some(latest) = self.processed_latest else {
            return false;
        };
        if msg_seq == latest {
            return true;
        }
        if sequence_greater_than(msg_seq, latest) {
            return false;
        }
        latest.wrapping_sub(msg_seq) >= PROCESSED_WINDOW || self.processed.contains(&msg_seq)
    }

    /// Returns false if `msg_seq` had already been processed.
    ///
    /// Memory stays bounded by the window, so sequences keep being accepted after
    /// the 16-bit message space wraps.
    pub fn mark_processed(&mut self, msg_seq: u16) -> bool {
        if self.already_processed(msg_seq) {
            return false;
        }
        self.processed.insert(msg_seq);

        let advanced = self
            .processed_latest
            .map_or(true, |latest| sequence_greater_than(msg_seq, latest));
        if advanced {
            self.processed_latest = Some(msg_seq);
            self.processed.retain(|&seq| msg_seq.wrapping_sub(seq) < PROCESSED_WINDOW);
        }
        true
    }
}

/// Reliability state for one remote peer.
#[derive(Debug, Default)]
pub struct Link {
    pub sender: ReliableSender,
    pub receiver: ReliableReceiver,
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header for the next outgoing datagram, consuming one packet sequence.
    pub fn next_header(&mut self) -> PacketHeader {
        let packet_seq = self.sender.next_packet_seq();
        let (ack, ack_bits) = self.receiver.build_ack_and_bits();
        PacketHeader {
            packet_seq,
            ack,
            ack_bits,
        }
    }

    /// Books an incoming header: marks its sequence as received and applies its ack window.
    pub fn on_incoming(&mut self, header: &PacketHeader, now: Instant) -> Vec<AckedMessage> {
        self.receiver.mark_received(header.packet_seq);
        self.sender.process_incoming_ack(header.ack, header.ack_bits, now)
    }

    /// Wraps an unreliable payload into a complete datagram.
    pub fn unreliable_datagram(&mut self, payload: &[u8]) -> (PacketHeader, Vec<u8>) {
        let header = self.next_header();
        let datagram = encode_datagram(&header, payload);
        (header, datagram)
    }

    /// Queues `payload` for reliable delivery and returns its first transmission.
    pub fn reliable_datagram(
        &mut self,
        payload: Vec<u8>,
        now: Instant,
    ) -> (PacketHeader, Vec<u8>) {
        let envelope_payload = payload.clone();
        let seq = self.sender.enqueue_reliable(payload, now);
        let header = self.next_header();
        self.sender.attach_carrier(seq, header.packet_seq, now);
        let envelope = encode_reliable_envelope(seq, &envelope_payload);
        let datagram = encode_datagram(&header, &envelope);
        (header, datagram)
    }

    /// Builds a fresh transmission for every message not acknowledged within `threshold`.
    pub fn due_retransmissions(
        &mut self,
        threshold: Duration,
        now: Instant,
    ) -> Vec<(PacketHeader, Vec<u8>)> {
        let due = self.sender.pending_older_than(threshold, now);
        let mut out = Vec::with_capacity(due.len());
        for message in due {
            let header = self.next_header();
            self.sender.mark_resent(message.seq, header.packet_seq, now);
            let envelope = encode_reliable_envelope(message.seq, &message.payload);
            out.push((header, encode_datagram(&header, &envelope)));
        }
        out
    }
}
