//! Per-datagram processing for the receive loop.

use crate::peers::PeerTable;
use crate::sessions::{InputOutcome, SessionRegistry};
use crate::simulation::Simulation;
use log::{debug, warn};
use shared::control::split_message;
use shared::packet::decode_header;
use shared::{ControlMessage, DecodeError, PacketHeader, ServerBound};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// Turns raw datagrams into session, reliability and simulation updates.
///
/// Holds only the handles the receive loop needs. Locks are taken one at a time.
pub struct DatagramHandler<S: Simulation> {
    sessions: Arc<RwLock<SessionRegistry>>,
    peers: Arc<Mutex<PeerTable>>,
    simulation: Arc<Mutex<S>>,
}

impl<S: Simulation> Clone for DatagramHandler<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            peers: Arc::clone(&self.peers),
            simulation: Arc::clone(&self.simulation),
        }
    }
}

impl<S: Simulation> DatagramHandler<S> {
    pub fn new(
        sessions: Arc<RwLock<SessionRegistry>>,
        peers: Arc<Mutex<PeerTable>>,
        simulation: Arc<Mutex<S>>,
    ) -> Self {
        Self {
            sessions,
            peers,
            simulation,
        }
    }

    /// Processes one datagram from `addr` and returns any datagrams to send back to it.
    ///
    /// A payload that fails to decode leaves every table untouched: its packet sequence
    /// is not acknowledged and its message sequence is not consumed.
    pub async fn handle_datagram(
        &self,
        data: &[u8],
        addr: SocketAddr,
        now: Instant,
    ) -> Vec<Vec<u8>> {
        let (header, payload) = match decode_header(data) {
            Ok(parts) => parts,
            Err(e) => {
                debug!("Dropping datagram from {}: {}", addr, e);
                return Vec::new();
            }
        };

        match ServerBound::classify(payload) {
            ServerBound::Input(input) => {
                self.book_header(addr, &header, now).await;
                let outcome = self.sessions.write().await.record_input(&input, addr, now);
                if outcome == InputOutcome::Full {
                    debug!("Input from {} ignored: server full", addr);
                }
                Vec::new()
            }
            ServerBound::Reliable { msg_seq, payload } => {
                self.handle_reliable(addr, &header, msg_seq, payload, now).await
            }
            ServerBound::Unknown => {
                debug!(
                    "Dropping unrecognized payload ({} bytes) from {}",
                    payload.len(),
                    addr
                );
                Vec::new()
            }
        }
    }

    /// Marks the packet as received and applies the acknowledgments it carries.
    async fn book_header(&self, addr: SocketAddr, header: &PacketHeader, now: Instant) {
        let mut peers = self.peers.lock().await;
        for acked in peers.on_datagram(addr, header, now) {
            debug!(
                "Reliable message {} to {} acknowledged after {:?}",
                acked.seq, addr, acked.rtt
            );
        }
    }

    async fn handle_reliable(
        &self,
        addr: SocketAddr,
        header: &PacketHeader,
        msg_seq: u16,
        payload: &[u8],
        now: Instant,
    ) -> Vec<Vec<u8>> {
        let (message_type, body) = match split_message(payload) {
            Ok(parts) => parts,
            Err(e) => {
                debug!("Dropping reliable message {} from {}: {}", msg_seq, addr, e);
                return Vec::new();
            }
        };
        let control = match ControlMessage::from_parts(message_type, body) {
            Ok(message) => Some(message),
            Err(DecodeError::UnknownMessageType(_)) => None,
            Err(e) => {
                debug!("Malformed reliable message {} from {}: {}", msg_seq, addr, e);
                return Vec::new();
            }
        };

        let duplicate = {
            let mut peers = self.peers.lock().await;
            peers
                .link_mut(addr)
                .map_or(false, |link| link.receiver.already_processed(msg_seq))
        };
        if duplicate {
            // the sender is still waiting for an ack
            self.book_header(addr, header, now).await;
            debug!("Duplicate reliable message {} from {}", msg_seq, addr);
            return Vec::new();
        }

        let player_id = self.sessions.read().await.player_for_addr(addr);
        let handled = self
            .simulation
            .lock()
            .await
            .handle_reliable_message(player_id, addr, message_type, body);
        if !handled && control.is_none() {
            debug!("Unhandled reliable message type {} from {}", message_type, addr);
            return Vec::new();
        }

        self.book_header(addr, header, now).await;
        {
            let mut peers = self.peers.lock().await;
            peers.link_or_insert(addr, now).receiver.mark_processed(msg_seq);
        }
        let player_id = self.sessions.write().await.touch_addr(addr, now);
        if handled {
            return Vec::new();
        }

        match control {
            Some(ControlMessage::Ping { sent_at_ms }) => {
                let reply = match (ControlMessage::Pong { sent_at_ms }).encode() {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!("Failed to encode pong for {}: {}", addr, e);
                        return Vec::new();
                    }
                };
                let mut peers = self.peers.lock().await;
                let (_, datagram) = peers.link_or_insert(addr, now).reliable_datagram(reply, now);
                vec![datagram]
            }
            Some(ControlMessage::Leave) => {
                self.evict(addr, player_id).await;
                Vec::new()
            }
            Some(ControlMessage::Pong { .. }) | None => Vec::new(),
        }
    }

    async fn evict(&self, addr: SocketAddr, player_id: Option<u16>) {
        let removed = match player_id {
            Some(id) => self.sessions.write().await.remove(id),
            None => None,
        };
        if let Some(session) = removed.filter(|session| session.registered) {
            self.simulation.lock().await.on_leave(session.id);
        }
        let still_used = self.sessions.read().await.is_addr_in_use(addr);
        if !still_used {
            self.peers.lock().await.remove(addr);
        }
    }
}
