//! Per-address reliability state.
//!
//! Links are keyed by remote address. Acks and reliable messages can arrive from an
//! address before any session exists for it.

use log::{debug, info};
use shared::{AckedMessage, Link, PacketHeader};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Peer {
    link: Link,
    last_heard: Instant,
}

#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<SocketAddr, Peer>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Books an incoming header for `addr`, creating its link on first contact.
    pub fn on_datagram(
        &mut self,
        addr: SocketAddr,
        header: &PacketHeader,
        now: Instant,
    ) -> Vec<AckedMessage> {
        let peer = self.peers.entry(addr).or_insert_with(|| {
            debug!("New link for {}", addr);
            Peer {
                link: Link::new(),
                last_heard: now,
            }
        });
        peer.last_heard = now;
        peer.link.on_incoming(header, now)
    }

    pub fn link_mut(&mut self, addr: SocketAddr) -> Option<&mut Link> {
        self.peers.get_mut(&addr).map(|peer| &mut peer.link)
    }

    /// The link for `addr`, created empty if it does not exist yet.
    pub fn link_or_insert(&mut self, addr: SocketAddr, now: Instant) -> &mut Link {
        &mut self
            .peers
            .entry(addr)
            .or_insert_with(|| Peer {
                link: Link::new(),
                last_heard: now,
            })
            .link
    }

    pub fn remove(&mut self, addr: SocketAddr) -> bool {
        self.peers.remove(&addr).is_some()
    }

    /// Drops links that have not received anything for longer than `timeout`.
    pub fn sweep_idle(&mut self, timeout: Duration, now: Instant) -> Vec<SocketAddr> {
        let idle: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, peer)| now.saturating_duration_since(peer.last_heard) > timeout)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &idle {
            self.peers.remove(addr);
            info!("Dropped idle link {}", addr);
        }
        idle
    }

    /// Every retransmission that is due, across all links.
    pub fn due_retransmissions(
        &mut self,
        threshold: Duration,
        now: Instant,
    ) -> Vec<(SocketAddr, Vec<u8>)> {
        let mut out = Vec::new();
        for (addr, peer) in self.peers.iter_mut() {
            for (header, datagram) in peer.link.due_retransmissions(threshold, now) {
                debug!("Retransmitting to {} as packet {}", addr, header.packet_seq);
                out.push((*addr, datagram));
            }
        }
        out
    }

    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.peers.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
