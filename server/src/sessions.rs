//! Player session tracking for the tick loop
//!
//! Sessions are created implicitly by the first input a player id sends, so a client
//! that lost its session (timeout, server restart) rejoins just by continuing to play.
//! Each session holds at most one pending input; the tick loop takes it exactly once.

use log::{debug, info, warn};
use shared::{InputCommand, InputPacket};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const RATE_WINDOW: Duration = Duration::from_secs(1);

/// A player known to the server
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: u16,
    /// Address the latest datagram for this player came from
    pub remote_addr: SocketAddr,
    /// Last time any datagram was attributed to this player
    pub last_seen: Instant,
    /// Set once the simulation has been told about this player
    pub registered: bool,
    window_start: Instant,
    inputs_in_window: u32,
    pending_input: Option<(u32, InputCommand)>,
}

impl PlayerSession {
    pub fn new(id: u16, remote_addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            remote_addr,
            last_seen: now,
            registered: false,
            window_start: now,
            inputs_in_window: 0,
            pending_input: None,
        }
    }

    /// Returns true if the session has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }

    pub fn pending_input(&self) -> Option<(u32, InputCommand)> {
        self.pending_input
    }

    /// Counts one input against the per-second budget. Returns false once it is spent.
    fn admit(&mut self, max_per_sec: u32, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= RATE_WINDOW {
            self.window_start = now;
            self.inputs_in_window = 0;
        }
        if self.inputs_in_window >= max_per_sec {
            return false;
        }
        self.inputs_in_window += 1;
        true
    }

    /// Keeps the input tagged for the latest tick.
    fn stage(&mut self, tick: u32, input: InputCommand) {
        match self.pending_input {
            Some((pending_tick, _)) if pending_tick > tick => {}
            _ => self.pending_input = Some((tick, input)),
        }
    }
}

/// Result of offering an input to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Accepted { joined: bool },
    RateLimited,
    Full,
}

/// All live sessions, keyed by player id
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<u16, PlayerSession>,
    max_players: usize,
    max_inputs_per_sec: u32,
}

impl SessionRegistry {
    pub fn new(max_players: usize, max_inputs_per_sec: u32) -> Self {
        Self {
            sessions: BTreeMap::new(),
            max_players,
            max_inputs_per_sec,
        }
    }

    /// Stages an input, creating the session on first contact.
    ///
    /// Rate-limited inputs still refresh `last_seen`.
    pub fn record_input(
        &mut self,
        packet: &InputPacket,
        addr: SocketAddr,
        now: Instant,
    ) -> InputOutcome {
        let joined = !self.sessions.contains_key(&packet.player_id);
        if joined && self.sessions.len() >= self.max_players {
            warn!(
                "Rejecting player {} from {}: server full ({} players)",
                packet.player_id,
                addr,
                self.sessions.len()
            );
            return InputOutcome::Full;
        }

        let session = self
            .sessions
            .entry(packet.player_id)
            .or_insert_with(|| PlayerSession::new(packet.player_id, addr, now));
        if joined {
            info!("Player {} joined from {}", packet.player_id, addr);
        } else if session.remote_addr != addr {
            info!(
                "Player {} moved from {} to {}",
                packet.player_id, session.remote_addr, addr
            );
            session.remote_addr = addr;
        }
        session.last_seen = now;

        if !session.admit(self.max_inputs_per_sec, now) {
            debug!("Rate limited input from player {}", packet.player_id);
            return InputOutcome::RateLimited;
        }
        session.stage(packet.tick, packet.input);
        InputOutcome::Accepted { joined }
    }

    /// Refreshes every session bound to `addr` and returns the first such player.
    pub fn touch_addr(&mut self, addr: SocketAddr, now: Instant) -> Option<u16> {
        let mut found = None;
        for session in self.sessions.values_mut() {
            if session.remote_addr == addr {
                session.last_seen = now;
                if found.is_none() {
                    found = Some(session.id);
                }
            }
        }
        found
    }

    pub fn player_for_addr(&self, addr: SocketAddr) -> Option<u16> {
        self.sessions
            .values()
            .find(|session| session.remote_addr == addr)
            .map(|session| session.id)
    }

    pub fn is_addr_in_use(&self, addr: SocketAddr) -> bool {
        self.player_for_addr(addr).is_some()
    }

    /// Marks sessions the simulation has not seen yet as registered and returns their ids.
    pub fn take_unregistered(&mut self) -> Vec<u16> {
        self.sessions
            .values_mut()
            .filter(|session| !session.registered)
            .map(|session| {
                session.registered = true;
                session.id
            })
            .collect()
    }

    /// Drains the pending input of every registered session.
    ///
    /// Inputs tagged more than `stale_ticks` behind `current_tick` are discarded.
    pub fn take_inputs(
        &mut self,
        current_tick: u32,
        stale_ticks: u32,
    ) -> BTreeMap<u16, InputCommand> {
        let mut inputs = BTreeMap::new();
        for session in self.sessions.values_mut().filter(|s| s.registered) {
            let Some((tick, input)) = session.pending_input.take() else {
                continue;
            };
            if tick.saturating_add(stale_ticks) < current_tick {
                debug!(
                    "Dropping stale input for player {} (tagged {}, now {})",
                    session.id, tick, current_tick
                );
                continue;
            }
            inputs.insert(session.id, input);
        }
        inputs
    }

    /// Registered sessions that should receive this tick's frame.
    pub fn broadcast_targets(&self) -> Vec<(u16, SocketAddr)> {
        self.sessions
            .values()
            .filter(|session| session.registered)
            .map(|session| (session.id, session.remote_addr))
            .collect()
    }

    /// Removes sessions idle for longer than `timeout` and returns them.
    pub fn sweep_expired(&mut self, timeout: Duration, now: Instant) -> Vec<PlayerSession> {
        let expired: Vec<u16> = self
            .sessions
            .values()
            .filter(|session| session.is_timed_out(timeout, now))
            .map(|session| session.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .inspect(|session| info!("Player {} timed out", session.id))
            .collect()
    }

    pub fn remove(&mut self, player_id: u16) -> Option<PlayerSession> {
        let removed = self.sessions.remove(&player_id);
        if removed.is_some() {
            info!("Player {} left", player_id);
        }
        removed
    }

    pub fn get(&self, player_id: u16) -> Option<&PlayerSession> {
        self.sessions.get(&player_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn input(player_id: u16, tick: u32, input: InputCommand) -> InputPacket {
        InputPacket {
            tick,
            player_id,
            input,
            timestamp: 0,
        }
    }

    #[test]
    fn test_first_input_creates_session() {
        let mut registry = SessionRegistry::new(4, 120);
        let now = Instant::now();

        let outcome = registry.record_input(&input(1, 1, InputCommand::Left), test_addr(), now);
        assert_eq!(outcome, InputOutcome::Accepted { joined: true });
        assert_eq!(registry.len(), 1);

        let session = registry.get(1).unwrap();
        assert_eq!(session.remote_addr, test_addr());
        assert!(!session.registered);

        let outcome = registry.record_input(&input(1, 2, InputCommand::Left), test_addr(), now);
        assert_eq!(outcome, InputOutcome::Accepted { joined: false });
    }

    #[test]
    fn test_capacity_limit() {
        let mut registry = SessionRegistry::new(1, 120);
        let now = Instant::now();
        registry.record_input(&input(1, 1, InputCommand::None), test_addr(), now);

        let outcome = registry.record_input(&input(2, 1, InputCommand::None), test_addr2(), now);
        assert_eq!(outcome, InputOutcome::Full);
        assert_eq!(registry.len(), 1);

        // existing players are unaffected by the limit
        let outcome = registry.record_input(&input(1, 2, InputCommand::Up), test_addr(), now);
        assert_eq!(outcome, InputOutcome::Accepted { joined: false });
    }

    #[test]
    fn test_rate_limit_window() {
        let mut registry = SessionRegistry::new(4, 3);
        let start = Instant::now();
        for tick in 1..=3 {
            let outcome =
                registry.record_input(&input(1, tick, InputCommand::Right), test_addr(), start);
            assert!(matches!(outcome, InputOutcome::Accepted { .. }));
        }
        assert_eq!(
            registry.record_input(&input(1, 4, InputCommand::Right), test_addr(), start),
            InputOutcome::RateLimited
        );
        // the dropped input never replaced the staged one
        assert_eq!(registry.get(1).unwrap().pending_input(), Some((3, InputCommand::Right)));

        let later = start + Duration::from_secs(1);
        assert!(matches!(
            registry.record_input(&input(1, 5, InputCommand::Right), test_addr(), later),
            InputOutcome::Accepted { .. }
        ));
    }

    #[test]
    fn test_latest_tick_wins() {
        let mut registry = SessionRegistry::new(4, 120);
        let now = Instant::now();
        registry.record_input(&input(1, 10, InputCommand::Left), test_addr(), now);
        registry.record_input(&input(1, 8, InputCommand::Right), test_addr(), now);
        assert_eq!(registry.get(1).unwrap().pending_input(), Some((10, InputCommand::Left)));

        registry.record_input(&input(1, 10, InputCommand::Up), test_addr(), now);
        assert_eq!(registry.get(1).unwrap().pending_input(), Some((10, InputCommand::Up)));
    }

    #[test]
    fn test_inputs_taken_once_and_only_when_registered() {
        let mut registry = SessionRegistry::new(4, 120);
        let now = Instant::now();
        registry.record_input(&input(1, 1, InputCommand::Left), test_addr(), now);

        assert!(registry.take_inputs(1, 30).is_empty());
        assert_eq!(registry.take_unregistered(), vec![1]);
        assert!(registry.take_unregistered().is_empty());

        registry.record_input(&input(1, 2, InputCommand::Left), test_addr(), now);
        let inputs = registry.take_inputs(2, 30);
        assert_eq!(inputs.get(&1), Some(&InputCommand::Left));
        assert!(registry.take_inputs(3, 30).is_empty());
    }

    #[test]
    fn test_stale_inputs_dropped() {
        let mut registry = SessionRegistry::new(4, 120);
        let now = Instant::now();
        registry.record_input(&input(1, 5, InputCommand::Down), test_addr(), now);
        registry.take_unregistered();

        assert!(registry.take_inputs(100, 30).is_empty());

        registry.record_input(&input(1, 70, InputCommand::Down), test_addr(), now);
        assert_eq!(registry.take_inputs(100, 30).len(), 1);
    }

    #[test]
    fn test_broadcast_targets_only_registered() {
        let mut registry = SessionRegistry::new(4, 120);
        let now = Instant::now();
        registry.record_input(&input(1, 1, InputCommand::None), test_addr(), now);
        registry.take_unregistered();
        registry.record_input(&input(2, 1, InputCommand::None), test_addr2(), now);

        assert_eq!(registry.broadcast_targets(), vec![(1, test_addr())]);
    }

    #[test]
    fn test_addr_lookup_and_touch() {
        let mut registry = SessionRegistry::new(4, 120);
        let start = Instant::now();
        registry.record_input(&input(3, 1, InputCommand::None), test_addr(), start);

        assert_eq!(registry.player_for_addr(test_addr()), Some(3));
        assert_eq!(registry.player_for_addr(test_addr2()), None);

        let later = start + Duration::from_secs(3);
        assert_eq!(registry.touch_addr(test_addr(), later), Some(3));
        assert_eq!(registry.get(3).unwrap().last_seen, later);
        assert_eq!(registry.touch_addr(test_addr2(), later), None);
    }

    #[test]
    fn test_address_change_follows_player() {
        let mut registry = SessionRegistry::new(4, 120);
        let now = Instant::now();
        registry.record_input(&input(3, 1, InputCommand::None), test_addr(), now);
        registry.record_input(&input(3, 2, InputCommand::None), test_addr2(), now);
        assert_eq!(registry.get(3).unwrap().remote_addr, test_addr2());
        assert!(!registry.is_addr_in_use(test_addr()));
    }

    #[test]
    fn test_sweep_expired() {
        let mut registry = SessionRegistry::new(4, 120);
        let start = Instant::now();
        registry.record_input(&input(1, 1, InputCommand::None), test_addr(), start);
        registry.record_input(
            &input(2, 1, InputCommand::None),
            test_addr2(),
            start + Duration::from_secs(4),
        );

        let timeout = Duration::from_secs(5);
        assert!(registry
            .sweep_expired(timeout, start + Duration::from_secs(5))
            .is_empty());

        let removed = registry.sweep_expired(timeout, start + Duration::from_secs(6));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut registry = SessionRegistry::new(4, 120);
        registry.record_input(&input(1, 1, InputCommand::None), test_addr(), Instant::now());
        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert!(registry.is_empty());
    }
}
