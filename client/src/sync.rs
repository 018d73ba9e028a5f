//! Local tick tracking against the server's authoritative tick.

use log::debug;

/// A frame this many ticks behind what the client holds means the server restarted
/// its tick counter. Reordering never delays a frame that long.
pub const RESTART_GAP_TICKS: u32 = 600;

/// True when `tick` is far enough below `current` to come from a restarted server.
pub fn is_restart(tick: u32, current: u32) -> bool {
    tick.saturating_add(RESTART_GAP_TICKS) < current
}

/// Keeps the client's tick estimate close to the server's.
///
/// The estimate advances once per send interval and jumps forward whenever a frame
/// reports a later tick. A frame from a restarted server resets it. Inputs are tagged
/// one tick ahead of the estimate.
#[derive(Debug, Clone)]
pub struct ClientSync {
    local_tick: u32,
}

impl Default for ClientSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSync {
    pub fn new() -> Self {
        Self {
            local_tick: 1,
        }
    }

    pub fn local_tick(&self) -> u32 {
        self.local_tick
    }

    /// Tick to stamp on the input about to be sent.
    pub fn next_input_tick(&self) -> u32 {
        self.local_tick.wrapping_add(1)
    }

    /// Called once per send interval, after the input went out.
    pub fn advance(&mut self) {
        self.local_tick = self.local_tick.wrapping_add(1);
    }

    /// Returns true when the frame moved the local estimate.
    pub fn observe_frame_tick(&mut self, tick: u32) -> bool {
        if tick > self.local_tick {
            self.local_tick = tick;
            return true;
        }
        if is_restart(tick, self.local_tick) {
            debug!("Server tick fell from {} to {}, resyncing", self.local_tick, tick);
            self.local_tick = tick;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_one() {
        let sync = ClientSync::new();
        assert_eq!(sync.local_tick(), 1);
        assert_eq!(sync.next_input_tick(), 2);
    }

    #[test]
    fn test_advance_per_interval() {
        let mut sync = ClientSync::new();
        sync.advance();
        sync.advance();
        assert_eq!(sync.local_tick(), 3);
        assert_eq!(sync.next_input_tick(), 4);
    }

    #[test]
    fn test_frame_ahead_overrides() {
        let mut sync = ClientSync::new();
        assert!(sync.observe_frame_tick(40));
        assert_eq!(sync.local_tick(), 40);
        assert_eq!(sync.next_input_tick(), 41);
    }

    #[test]
    fn test_frame_behind_is_ignored() {
        let mut sync = ClientSync::new();
        for _ in 0..10 {
            sync.advance();
        }
        assert!(!sync.observe_frame_tick(5));
        assert_eq!(sync.local_tick(), 11);
    }

    #[test]
    fn test_restarted_server_resets_estimate() {
        let mut sync = ClientSync::new();
        assert!(sync.observe_frame_tick(5_000));

        assert!(sync.observe_frame_tick(1));
        assert_eq!(sync.local_tick(), 1);
        assert_eq!(sync.next_input_tick(), 2);

        assert!(sync.observe_frame_tick(2));
        assert_eq!(sync.local_tick(), 2);
    }

    #[test]
    fn test_restart_needs_a_large_gap() {
        assert!(!is_restart(4_400, 5_000));
        assert!(is_restart(4_399, 5_000));
        assert!(!is_restart(0, RESTART_GAP_TICKS));
        assert!(!is_restart(u32::MAX, 3));
    }
}
