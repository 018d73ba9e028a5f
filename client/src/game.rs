use crate::sync::is_restart;
use log::{debug, info};
use shared::{FoodState, PlayerState, Snapshot};
use std::collections::BTreeMap;

/// Client-side mirror of the last world snapshot received from the server.
#[derive(Debug, Clone)]
pub struct ClientGameState {
    pub my_id: u16,
    /// Tick of the snapshot currently mirrored, 0 before the first frame
    pub tick: u32,
    pub players: BTreeMap<u16, PlayerState>,
    pub foods: BTreeMap<u32, FoodState>,
    frames_applied: u64,
}

impl ClientGameState {
    pub fn new(my_id: u16) -> Self {
        Self {
            my_id,
            tick: 0,
            players: BTreeMap::new(),
            foods: BTreeMap::new(),
            frames_applied: 0,
        }
    }

    /// Replaces the mirror with `snapshot`. Frames arrive unordered, so a snapshot not
    /// newer than the mirrored one is dropped, unless it is so far behind that the
    /// server must have restarted. Returns whether it was applied.
    pub fn apply_snapshot(&mut self, tick: u32, snapshot: Snapshot) -> bool {
        if self.frames_applied > 0 && tick <= self.tick {
            if !is_restart(tick, self.tick) {
                debug!("Dropping stale snapshot for tick {} (have {})", tick, self.tick);
                return false;
            }
            info!("Server restarted (tick {} after {})", tick, self.tick);
        }

        self.tick = tick;
        self.players = snapshot.players.into_iter().map(|p| (p.id, p)).collect();
        self.foods = snapshot.foods.into_iter().map(|f| (f.id, f)).collect();
        self.frames_applied += 1;
        true
    }

    pub fn my_player(&self) -> Option<&PlayerState> {
        self.players.get(&self.my_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn food_count(&self) -> usize {
        self.foods.len()
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }
}
