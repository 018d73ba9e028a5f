//! Server and game tuning knobs.

use shared::packet::frame_len;
use shared::snapshot::FOOD_SIZE;
use shared::{
    Snapshot, BASE_SPEED, DEFAULT_ARENA_HALF, DEFAULT_FOOD_COUNT, DEFAULT_PORT,
    DEFAULT_TICK_RATE, HEADER_SIZE, RETRANSMIT_INTERVAL_MS, RETRANSMIT_THRESHOLD_MS,
};
use std::time::Duration;
use thiserror::Error;

/// The snapshot encodes its player count in a single byte.
pub const MAX_PLAYERS_CEILING: usize = u8::MAX as usize;

/// Largest payload of a single UDP datagram over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Beyond this, spawn coordinates stop being uniformly samplable in `f32`.
pub const MAX_ARENA_HALF: f32 = 1.0e6;

/// A game configuration the server refuses to start with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("arena half-size must be in (0, {max}], got {value}")]
    ArenaSize { value: f32, max: f32 },

    #[error("base speed must be finite and not negative, got {0}")]
    Speed(f32),

    #[error("{foods} foods do not fit in one frame with {players} players (limit {limit})")]
    TooManyFoods {
        foods: usize,
        players: usize,
        limit: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tick_rate: u32,
    /// Sessions silent for longer than this are evicted.
    pub player_timeout: Duration,
    pub max_inputs_per_sec: u32,
    pub max_players: usize,
    pub retransmit_interval: Duration,
    /// A reliable message is re-sent once its last transmission is older than this.
    pub retransmit_threshold: Duration,
    pub sweep_interval: Duration,
    /// Inputs tagged more than this many ticks behind the current tick are dropped.
    pub stale_input_ticks: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            tick_rate: DEFAULT_TICK_RATE,
            player_timeout: Duration::from_secs(5),
            max_inputs_per_sec: 120,
            max_players: 32,
            retransmit_interval: Duration::from_millis(RETRANSMIT_INTERVAL_MS),
            retransmit_threshold: Duration::from_millis(RETRANSMIT_THRESHOLD_MS),
            sweep_interval: Duration::from_secs(1),
            stale_input_ticks: 30,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate.max(1) as u64)
    }

    /// `max_players` clamped to what a snapshot can describe.
    pub fn effective_max_players(&self) -> usize {
        self.max_players.min(MAX_PLAYERS_CEILING)
    }
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// The arena spans `[-arena_half, arena_half]` on both axes.
    pub arena_half: f32,
    pub food_count: usize,
    pub base_speed: f32,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena_half: DEFAULT_ARENA_HALF,
            food_count: DEFAULT_FOOD_COUNT,
            base_speed: BASE_SPEED,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Most foods a frame datagram can carry next to `max_players` players.
    pub fn max_foods(max_players: usize) -> usize {
        let players = max_players.min(MAX_PLAYERS_CEILING);
        let fixed = HEADER_SIZE + frame_len(players, Snapshot::len_for(players, 0));
        MAX_UDP_PAYLOAD.saturating_sub(fixed) / FOOD_SIZE
    }

    /// Checks the values the simulation relies on. Run before building a
    /// [`BallBattle`](crate::game::BallBattle).
    pub fn validate(&self, max_players: usize) -> Result<(), ConfigError> {
        if !(self.arena_half > 0.0 && self.arena_half <= MAX_ARENA_HALF) {
            return Err(ConfigError::ArenaSize {
                value: self.arena_half,
                max: MAX_ARENA_HALF,
            });
        }
        if !self.base_speed.is_finite() || self.base_speed < 0.0 {
            return Err(ConfigError::Speed(self.base_speed));
        }
        let limit = Self::max_foods(max_players);
        if self.food_count > limit {
            return Err(ConfigError::TooManyFoods {
                foods: self.food_count,
                players: max_players.min(MAX_PLAYERS_CEILING),
                limit,
            });
        }
        Ok(())
    }
}
