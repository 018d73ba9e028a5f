use crate::config::GameConfig;
use crate::simulation::Simulation;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    EncodeError, FoodState, InputCommand, PlayerState, Snapshot, FOOD_RADIUS, FOOD_VALUE,
    PLAYER_START_RADIUS,
};
use std::collections::BTreeMap;

/// Speed multiplier never drops below this, however large a player grows.
const MIN_SPEED_FACTOR: f32 = 0.4;

/// "Grow by eating" arena: players roam a square, swallow food pellets they touch,
/// and slow down as they grow.
#[derive(Debug)]
pub struct BallBattle {
    config: GameConfig,
    players: BTreeMap<u16, PlayerState>,
    foods: BTreeMap<u32, FoodState>,
    next_food_id: u32,
    rng: StdRng,
}

impl BallBattle {
    /// Builds the arena and scatters its food. `config` should have passed
    /// [`GameConfig::validate`].
    pub fn new(config: GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut game = Self {
            config,
            players: BTreeMap::new(),
            foods: BTreeMap::new(),
            next_food_id: 1,
            rng,
        };
        for _ in 0..game.config.food_count {
            game.spawn_food();
        }
        game
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn foods(&self) -> impl Iterator<Item = &FoodState> {
        self.foods.values()
    }

    pub fn player(&self, id: u16) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn food_count(&self) -> usize {
        self.foods.len()
    }

    pub fn arena_half(&self) -> f32 {
        self.config.arena_half
    }

    /// Distance a player of `radius` covers per input.
    pub fn speed_for_radius(&self, radius: f32) -> f32 {
        self.config.base_speed * (1.5 / (1.0 + radius)).max(MIN_SPEED_FACTOR)
    }

    pub fn add_player(&mut self, id: u16) -> PlayerState {
        let player = PlayerState {
            id,
            x: self.random_coordinate(),
            y: self.random_coordinate(),
            radius: PLAYER_START_RADIUS,
        };
        self.players.insert(id, player);
        info!("Spawned player {} at ({:.1}, {:.1})", id, player.x, player.y);
        player
    }

    pub fn remove_player(&mut self, id: u16) -> bool {
        let removed = self.players.remove(&id).is_some();
        if removed {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Moves one player and lets it eat. Unknown ids are spawned first.
    pub fn apply_input(&mut self, id: u16, input: InputCommand) {
        if !self.players.contains_key(&id) {
            self.add_player(id);
        }
        let half = self.config.arena_half;
        let Some(radius) = self.players.get(&id).map(|p| p.radius) else {
            return;
        };
        let speed = self.speed_for_radius(radius);
        let (dx, dy) = input.direction();

        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        player.x = (player.x + dx * speed).clamp(-half, half);
        player.y = (player.y + dy * speed).clamp(-half, half);
        let player = *player;

        let eaten: Vec<u32> = self
            .foods
            .values()
            .filter(|f| overlaps(player.x, player.y, player.radius, f.x, f.y, f.radius))
            .map(|f| f.id)
            .collect();

        for food_id in eaten {
            if let Some(food) = self.foods.remove(&food_id) {
                if let Some(p) = self.players.get_mut(&id) {
                    p.radius += food.value;
                    debug!("Player {} ate food {}, radius {:.2}", id, food_id, p.radius);
                }
                self.spawn_food();
            }
        }
    }

    pub fn snapshot_state(&self) -> Snapshot {
        Snapshot {
            players: self.players.values().copied().collect(),
            foods: self.foods.values().copied().collect(),
        }
    }

    fn spawn_food(&mut self) {
        let id = self.next_food_id;
        self.next_food_id = self.next_food_id.wrapping_add(1);
        let food = FoodState {
            id,
            x: self.random_coordinate(),
            y: self.random_coordinate(),
            value: FOOD_VALUE,
            radius: FOOD_RADIUS,
        };
        self.foods.insert(id, food);
    }

    fn random_coordinate(&mut self) -> f32 {
        (self.rng.gen::<f32>() * 2.0 - 1.0) * self.config.arena_half
    }
}

impl Simulation for BallBattle {
    fn on_join(&mut self, player_id: u16) {
        self.add_player(player_id);
    }

    fn on_leave(&mut self, player_id: u16) {
        self.remove_player(player_id);
    }

    fn tick(&mut self, _tick: u32, inputs: &BTreeMap<u16, InputCommand>) {
        for (&player_id, &input) in inputs {
            if input != InputCommand::None {
                self.apply_input(player_id, input);
            }
        }
    }

    fn snapshot(&self, _tick: u32) -> Result<Vec<u8>, EncodeError> {
        self.snapshot_state().encode()
    }
}

fn overlaps(x1: f32, y1: f32, r1: f32, x2: f32, y2: f32, r2: f32) -> bool {
    let dx = (x1 - x2) as f64;
    let dy = (y1 - y2) as f64;
    let rr = (r1 + r2) as f64;
    dx * dx + dy * dy <= rr * rr
}
