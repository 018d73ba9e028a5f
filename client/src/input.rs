//! Scripted input for the headless client

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::InputCommand;

/// Sends between two direction changes of the `wander` pattern
const WANDER_HOLD: u32 = 30;

const DIRECTIONS: [InputCommand; 4] = [
    InputCommand::Left,
    InputCommand::Right,
    InputCommand::Up,
    InputCommand::Down,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InputPattern {
    /// Send `None` every tick; keeps the session alive without moving
    #[default]
    Idle,
    Left,
    Right,
    Up,
    Down,
    /// Random direction, changed every few ticks
    Wander,
}

/// Produces one command per input send according to a pattern
pub struct InputSource {
    pattern: InputPattern,
    rng: StdRng,
    current: InputCommand,
    held_for: u32,
}

impl InputSource {
    pub fn new(pattern: InputPattern, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            pattern,
            rng,
            current: InputCommand::None,
            held_for: 0,
        }
    }

    pub fn next_command(&mut self) -> InputCommand {
        match self.pattern {
            InputPattern::Idle => InputCommand::None,
            InputPattern::Left => InputCommand::Left,
            InputPattern::Right => InputCommand::Right,
            InputPattern::Up => InputCommand::Up,
            InputPattern::Down => InputCommand::Down,
            InputPattern::Wander => {
                if self.held_for == 0 || self.held_for >= WANDER_HOLD {
                    self.current = DIRECTIONS[self.rng.gen_range(0..DIRECTIONS.len())];
                    self.held_for = 0;
                }
                self.held_for += 1;
                self.current
            }
        }
    }
}
