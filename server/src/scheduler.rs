//! Fixed-rate authoritative tick.

use crate::sessions::SessionRegistry;
use crate::simulation::Simulation;
use log::{debug, info};
use shared::packet::encode_frame;
use shared::{EncodeError, FramePacket};
use std::net::SocketAddr;

/// One tick's broadcast: the encoded frame payload and who should get it.
#[derive(Debug, Clone)]
pub struct TickFrame {
    pub tick: u32,
    /// Frame payload without a header; each recipient's link adds its own.
    pub payload: Vec<u8>,
    pub recipients: Vec<(u16, SocketAddr)>,
}

#[derive(Debug)]
pub struct TickScheduler {
    tick: u32,
    stale_input_ticks: u32,
}

impl TickScheduler {
    pub fn new(stale_input_ticks: u32) -> Self {
        Self {
            tick: 0,
            stale_input_ticks,
        }
    }

    /// The last tick that ran; 0 before the first.
    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    /// Advances the world one tick and frames the result.
    pub fn run_tick<S: Simulation>(
        &mut self,
        sessions: &mut SessionRegistry,
        simulation: &mut S,
    ) -> Result<TickFrame, EncodeError> {
        self.tick = self.tick.wrapping_add(1);
        let tick = self.tick;

        for player_id in sessions.take_unregistered() {
            info!("Registering player {} at tick {}", player_id, tick);
            simulation.on_join(player_id);
        }

        let inputs = sessions.take_inputs(tick, self.stale_input_ticks);
        simulation.tick(tick, &inputs);

        let frame = FramePacket {
            tick,
            inputs: inputs
                .iter()
                .map(|(&player_id, &input)| (player_id, input.to_wire()))
                .collect(),
            snapshot: simulation.snapshot(tick)?,
        };
        let payload = encode_frame(&frame)?;
        let recipients = sessions.broadcast_targets();

        if !inputs.is_empty() {
            debug!(
                "Tick {}: applied {} inputs, {} recipients",
                tick,
                inputs.len(),
                recipients.len()
            );
        }

        Ok(TickFrame {
            tick,
            payload,
            recipients,
        })
    }
}
