//! The seam between the network core and the game rules.

use shared::{EncodeError, InputCommand};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Game rules driven by the tick scheduler.
///
/// All calls happen on the tick loop or the receive loop while the simulation lock is
/// held, so implementations need no interior synchronization.
pub trait Simulation: Send + 'static {
    /// A session was registered; spawn its player.
    fn on_join(&mut self, player_id: u16);

    /// A registered session timed out or left.
    fn on_leave(&mut self, player_id: u16);

    /// Advances the world by one tick. `inputs` holds at most one command per player.
    fn tick(&mut self, tick: u32, inputs: &BTreeMap<u16, InputCommand>);

    /// Opaque snapshot bytes broadcast inside this tick's frame.
    fn snapshot(&self, tick: u32) -> Result<Vec<u8>, EncodeError>;

    /// Offered every well-formed reliable message before the built-in control handling.
    /// Return true to consume it. An unconsumed message of an unknown type is dropped
    /// without being acknowledged.
    fn handle_reliable_message(
        &mut self,
        _player_id: Option<u16>,
        _addr: SocketAddr,
        _message_type: u8,
        _body: &[u8],
    ) -> bool {
        false
    }
}
