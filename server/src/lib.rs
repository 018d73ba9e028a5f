//! # Ball Battle Server Library
//!
//! Authoritative server for the Ball Battle network core. It owns the canonical world,
//! collects one input per player per tick, and broadcasts a framed snapshot to every
//! registered player at a fixed rate.
//!
//! ## Transport
//!
//! Plain UDP. Every datagram carries a sequence-numbered header whose ack window
//! piggybacks on all traffic. Frames and inputs are fire-and-forget; control messages
//! (ping, leave, game-specific messages) travel inside reliable envelopes and are
//! retransmitted until one of their carrier packets is acknowledged.
//!
//! ## Module Organization
//!
//! - [`sessions`]: player sessions, implicit join on first input, rate limiting, timeouts
//! - [`peers`]: per-address reliability links
//! - [`handler`]: decoding and dispatch of each received datagram
//! - [`scheduler`]: the per-tick join / input / simulate / snapshot pipeline
//! - [`simulation`]: the trait game rules implement
//! - [`game`]: the "grow by eating" rules shipped with the server
//! - [`network`]: socket ownership and the receive, tick, retransmit and sweep loops
//! - [`config`]: tuning knobs
//!
//! ## Concurrency
//!
//! The session registry, the peer table and the simulation each sit behind their own
//! lock. Each loop receives only the handles it uses, and all loops stop when the
//! shared shutdown signal flips.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{GameConfig, ServerConfig};
//! use server::game::BallBattle;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         listen_addr: "127.0.0.1:30000".to_string(),
//!         ..ServerConfig::default()
//!     };
//!     let game = GameConfig::default();
//!     game.validate(config.effective_max_players())?;
//!     let server = Server::new(config, BallBattle::new(game)).await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod game;
pub mod handler;
pub mod network;
pub mod peers;
pub mod scheduler;
pub mod sessions;
pub mod simulation;
