//! # Ball Battle Client Library
//!
//! Headless client for the Ball Battle network core. It sends one input per local tick,
//! mirrors the world from the frames the server broadcasts, and measures the link.
//!
//! ## Tick Synchronization
//!
//! The client keeps a local tick that starts at 1 and advances once per send interval.
//! Each input is stamped one tick ahead of it so the server can still apply it on
//! arrival. Whenever a frame reports a later tick, the local tick jumps to it; the
//! server's tick is authoritative and nothing is extrapolated past it.
//!
//! ## Telemetry
//!
//! Round-trip time is sampled whenever a reliable message (a ping, for example) is
//! acknowledged. Loss is the fraction of recently sent packet sequences that no ack
//! window from the server ever covered.
//!
//! ## Module Organization
//!
//! - [`network`]: socket ownership and the receive, input, retransmit and ping loops
//! - [`sync`]: local tick tracking
//! - [`telemetry`]: RTT and loss estimates
//! - [`game`]: mirror of the last received snapshot
//! - [`input`]: scripted input patterns
//! - [`config`]: tuning knobs
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::input::InputPattern;
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         server_addr: "127.0.0.1:30000".to_string(),
//!         pattern: InputPattern::Wander,
//!         ..ClientConfig::default()
//!     };
//!     let client = Client::new(config).await?;
//!
//!     let shutdown = client.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     client.run().await
//! }
//! ```

pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod sync;
pub mod telemetry;
