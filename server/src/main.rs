use clap::Parser;
use log::{error, info};
use server::config::{GameConfig, ServerConfig};
use server::game::BallBattle;
use server::network::Server;
use shared::{BASE_SPEED, DEFAULT_ARENA_HALF, DEFAULT_FOOD_COUNT, DEFAULT_TICK_RATE};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ball Battle authoritative UDP server")]
struct Args {
    /// UDP address to listen on
    #[arg(short, long, default_value = "0.0.0.0:30000")]
    listen: String,

    /// Simulation ticks per second
    #[arg(short = 'r', long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Seconds of silence before a player is evicted
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Inputs accepted per player per second
    #[arg(long, default_value_t = 120)]
    max_inputs: u32,

    /// Maximum concurrent players (at most 255)
    #[arg(short, long, default_value_t = 32)]
    max_players: usize,

    /// Number of food pellets kept in the arena
    #[arg(short, long, default_value_t = DEFAULT_FOOD_COUNT)]
    foods: usize,

    /// Arena half-size; the arena spans -size..size on both axes
    #[arg(short, long, default_value_t = DEFAULT_ARENA_HALF)]
    size: f32,

    /// Distance a fresh player covers per input
    #[arg(long, default_value_t = BASE_SPEED)]
    speed: f32,

    /// Fixed RNG seed for reproducible worlds
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        listen_addr: args.listen,
        tick_rate: args.tick_rate,
        player_timeout: Duration::from_secs(args.timeout),
        max_inputs_per_sec: args.max_inputs,
        max_players: args.max_players,
        ..ServerConfig::default()
    };
    let game = GameConfig {
        arena_half: args.size,
        food_count: args.foods,
        base_speed: args.speed,
        seed: args.seed,
    };

    game.validate(config.effective_max_players())?;

    info!(
        "Starting Ball Battle server (hz={}, foods={}, size={:.1})",
        config.tick_rate, game.food_count, game.arena_half
    );

    let server = Server::new(config, BallBattle::new(game)).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                shutdown.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await
}
