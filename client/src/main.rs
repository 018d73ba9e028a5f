use clap::Parser;
use client::config::ClientConfig;
use client::input::InputPattern;
use client::network::Client;
use log::{error, info};
use shared::DEFAULT_TICK_RATE;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless Ball Battle client")]
struct Args {
    /// Player id to play as
    #[arg(short, long, default_value_t = 1)]
    id: u16,

    /// Server address to connect to
    #[arg(short, long, default_value = "localhost:30000")]
    server: String,

    /// Inputs sent per second
    #[arg(long, default_value_t = DEFAULT_TICK_RATE)]
    hz: u32,

    /// Input pattern to drive the player with
    #[arg(short, long, value_enum, default_value_t = InputPattern::Wander)]
    pattern: InputPattern,

    /// Fixed RNG seed for the wander pattern
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds between two status lines
    #[arg(long, default_value_t = 2)]
    report: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ClientConfig {
        server_addr: args.server,
        player_id: args.id,
        tick_rate: args.hz,
        pattern: args.pattern,
        seed: args.seed,
        ..ClientConfig::default()
    };

    let client = Client::new(config).await?;

    let shutdown = client.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, leaving...");
                shutdown.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let world = client.world();
    let sync = client.sync();
    let telemetry = client.telemetry();
    let period = Duration::from_secs(args.report.max(1));
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let local_tick = sync.lock().await.local_tick();
            let (tick, players, foods, me) = {
                let world = world.lock().await;
                (
                    world.tick,
                    world.player_count(),
                    world.food_count(),
                    world.my_player().map(|p| (p.x, p.y, p.radius)),
                )
            };
            let (rtt, loss) = {
                let telemetry = telemetry.lock().await;
                (telemetry.srtt(), telemetry.loss_rate(Instant::now()))
            };

            let rtt = rtt
                .map(|rtt| format!("{:.1}ms", rtt.as_secs_f64() * 1000.0))
                .unwrap_or_else(|| "-".to_string());
            info!(
                "tick {} (local {}) players={} foods={} rtt={} loss={:.1}%",
                tick,
                local_tick,
                players,
                foods,
                rtt,
                loss * 100.0
            );
            if let Some((x, y, radius)) = me {
                info!("me at ({:.2}, {:.2}) radius {:.2}", x, y, radius);
            }
        }
    });

    client.run().await
}
