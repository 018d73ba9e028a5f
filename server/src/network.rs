//! Server network layer: socket ownership and the four server loops

use crate::config::ServerConfig;
use crate::handler::DatagramHandler;
use crate::peers::PeerTable;
use crate::scheduler::{TickFrame, TickScheduler};
use crate::sessions::SessionRegistry;
use crate::simulation::Simulation;
use log::{debug, error, info, warn};
use shared::MAX_DATAGRAM_SIZE;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Requests a cooperative stop of every loop observing the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.0.send(true).is_err() {
            debug!("Shutdown requested after all loops exited");
        }
    }
}

/// Authoritative game server coordinating networking and the simulation
pub struct Server<S: Simulation> {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    sessions: Arc<RwLock<SessionRegistry>>,
    peers: Arc<Mutex<PeerTable>>,
    simulation: Arc<Mutex<S>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: Simulation> Server<S> {
    pub async fn new(
        config: ServerConfig,
        simulation: S,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.listen_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sessions =
            SessionRegistry::new(config.effective_max_players(), config.max_inputs_per_sec);

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(sessions)),
            peers: Arc::new(Mutex::new(PeerTable::new())),
            simulation: Arc::new(Mutex::new(simulation)),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    pub fn sessions(&self) -> Arc<RwLock<SessionRegistry>> {
        Arc::clone(&self.sessions)
    }

    pub fn simulation(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.simulation)
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let handler = DatagramHandler::new(
            Arc::clone(&self.sessions),
            Arc::clone(&self.peers),
            Arc::clone(&self.simulation),
        );
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    result = socket.recv_from(&mut buffer) => match result {
                        Ok((len, addr)) => {
                            let replies = handler
                                .handle_datagram(&buffer[..len], addr, Instant::now())
                                .await;
                            for reply in replies {
                                send_datagram(&socket, &reply, addr).await;
                            }
                        }
                        Err(e) => {
                            error!("Error receiving datagram: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    },
                }
            }
            debug!("Receive loop stopped");
        })
    }

    /// Spawns the fixed-rate tick loop that simulates and broadcasts frames
    fn spawn_tick_loop(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let peers = Arc::clone(&self.peers);
        let simulation = Arc::clone(&self.simulation);
        let tick_duration = self.config.tick_duration();
        let tick_rate = self.config.tick_rate.max(1);
        let mut scheduler = TickScheduler::new(self.config.stale_input_ticks);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(tick_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let frame = {
                    let mut sessions = sessions.write().await;
                    let mut simulation = simulation.lock().await;
                    scheduler.run_tick(&mut *sessions, &mut *simulation)
                };

                match frame {
                    Ok(frame) => {
                        if frame.tick % tick_rate == 0 && !frame.recipients.is_empty() {
                            debug!("Tick {}: {} players", frame.tick, frame.recipients.len());
                        }
                        broadcast_frame(&socket, &peers, &frame).await;
                    }
                    Err(e) => error!("Failed to build frame: {}", e),
                }
            }
            debug!("Tick loop stopped");
        })
    }

    /// Spawns task that re-sends unacknowledged reliable messages
    fn spawn_retransmitter(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);
        let period = self.config.retransmit_interval;
        let threshold = self.config.retransmit_threshold;
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let due = peers.lock().await.due_retransmissions(threshold, Instant::now());
                for (addr, datagram) in due {
                    send_datagram(&socket, &datagram, addr).await;
                }
            }
            debug!("Retransmit loop stopped");
        })
    }

    /// Spawns task that evicts silent players and idle links
    fn spawn_timeout_checker(&self) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let peers = Arc::clone(&self.peers);
        let simulation = Arc::clone(&self.simulation);
        let timeout = self.config.player_timeout;
        let period = self.config.sweep_interval;
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let now = Instant::now();
                let expired = sessions.write().await.sweep_expired(timeout, now);
                for session in &expired {
                    if session.registered {
                        simulation.lock().await.on_leave(session.id);
                    }
                }

                let in_use: Vec<bool> = {
                    let sessions = sessions.read().await;
                    expired
                        .iter()
                        .map(|session| sessions.is_addr_in_use(session.remote_addr))
                        .collect()
                };
                let mut peers = peers.lock().await;
                for (session, in_use) in expired.iter().zip(in_use) {
                    if !in_use {
                        peers.remove(session.remote_addr);
                    }
                }
                peers.sweep_idle(timeout, now);
            }
            debug!("Timeout checker stopped");
        })
    }

    /// Runs every server loop until shutdown is requested
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let handles = vec![
            self.spawn_network_receiver(),
            self.spawn_tick_loop(),
            self.spawn_retransmitter(),
            self.spawn_timeout_checker(),
        ];

        info!(
            "Server started at {} Hz (timeout {:?}, max {} players)",
            self.config.tick_rate,
            self.config.player_timeout,
            self.config.effective_max_players()
        );

        let mut shutdown = self.shutdown_rx.clone();
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping || shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Server shutting down");
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Server task failed: {}", e);
            }
        }
        Ok(())
    }
}

async fn broadcast_frame(socket: &UdpSocket, peers: &Mutex<PeerTable>, frame: &TickFrame) {
    if frame.recipients.is_empty() {
        return;
    }

    let now = Instant::now();
    let datagrams: Vec<(SocketAddr, Vec<u8>)> = {
        let mut peers = peers.lock().await;
        frame
            .recipients
            .iter()
            .map(|&(_, addr)| {
                let link = peers.link_or_insert(addr, now);
                let (_, datagram) = link.unreliable_datagram(&frame.payload);
                (addr, datagram)
            })
            .collect()
    };

    for (addr, datagram) in datagrams {
        send_datagram(socket, &datagram, addr).await;
    }
}

async fn send_datagram(socket: &UdpSocket, datagram: &[u8], addr: SocketAddr) {
    if let Err(e) = socket.send_to(datagram, addr).await {
        warn!("Failed to send to {}: {}", addr, e);
    }
}
