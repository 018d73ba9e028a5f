//! Client network layer: receive, input, retransmit and ping loops sharing one link

use crate::config::ClientConfig;
use crate::game::ClientGameState;
use crate::input::InputSource;
use crate::sync::ClientSync;
use crate::telemetry::LinkTelemetry;
use log::{debug, error, info, warn};
use shared::control::split_message;
use shared::packet::{decode_header, encode_input};
use shared::{
    now_millis, ClientBound, ControlMessage, InputPacket, Link, PacketHeader, Snapshot,
    MAX_DATAGRAM_SIZE,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Stops every loop of the client it was taken from.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.0.send(true).is_err() {
            debug!("Shutdown requested after all loops exited");
        }
    }
}

pub struct Client {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    config: ClientConfig,
    link: Arc<Mutex<Link>>,
    sync: Arc<Mutex<ClientSync>>,
    telemetry: Arc<Mutex<LinkTelemetry>>,
    world: Arc<Mutex<ClientGameState>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Client {
    pub async fn new(config: ClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr = tokio::net::lookup_host(&config.server_addr)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address found for {}", config.server_addr),
                )
            })?;

        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        info!(
            "Player {} bound to {}, server at {}",
            config.player_id,
            socket.local_addr()?,
            server_addr
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Client {
            socket,
            server_addr,
            link: Arc::new(Mutex::new(Link::new())),
            sync: Arc::new(Mutex::new(ClientSync::new())),
            telemetry: Arc::new(Mutex::new(LinkTelemetry::new(
                config.telemetry_horizon,
                config.loss_grace,
            ))),
            world: Arc::new(Mutex::new(ClientGameState::new(config.player_id))),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    pub fn world(&self) -> Arc<Mutex<ClientGameState>> {
        Arc::clone(&self.world)
    }

    pub fn sync(&self) -> Arc<Mutex<ClientSync>> {
        Arc::clone(&self.sync)
    }

    pub fn telemetry(&self) -> Arc<Mutex<LinkTelemetry>> {
        Arc::clone(&self.telemetry)
    }

    /// Spawns the loop that reads datagrams from the server
    fn spawn_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let link = Arc::clone(&self.link);
        let sync = Arc::clone(&self.sync);
        let telemetry = Arc::clone(&self.telemetry);
        let world = Arc::clone(&self.world);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    result = socket.recv_from(&mut buffer) => match result {
                        Ok((len, addr)) if addr == server_addr => {
                            let replies = handle_datagram(
                                &buffer[..len],
                                &link,
                                &sync,
                                &telemetry,
                                &world,
                            )
                            .await;
                            for reply in replies {
                                send_datagram(&socket, &telemetry, &reply, server_addr).await;
                            }
                        }
                        Ok((_, addr)) => debug!("Ignoring datagram from {}", addr),
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

    /// Spawns the fixed-rate loop sending one input per local tick
    fn spawn_input_sender(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let link = Arc::clone(&self.link);
        let sync = Arc::clone(&self.sync);
        let telemetry = Arc::clone(&self.telemetry);
        let player_id = self.config.player_id;
        let period = self.config.tick_duration();
        let mut source = InputSource::new(self.config.pattern, self.config.seed);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let tick = sync.lock().await.next_input_tick();
                let packet = InputPacket {
                    tick,
                    player_id,
                    input: source.next_command(),
                    timestamp: now_millis(),
                };
                let (_, datagram) = link.lock().await.unreliable_datagram(&encode_input(&packet));
                send_datagram(&socket, &telemetry, &datagram, server_addr).await;
                sync.lock().await.advance();
            }
            debug!("Input loop stopped");
        })
    }

    /// Spawns task that re-sends unacknowledged reliable messages
    fn spawn_retransmitter(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let link = Arc::clone(&self.link);
        let telemetry = Arc::clone(&self.telemetry);
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

                let due = link.lock().await.due_retransmissions(threshold, Instant::now());
                for (header, datagram) in due {
                    debug!("Retransmitting as packet {}", header.packet_seq);
                    send_datagram(&socket, &telemetry, &datagram, server_addr).await;
                }
            }
            debug!("Retransmit loop stopped");
        })
    }

    /// Spawns the loop sending a reliable ping every `ping_interval`
    fn spawn_pinger(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let link = Arc::clone(&self.link);
        let telemetry = Arc::clone(&self.telemetry);
        let period = self.config.ping_interval;
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let ping = ControlMessage::Ping {
                    sent_at_ms: now_millis(),
                };
                send_control(&socket, &link, &telemetry, &ping, server_addr).await;
            }
            debug!("Ping loop stopped");
        })
    }

    /// Runs every client loop until shutdown is requested, then says goodbye
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let handles = vec![
            self.spawn_receiver(),
            self.spawn_input_sender(),
            self.spawn_retransmitter(),
            self.spawn_pinger(),
        ];

        info!(
            "Client running at {} Hz as player {} ({:?})",
            self.config.tick_rate, self.config.player_id, self.config.pattern
        );

        let mut shutdown = self.shutdown_rx.clone();
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping || shutdown.changed().await.is_err() {
                break;
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Client task failed: {}", e);
            }
        }

        send_control(
            &self.socket,
            &self.link,
            &self.telemetry,
            &ControlMessage::Leave,
            self.server_addr,
        )
        .await;
        info!("Client stopped");
        Ok(())
    }
}

/// Books one datagram from the server and returns any replies it requires.
/// Payloads that fail to decode are dropped before the link sees their header, so a
/// corrupt datagram is never acknowledged.
async fn handle_datagram(
    data: &[u8],
    link: &Mutex<Link>,
    sync: &Mutex<ClientSync>,
    telemetry: &Mutex<LinkTelemetry>,
    world: &Mutex<ClientGameState>,
) -> Vec<Vec<u8>> {
    let (header, payload) = match decode_header(data) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!("Dropping datagram: {}", e);
            return Vec::new();
        }
    };

    match ClientBound::classify(payload) {
        ClientBound::Frame(frame) => {
            let snapshot = match Snapshot::decode(&frame.snapshot) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!("Bad snapshot in frame {}: {}", frame.tick, e);
                    return Vec::new();
                }
            };
            book_header(&header, link, telemetry).await;
            sync.lock().await.observe_frame_tick(frame.tick);
            world.lock().await.apply_snapshot(frame.tick, snapshot);
            Vec::new()
        }
        ClientBound::Reliable { msg_seq, payload } => {
            let message = match split_message(payload)
                .and_then(|(message_type, body)| ControlMessage::from_parts(message_type, body))
            {
                Ok(message) => message,
                Err(e) => {
                    debug!("Ignoring reliable message {}: {}", msg_seq, e);
                    return Vec::new();
                }
            };
            book_header(&header, link, telemetry).await;
            if !link.lock().await.receiver.mark_processed(msg_seq) {
                debug!("Duplicate reliable message {}", msg_seq);
                return Vec::new();
            }
            handle_control(message, link).await
        }
        ClientBound::Unknown => {
            debug!("Unrecognized payload of {} bytes", payload.len());
            Vec::new()
        }
    }
}

async fn book_header(
    header: &PacketHeader,
    link: &Mutex<Link>,
    telemetry: &Mutex<LinkTelemetry>,
) {
    let acked = link.lock().await.on_incoming(header, Instant::now());
    let mut telemetry = telemetry.lock().await;
    telemetry.record_ack(header.ack, header.ack_bits);
    for message in &acked {
        telemetry.record_rtt(message.rtt);
    }
}

async fn handle_control(message: ControlMessage, link: &Mutex<Link>) -> Vec<Vec<u8>> {
    match message {
        ControlMessage::Pong { sent_at_ms } => {
            debug!("Pong after {} ms", now_millis().saturating_sub(sent_at_ms));
            Vec::new()
        }
        ControlMessage::Ping { sent_at_ms } => {
            let pong = ControlMessage::Pong { sent_at_ms };
            match pong.encode() {
                Ok(payload) => {
                    let (_, datagram) = link.lock().await.reliable_datagram(payload, Instant::now());
                    vec![datagram]
                }
                Err(e) => {
                    error!("Failed to encode pong: {}", e);
                    Vec::new()
                }
            }
        }
        ControlMessage::Leave => {
            warn!("Server closed the session");
            Vec::new()
        }
    }
}

async fn send_control(
    socket: &UdpSocket,
    link: &Mutex<Link>,
    telemetry: &Mutex<LinkTelemetry>,
    message: &ControlMessage,
    addr: SocketAddr,
) {
    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to encode {:?}: {}", message, e);
            return;
        }
    };
    let (_, datagram) = link.lock().await.reliable_datagram(payload, Instant::now());
    send_datagram(socket, telemetry, &datagram, addr).await;
}

/// Sends a complete datagram and books its packet sequence for loss tracking.
async fn send_datagram(
    socket: &UdpSocket,
    telemetry: &Mutex<LinkTelemetry>,
    datagram: &[u8],
    addr: SocketAddr,
) {
    match decode_header(datagram) {
        Ok((header, _)) => telemetry
            .lock()
            .await
            .record_sent(header.packet_seq, Instant::now()),
        Err(e) => warn!("Sending datagram without a header: {}", e),
    }
    if let Err(e) = socket.send_to(datagram, addr).await {
        warn!("Failed to send to {}: {}", addr, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_ok};

    async fn fake_server() -> (UdpSocket, ClientConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            server_addr: socket.local_addr().unwrap().to_string(),
            ..ClientConfig::default()
        };
        (socket, config)
    }

    struct Mirror {
        link: Mutex<Link>,
        sync: Mutex<ClientSync>,
        telemetry: Mutex<LinkTelemetry>,
        world: Mutex<ClientGameState>,
    }

    impl Mirror {
        fn new() -> Self {
            Self {
                link: Mutex::new(Link::new()),
                sync: Mutex::new(ClientSync::new()),
                telemetry: Mutex::new(LinkTelemetry::new(
                    Duration::from_secs(2),
                    Duration::from_millis(250),
                )),
                world: Mutex::new(ClientGameState::new(1)),
            }
        }

        async fn feed(&self, packet_seq: u16, payload: &[u8]) -> Vec<Vec<u8>> {
            let header = PacketHeader {
                packet_seq,
                ack: 0,
                ack_bits: 0,
            };
            let datagram = shared::packet::encode_datagram(&header, payload);
            handle_datagram(
                &datagram,
                &self.link,
                &self.sync,
                &self.telemetry,
                &self.world,
            )
            .await
        }
    }

    #[test]
    fn test_shutdown_handle_wakes_waiters() {
        let (tx, mut rx) = watch::channel(false);
        let handle = ShutdownHandle(Arc::new(tx));

        let mut changed = tokio_test::task::spawn(rx.changed());
        assert_pending!(changed.poll());

        handle.shutdown();
        assert!(changed.is_woken());
        assert_ready_ok!(changed.poll());
    }

    #[tokio::test]
    async fn test_unresolvable_server_fails() {
        let config = ClientConfig {
            server_addr: "not an address".to_string(),
            ..ClientConfig::default()
        };
        assert!(Client::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_inputs_are_tagged_ahead() {
        let (server, config) = fake_server().await;
        let client = Client::new(ClientConfig {
            player_id: 9,
            ..config
        })
        .await
        .unwrap();
        let shutdown = client.shutdown_handle();
        let task = tokio::spawn(async move {
            let _ = client.run().await;
        });

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut inputs = Vec::new();
        while inputs.len() < 3 {
            let received = server.recv_from(&mut buffer);
            let (len, _) = tokio::time::timeout(Duration::from_secs(2), received)
                .await
                .unwrap()
                .unwrap();
            let (header, payload) = decode_header(&buffer[..len]).unwrap();
            if let shared::ServerBound::Input(input) = shared::ServerBound::classify(payload) {
                inputs.push((header.packet_seq, input));
            }
        }

        assert_eq!(inputs[0].1.player_id, 9);
        assert_eq!(inputs[0].1.tick, 2);
        assert_eq!(inputs[1].1.tick, 3);
        assert_eq!(inputs[2].1.tick, 4);
        assert!(inputs.windows(2).all(|w| w[1].0 > w[0].0));

        shutdown.shutdown();
        task.await.unwrap();

        // leave goes out after the loops stop
        let mut saw_leave = false;
        while let Ok(Ok((len, _))) =
            tokio::time::timeout(Duration::from_millis(200), server.recv_from(&mut buffer)).await
        {
            let (_, payload) = decode_header(&buffer[..len]).unwrap();
            if let shared::ServerBound::Reliable { payload, .. } =
                shared::ServerBound::classify(payload)
            {
                if matches!(ControlMessage::decode(payload), Ok(ControlMessage::Leave)) {
                    saw_leave = true;
                }
            }
        }
        assert!(saw_leave);
    }

    #[tokio::test]
    async fn test_frame_updates_world_and_tick() {
        let (server, config) = fake_server().await;
        let client = Client::new(config).await.unwrap();
        let client_addr = client.local_addr().unwrap();
        let client_addr = SocketAddr::from(([127, 0, 0, 1], client_addr.port()));
        let world = client.world();
        let sync = client.sync();
        let shutdown = client.shutdown_handle();
        let task = tokio::spawn(async move {
            let _ = client.run().await;
        });

        let snapshot = Snapshot {
            players: vec![shared::PlayerState {
                id: 1,
                x: 4.0,
                y: 2.0,
                radius: 1.2,
            }],
            foods: Vec::new(),
        };
        let frame = shared::FramePacket {
            tick: 500,
            inputs: vec![(1, 0)],
            snapshot: snapshot.encode().unwrap(),
        };
        let mut link = Link::new();
        let payload = shared::packet::encode_frame(&frame).unwrap();
        let (_, datagram) = link.unreliable_datagram(&payload);
        server.send_to(&datagram, client_addr).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while world.lock().await.tick != 500 {
            assert!(tokio::time::Instant::now() < deadline, "frame never applied");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(sync.lock().await.local_tick() >= 500);
        assert_eq!(world.lock().await.my_player().map(|p| p.id), Some(1));

        shutdown.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_with_corrupt_snapshot_is_not_acked() {
        let mirror = Mirror::new();
        let frame = shared::FramePacket {
            tick: 12,
            inputs: Vec::new(),
            // claims one player but carries no player bytes
            snapshot: vec![1],
        };
        let payload = shared::packet::encode_frame(&frame).unwrap();
        assert!(mirror.feed(5, &payload).await.is_empty());

        assert_eq!(mirror.link.lock().await.receiver.build_ack_and_bits(), (0, 0));
        assert_eq!(mirror.world.lock().await.frames_applied(), 0);
        assert_eq!(mirror.sync.lock().await.local_tick(), 1);
    }

    #[tokio::test]
    async fn test_malformed_control_keeps_message_seq_free() {
        let mirror = Mirror::new();
        let truncated = shared::packet::encode_reliable_envelope(1, &[shared::control::MSG_PING]);
        assert!(mirror.feed(3, &truncated).await.is_empty());
        assert_eq!(mirror.link.lock().await.receiver.build_ack_and_bits(), (0, 0));

        let ping = ControlMessage::Ping { sent_at_ms: 8 }.encode().unwrap();
        let replies = mirror
            .feed(4, &shared::packet::encode_reliable_envelope(1, &ping))
            .await;
        assert_eq!(replies.len(), 1);
        let (header, _) = decode_header(&replies[0]).unwrap();
        assert_eq!((header.ack, header.ack_bits), (4, 0));
    }
}
