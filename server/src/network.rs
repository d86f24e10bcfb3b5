//! Server network layer handling WebSocket connections and the tick loop

use crate::config::GameConfig;
use crate::error::ServerError;
use crate::simulation::Simulation;
use crate::stats::StatsSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientId, Packet, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Frames buffered per connection before the client counts as stalled.
const OUTBOUND_BUFFER: usize = 64;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        addr: SocketAddr,
        sender: mpsc::Sender<Vec<u8>>,
    },
    PacketReceived {
        addr: SocketAddr,
        packet: Packet,
    },
    ConnectionClosed {
        addr: SocketAddr,
    },
}

/// An open WebSocket and the client it joined as, if any.
#[derive(Debug)]
struct Connection {
    sender: mpsc::Sender<Vec<u8>>,
    client: Option<ClientId>,
}

/// Main server coordinating connections and the game simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    simulation: Simulation,
    connections: HashMap<SocketAddr, Connection>,
    addrs: HashMap<ClientId, SocketAddr>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: GameConfig,
        stats: Arc<dyn StatsSink>,
    ) -> Result<Self, ServerError> {
        let simulation = Simulation::new(config, stats)?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            simulation,
            connections: HashMap::new(),
            addrs: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Spawns task that accepts incoming TCP connections
    fn spawn_acceptor(&self, listener: TcpListener) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(stream, addr, server_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
                if server_tx.is_closed() {
                    break;
                }
            }
        });
    }

    /// Encodes and queues a packet for one connection
    ///
    /// Never waits: a connection whose buffer is full or closed is reported
    /// as failed and left for the caller to drop.
    fn send_packet(&self, addr: SocketAddr, packet: &Packet) -> bool {
        let Some(connection) = self.connections.get(&addr) else {
            return false;
        };
        let bytes = match packet.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode packet for {}: {}", addr, e);
                return false;
            }
        };
        match connection.sender.try_send(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send to {}: {}", addr, e);
                false
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected { addr, sender } => {
                debug!("Connection opened from {}", addr);
                self.connections.insert(
                    addr,
                    Connection {
                        sender,
                        client: None,
                    },
                );
            }
            ServerMessage::PacketReceived { addr, packet } => {
                self.handle_packet(addr, packet);
            }
            ServerMessage::ConnectionClosed { addr } => {
                self.drop_connection(addr);
            }
        }
    }

    /// Processes one packet from a connection
    fn handle_packet(&mut self, addr: SocketAddr, packet: Packet) {
        let Some(current) = self.connections.get(&addr).map(|c| c.client) else {
            warn!("Packet from unknown connection {}", addr);
            return;
        };

        match packet {
            Packet::Connect {
                client_version,
                name,
                account_id,
            } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if let Some(existing) = current {
                    info!("Replacing client {} on {}", existing, addr);
                    self.leave(addr, existing);
                }

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        addr,
                        &Packet::Disconnected {
                            reason: format!(
                                "Protocol version {} is not supported, expected {}",
                                client_version, PROTOCOL_VERSION
                            ),
                        },
                    );
                    return;
                }

                match self.simulation.connect(&name, account_id) {
                    Some(client_id) => {
                        if let Some(connection) = self.connections.get_mut(&addr) {
                            connection.client = Some(client_id);
                        }
                        self.addrs.insert(client_id, addr);
                        let remove_transition_ms = self.simulation.config().remove_transition_ms;
                        self.send_packet(
                            addr,
                            &Packet::Connected {
                                client_id,
                                remove_transition_ms,
                            },
                        );
                    }
                    None => {
                        info!("Rejected {}: server full", addr);
                        self.send_packet(
                            addr,
                            &Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                        );
                    }
                }
            }

            Packet::Input(input) => {
                if let Some(client_id) = current {
                    self.simulation.queue_input(client_id, input);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = current {
                    self.leave(addr, client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Takes a client out of the game but keeps its connection open
    fn leave(&mut self, addr: SocketAddr, client_id: ClientId) {
        if let Some(connection) = self.connections.get_mut(&addr) {
            connection.client = None;
        }
        self.addrs.remove(&client_id);
        self.simulation.disconnect(client_id);
    }

    /// Forgets a connection; dropping its sender ends the writer task
    fn drop_connection(&mut self, addr: SocketAddr) {
        if let Some(connection) = self.connections.remove(&addr) {
            if let Some(client_id) = connection.client {
                self.addrs.remove(&client_id);
                self.simulation.disconnect(client_id);
            }
            debug!("Connection from {} closed", addr);
        }
    }

    /// Runs one simulation tick and delivers every client's message
    fn tick(&mut self, dt_ms: f64) {
        let outgoing = self.simulation.run_tick(dt_ms);

        let mut failed = Vec::new();
        for (client_id, packet) in outgoing {
            let Some(addr) = self.addrs.get(&client_id).copied() else {
                continue;
            };
            if !self.send_packet(addr, &packet) {
                failed.push(addr);
            }
        }

        for addr in failed {
            info!("Dropping stalled connection {}", addr);
            self.drop_connection(addr);
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), ServerError> {
        if let Some(listener) = self.listener.take() {
            self.spawn_acceptor(listener);
        }

        let mut tick_interval = interval(self.simulation.config().tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let dt_ms = self.simulation.config().tick_ms();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick(dt_ms);
                },
            }
        }

        Ok(())
    }
}

/// Owns one WebSocket: a writer task drains the outbound channel while this
/// task forwards decoded inbound packets to the main loop.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_BUFFER);

    if server_tx
        .send(ServerMessage::Connected {
            addr,
            sender: msg_tx,
        })
        .is_err()
    {
        return;
    }

    let sender_task = tokio::spawn(async move {
        while let Some(bytes) = msg_rx.recv().await {
            if ws_sender.send(Message::Binary(bytes)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Binary(data))) => match Packet::from_bytes(&data) {
                Ok(packet) => {
                    if server_tx
                        .send(ServerMessage::PacketReceived { addr, packet })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => debug!("Invalid packet from {}: {}", addr, e),
            },
            Some(Ok(Message::Close(_))) | None => {
                debug!("Client {} closed the connection", addr);
                break;
            }
            Some(Err(e)) => {
                warn!("WebSocket error for {}: {}", addr, e);
                break;
            }
            Some(Ok(_)) => {}
        }
    }

    let _ = server_tx.send(ServerMessage::ConnectionClosed { addr });
    sender_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MemoryStatsSink;
    use std::time::Duration;
    use tokio::time::timeout;
    use shared::EntityKind;
    use tokio_test::assert_ok;
    use tokio_tungstenite::connect_async;

    fn test_config() -> GameConfig {
        let mut config = GameConfig::default();
        config.coins.count = 3;
        config.ice_spikes.count = 1;
        config.seed = Some(11);
        config
    }

    async fn start_server(config: GameConfig) -> SocketAddr {
        let mut server = assert_ok!(
            Server::new("127.0.0.1:0", config, Arc::new(MemoryStatsSink::new())).await
        );
        let addr = server.local_addr();
        tokio::spawn(async move { server.run().await });
        addr
    }

    async fn next_packet<S>(stream: &mut S) -> Packet
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let message = timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("timed out waiting for a packet")
                .expect("connection closed")
                .unwrap();
            if let Message::Binary(data) = message {
                return Packet::from_bytes(&data).unwrap();
            }
        }
    }

    #[test]
    fn test_server_message_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Disconnect,
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert!(matches!(packet, Packet::Disconnect));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    fn join(server: &mut Server, addr: SocketAddr, sender: mpsc::Sender<Vec<u8>>, name: &str) {
        server.handle_message(ServerMessage::Connected { addr, sender });
        server.handle_message(ServerMessage::PacketReceived {
            addr,
            packet: Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: name.to_string(),
                account_id: None,
            },
        });
    }

    fn drain(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            packets.push(Packet::from_bytes(&bytes).unwrap());
        }
        packets
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_that_client() {
        let mut server = assert_ok!(
            Server::new("127.0.0.1:0", test_config(), Arc::new(MemoryStatsSink::new())).await
        );
        let stalled: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        let healthy: SocketAddr = "127.0.0.1:40002".parse().unwrap();

        // The Connected reply fills the single slot and nobody drains it.
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        let (healthy_tx, mut healthy_rx) = mpsc::channel(OUTBOUND_BUFFER);
        join(&mut server, stalled, stalled_tx, "stalled");
        join(&mut server, healthy, healthy_tx, "healthy");
        assert_eq!(server.simulation().clients().len(), 2);

        server.tick(33.0);
        assert!(!server.connections.contains_key(&stalled));
        assert!(server.connections.contains_key(&healthy));
        assert_eq!(server.addrs.len(), 1);
        assert_eq!(server.simulation().clients().len(), 1);

        let packets = drain(&mut healthy_rx);
        assert!(matches!(packets[0], Packet::Connected { .. }));
        let Packet::FullSnapshot(snapshot) = &packets[1] else {
            panic!("expected a snapshot, got {:?}", packets[1]);
        };
        let other_player = snapshot
            .entities
            .iter()
            .find(|entity| entity.kind == EntityKind::Player && Some(entity.id) != snapshot.self_id)
            .map(|entity| entity.id)
            .expect("both players spawned");

        server.tick(33.0);
        let packets = drain(&mut healthy_rx);
        match packets.as_slice() {
            [Packet::StateDiff(diff)] => assert_eq!(diff.removed_ids, vec![other_player]),
            other => panic!("expected one diff, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_queue_drops_only_that_client() {
        let mut server = assert_ok!(
            Server::new("127.0.0.1:0", test_config(), Arc::new(MemoryStatsSink::new())).await
        );
        let gone: SocketAddr = "127.0.0.1:40003".parse().unwrap();
        let healthy: SocketAddr = "127.0.0.1:40004".parse().unwrap();

        let (gone_tx, gone_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (healthy_tx, mut healthy_rx) = mpsc::channel(OUTBOUND_BUFFER);
        join(&mut server, gone, gone_tx, "gone");
        join(&mut server, healthy, healthy_tx, "healthy");
        drop(gone_rx);

        server.tick(33.0);
        assert!(!server.connections.contains_key(&gone));
        assert_eq!(server.simulation().clients().len(), 1);
        assert!(drain(&mut healthy_rx)
            .iter()
            .any(|packet| matches!(packet, Packet::FullSnapshot(_))));
    }

    #[tokio::test]
    async fn test_client_joins_and_receives_snapshot() {
        let addr = start_server(test_config()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: "tester".to_string(),
            account_id: None,
        };
        ws.send(Message::Binary(connect.to_bytes().unwrap()))
            .await
            .unwrap();

        match next_packet(&mut ws).await {
            Packet::Connected {
                client_id,
                remove_transition_ms,
            } => {
                assert_eq!(client_id, 1);
                assert_eq!(remove_transition_ms, 1000);
            }
            other => panic!("expected Connected, got {:?}", other),
        }

        match next_packet(&mut ws).await {
            Packet::FullSnapshot(snapshot) => {
                // Three coins, one spike and the new player.
                assert_eq!(snapshot.entities.len(), 5);
                assert!(snapshot.self_id.is_some());
            }
            other => panic!("expected a snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let addr = start_server(test_config()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION + 1,
            name: "old".to_string(),
            account_id: None,
        };
        ws.send(Message::Binary(connect.to_bytes().unwrap()))
            .await
            .unwrap();

        assert!(matches!(
            next_packet(&mut ws).await,
            Packet::Disconnected { .. }
        ));
    }
}
