use crate::error::ClientError;
use crate::game::ClientGameState;
use crate::input::BotController;
use crate::mirror::Effect;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientId, Packet, PROTOCOL_VERSION};
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Length of one client frame in milliseconds.
pub const FRAME_MS: u64 = 16;

/// Headless WebSocket client driven by a [`BotController`].
pub struct Client {
    server_url: String,
    name: String,
    account_id: Option<u64>,
    client_id: Option<ClientId>,
    connected: bool,

    game_state: ClientGameState,
    bot: BotController,
    frames: u64,
}

impl Client {
    pub fn new(server_url: &str, name: &str, account_id: Option<u64>) -> Self {
        Self {
            server_url: server_url.to_string(),
            name: name.to_string(),
            account_id,
            client_id: None,
            connected: false,
            game_state: ClientGameState::new(),
            bot: BotController::new(),
            frames: 0,
        }
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    /// Applies one server packet. A rejection ends the session with an error.
    pub fn handle_packet(&mut self, packet: Packet) -> Result<Vec<Effect>, ClientError> {
        match packet {
            Packet::Connected {
                client_id,
                remove_transition_ms,
            } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.connected = true;
                self.game_state.set_remove_transition(remove_transition_ms);
                Ok(Vec::new())
            }

            Packet::FullSnapshot(snapshot) => {
                debug!(
                    "Snapshot at tick {} with {} entities",
                    snapshot.tick,
                    snapshot.entities.len()
                );
                Ok(self.game_state.apply_snapshot(&snapshot))
            }

            Packet::StateDiff(diff) => Ok(self.game_state.apply_diff(&diff)),

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
                Err(ClientError::Rejected(reason))
            }

            other => {
                warn!("Unexpected packet type: {:?}", other);
                Ok(Vec::new())
            }
        }
    }

    /// Connects, plays until `duration` elapses (or forever) and says goodbye.
    pub async fn run(&mut self, duration: Option<Duration>) -> Result<(), ClientError> {
        info!("Connecting to {} as {}", self.server_url, self.name);
        let (ws_stream, _) = connect_async(self.server_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: self.name.clone(),
            account_id: self.account_id,
        };
        write.send(Message::Binary(connect.to_bytes()?)).await?;

        let mut frame = interval(Duration::from_millis(FRAME_MS));
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let deadline = async move {
            match duration {
                Some(duration) => sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let result = 'session: loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Binary(data))) => match Packet::from_bytes(&data) {
                        Ok(packet) => match self.handle_packet(packet) {
                            Ok(effects) => log_effects(&effects),
                            Err(e) => break 'session Err(e),
                        },
                        Err(e) => warn!("Dropping malformed packet: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => break 'session Err(ClientError::ConnectionClosed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break 'session Err(e.into()),
                },

                _ = frame.tick() => {
                    if !self.connected {
                        continue;
                    }
                    for input in self.bot.update(&self.game_state) {
                        self.game_state.predict(&input);
                        let bytes = match Packet::Input(input).to_bytes() {
                            Ok(bytes) => bytes,
                            Err(e) => break 'session Err(e.into()),
                        };
                        if let Err(e) = write.send(Message::Binary(bytes)).await {
                            break 'session Err(e.into());
                        }
                    }

                    let dropped = self.game_state.update(FRAME_MS as f64, self.bot.sword_held());
                    if !dropped.is_empty() {
                        debug!("Dropped mirrors {:?}", dropped);
                    }

                    self.frames += 1;
                    if self.frames % 60 == 0 {
                        debug!(
                            "Frame {}: tick {:?}, ack {}, {} mirrors, {} pending predictions",
                            self.frames,
                            self.game_state.last_tick(),
                            self.game_state.ack(),
                            self.game_state.len(),
                            self.game_state.pending_predictions()
                        );
                    }
                },

                _ = &mut deadline => break 'session Ok(()),
            }
        };

        if self.connected {
            if let Ok(bytes) = Packet::Disconnect.to_bytes() {
                let _ = write.send(Message::Binary(bytes)).await;
            }
            let _ = write.close().await;
            self.connected = false;
        }

        result
    }
}

fn log_effects(effects: &[Effect]) {
    for effect in effects {
        debug!("Effect: {:?}", effect);
    }
}
