//! The authoritative game session
//!
//! [`Simulation`] owns the world and everything around it: who is connected,
//! which entity each client controls, what each client has been sent and where
//! finished games are reported. Outside callers only queue work; the world
//! changes inside [`Simulation::run_tick`] and nowhere else.

use crate::client_manager::ClientManager;
use crate::config::GameConfig;
use crate::entity::LifeEnded;
use crate::error::ConfigError;
use crate::game::{EntityCommand, World};
use crate::lifecycle::{LifecycleManager, SpawnKind, SpawnRequest};
use crate::stats::{GameRecord, StatsSink};
use crate::sync::{DeltaSynchronizer, SyncFrame};
use log::{debug, info};
use shared::{ClientId, ClientInput, EntityId, InputState, Packet};
use std::collections::HashMap;
use std::sync::Arc;

/// Roster changes waiting for the next tick.
#[derive(Debug, Clone, PartialEq)]
enum SessionCommand {
    Join { client: ClientId },
    Leave { client: ClientId, entity: Option<EntityId> },
}

/// Who a player entity belongs to, kept until its life is accounted for.
#[derive(Debug, Clone, Copy)]
struct Owner {
    client: ClientId,
    account_id: Option<u64>,
}

pub struct Simulation {
    config: GameConfig,
    world: World,
    lifecycle: LifecycleManager,
    sync: DeltaSynchronizer,
    clients: ClientManager,
    stats: Arc<dyn StatsSink>,
    commands: Vec<SessionCommand>,
    owners: HashMap<EntityId, Owner>,
}

impl Simulation {
    /// Validates the config and fills the world with its initial entities.
    pub fn new(config: GameConfig, stats: Arc<dyn StatsSink>) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut world = World::from_config(&config);
        let mut lifecycle = LifecycleManager::new(&config);
        let spawned = lifecycle.populate(&mut world);
        info!(
            "World {}x{} populated with {} entities",
            config.world_width,
            config.world_height,
            spawned.len()
        );

        Ok(Self {
            clients: ClientManager::new(config.max_clients),
            config,
            world,
            lifecycle,
            sync: DeltaSynchronizer::new(),
            stats,
            commands: Vec::new(),
            owners: HashMap::new(),
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn sync(&self) -> &DeltaSynchronizer {
        &self.sync
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    /// Entity currently controlled by `client`, if it is alive.
    pub fn entity_of(&self, client: ClientId) -> Option<EntityId> {
        self.clients.get(client).and_then(|client| client.entity)
    }

    /// Admits a client. Its player spawns during the next tick.
    pub fn connect(&mut self, name: &str, account_id: Option<u64>) -> Option<ClientId> {
        let client = self.clients.add_client(name, account_id)?;
        self.sync.add_client(client, self.world.tick());
        self.commands.push(SessionCommand::Join { client });
        Some(client)
    }

    /// Drops a client. Its player is removed during the next tick.
    pub fn disconnect(&mut self, client: ClientId) -> bool {
        let Some(record) = self.clients.remove_client(&client) else {
            return false;
        };
        self.sync.remove_client(client);
        self.commands.push(SessionCommand::Leave {
            client,
            entity: record.entity,
        });
        true
    }

    pub fn queue_input(&mut self, client: ClientId, input: InputState) -> bool {
        self.clients.add_input(client, input)
    }

    /// Advances the game by one tick and returns every client's message.
    pub fn run_tick(&mut self, dt_ms: f64) -> Vec<(ClientId, Packet)> {
        let mut entity_commands = Vec::new();

        for command in std::mem::take(&mut self.commands) {
            match command {
                SessionCommand::Join { client } => self.request_player(client),
                SessionCommand::Leave { client, entity } => {
                    self.lifecycle.cancel_for_owner(client);
                    if let Some(entity) = entity {
                        entity_commands.push(EntityCommand::Remove { entity });
                    }
                }
            }
        }

        for (client, state) in self.clients.get_chronological_inputs() {
            match state.input {
                ClientInput::Respawn => self.request_player(client),
                input => {
                    if let Some(entity) = self.entity_of(client) {
                        entity_commands.push(EntityCommand::Input { entity, input });
                    }
                }
            }
            self.clients.mark_input_processed(client, state.sequence);
        }
        self.clients.cleanup_processed_inputs();

        let output = self.world.step(entity_commands, &mut self.lifecycle, dt_ms);

        for spawned in &output.spawned {
            let Some(owner) = spawned.owner else {
                continue;
            };
            match self.clients.get_mut(owner) {
                Some(client) => {
                    client.entity = Some(spawned.id);
                    self.owners.insert(
                        spawned.id,
                        Owner {
                            client: owner,
                            account_id: client.account_id,
                        },
                    );
                }
                None => {
                    // Owner left after the spawn was placed.
                    if let Some(entity) = self.world.get_mut(spawned.id) {
                        entity.remove();
                    }
                }
            }
        }

        for life in &output.lives_ended {
            self.end_life(life);
        }

        let frame = SyncFrame::capture(&self.world, &output.events);
        let mut outgoing = Vec::new();
        for client in self.clients.client_ids() {
            let ack = self.clients.last_processed_input(client);
            let self_id = self.entity_of(client);
            if let Some(packet) = self.sync.prepare(client, &frame, ack, self_id) {
                outgoing.push((client, packet));
            }
        }

        let destroyed = self.world.destroy_removed();
        self.sync.forget(&destroyed);

        if output.tick % 60 == 0 {
            debug!(
                "Tick {}: {} clients, {} entities, {} collisions, {} pending spawns",
                output.tick,
                self.clients.len(),
                self.world.len(),
                output.collisions,
                self.lifecycle.pending()
            );
        }

        outgoing
    }

    fn request_player(&mut self, client: ClientId) {
        let Some(record) = self.clients.get(client) else {
            return;
        };
        if record.entity.is_some() || self.lifecycle.has_pending_for(client) {
            return;
        }
        let name = record.name.clone();
        self.lifecycle
            .request(SpawnRequest::random(SpawnKind::Player { name }).owned_by(client));
    }

    fn end_life(&mut self, life: &LifeEnded) {
        let Some(owner) = self.owners.remove(&life.entity) else {
            return;
        };
        if let Some(client) = self.clients.get_mut(owner.client) {
            if client.entity == Some(life.entity) {
                client.entity = None;
            }
        }
        if let Some(account_id) = owner.account_id {
            self.stats
                .record_game(GameRecord::from_life(account_id, life));
        }
    }
}
