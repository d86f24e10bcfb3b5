//! Client roster and input queuing for the simulation
//!
//! This module tracks everyone taking part in the game, including:
//! - Client admission against the configured capacity
//! - The player entity each client currently controls, if any
//! - Input buffering and a chronological order across all clients
//! - Acknowledgement of processed inputs for client-side prediction
//!
//! Connections themselves belong to the network layer. A client here is only
//! an id, a display name, an optional account and its queued inputs.

use log::info;
use shared::{ClientId, EntityId, InputState};
use std::collections::HashMap;

/// A participant in the game and its buffered input
///
/// Each client maintains:
/// - Identity (server-assigned id, display name, optional account)
/// - The entity it controls while alive
/// - Input acknowledgement tracking for prediction
/// - Buffered inputs waiting for the next tick
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    pub name: String,
    /// Account stats are recorded under; guests have none
    pub account_id: Option<u64>,
    /// Player entity controlled by this client while it is alive
    pub entity: Option<EntityId>,
    /// Highest input sequence number we've processed
    pub last_processed_input: u32,
    /// Buffered inputs waiting to be processed
    pub pending_inputs: Vec<InputState>,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>, account_id: Option<u64>) -> Self {
        Self {
            id,
            name: name.into(),
            account_id,
            entity: None,
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Adds a new input to the client's pending queue
    ///
    /// Inputs are kept in sequence order. Anything at or below the last
    /// processed sequence is a duplicate and is dropped.
    pub fn add_input(&mut self, input: InputState) -> bool {
        if input.sequence <= self.last_processed_input
            || self
                .pending_inputs
                .iter()
                .any(|pending| pending.sequence == input.sequence)
        {
            return false;
        }
        self.pending_inputs.push(input);
        self.pending_inputs.sort_by_key(|i| i.sequence);
        true
    }
}

/// Manages all clients and their input processing
///
/// The ClientManager enforces the capacity limit and provides one
/// deterministic order for inputs across all clients, so that the same queued
/// inputs always produce the same tick.
#[derive(Debug)]
pub struct ClientManager {
    /// Clients indexed by their unique ID
    clients: HashMap<ClientId, Client>,
    /// Next available client ID; ids are never reused
    next_client_id: ClientId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each admitted client.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Attempts to admit a new client
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity.
    pub fn add_client(&mut self, name: &str, account_id: Option<u64>) -> Option<ClientId> {
        if self.is_full() {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} joined as {:?}", client_id, name);
        self.clients
            .insert(client_id, Client::new(client_id, name, account_id));

        Some(client_id)
    }

    /// Removes a client and hands back its final record
    pub fn remove_client(&mut self, client_id: &ClientId) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} left", client.id);
        Some(client)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Finds the client controlling the given entity
    #[cfg(test)]
    pub fn find_client_by_entity(&self, entity: EntityId) -> Option<ClientId> {
        self.clients
            .values()
            .find(|client| client.entity == Some(entity))
            .map(|client| client.id)
    }

    /// Adds an input to a specific client's pending queue
    ///
    /// Returns false if the client ID is unknown or the input is a duplicate.
    pub fn add_input(&mut self, client_id: ClientId, input: InputState) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => client.add_input(input),
            None => false,
        }
    }

    /// Gets all unprocessed inputs in processing order
    ///
    /// Inputs are ordered by client timestamp; ties are broken by client id
    /// and then by sequence, so the order never depends on map iteration.
    pub fn get_chronological_inputs(&self) -> Vec<(ClientId, InputState)> {
        let mut all_inputs: Vec<(ClientId, InputState)> = Vec::new();

        for (client_id, client) in &self.clients {
            for input in &client.pending_inputs {
                if input.sequence > client.last_processed_input {
                    all_inputs.push((*client_id, input.clone()));
                }
            }
        }

        all_inputs.sort_by_key(|(client_id, input)| (input.timestamp, *client_id, input.sequence));
        all_inputs
    }

    /// Marks an input sequence as processed for a specific client
    ///
    /// The highest processed sequence is echoed back to the client as `ack`,
    /// which lets it drop predictions the server has confirmed.
    pub fn mark_input_processed(&mut self, client_id: ClientId, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    /// Removes inputs that have been processed from all client buffers
    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            let last = client.last_processed_input;
            client.pending_inputs.retain(|input| input.sequence > last);
        }
    }

    pub fn last_processed_input(&self, client_id: ClientId) -> u32 {
        self.clients
            .get(&client_id)
            .map(|client| client.last_processed_input)
            .unwrap_or(0)
    }

    /// All client ids in ascending order
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
