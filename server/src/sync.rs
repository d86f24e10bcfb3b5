//! Per-client delta synchronization
//!
//! Once per tick the world is captured into a [`SyncFrame`]. Every client's
//! message is then computed from that same frame against what that client was
//! last sent, and the sent values become the new baseline in the same call.
//! A client that has never been sent anything gets a full snapshot instead.

use crate::game::World;
use shared::{
    ClientId, EntityDiff, EntityId, EntityKind, EntitySnapshot, EntityState, Flag, FlagEvent,
    FullSnapshot, Packet, StateDiff,
};
use std::collections::HashMap;

/// One entity as captured at the end of a tick.
#[derive(Debug, Clone)]
pub struct FrameEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub state: EntityState,
    /// Removed during this or an earlier tick and about to be destroyed.
    pub removed: bool,
}

/// Immutable post-tick capture shared by every client's diff.
#[derive(Debug, Clone, Default)]
pub struct SyncFrame {
    pub tick: u64,
    pub entities: Vec<FrameEntity>,
    pub events: Vec<FlagEvent>,
}

impl SyncFrame {
    pub fn capture(world: &World, events: &[FlagEvent]) -> Self {
        let entities = world
            .entities()
            .iter()
            .filter(|entity| entity.is_active() || entity.is_removed())
            .map(|entity| FrameEntity {
                id: entity.id,
                kind: entity.kind(),
                state: entity.state(),
                removed: entity.is_removed(),
            })
            .collect();

        Self {
            tick: world.tick(),
            entities,
            events: events.to_vec(),
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&FrameEntity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    /// Flags raised on `id` after `after_tick`, in the order they were raised.
    pub fn flags_for(&self, id: EntityId, after_tick: u64) -> Vec<Flag> {
        self.events
            .iter()
            .filter(|event| event.entity == id && event.tick > after_tick)
            .map(|event| event.flag)
            .collect()
    }
}

/// What one client has been sent so far.
#[derive(Debug, Clone, Default)]
pub struct ClientSyncState {
    last_sent: HashMap<EntityId, EntityState>,
    /// Tick of the newest flags delivered per entity.
    last_sent_flags: HashMap<EntityId, u64>,
    /// Flags raised at or before this tick predate the client and are never sent.
    flags_floor: u64,
    snapshot_sent: bool,
    last_ack: u32,
    last_self_id: Option<EntityId>,
}

impl ClientSyncState {
    fn new(flags_floor: u64) -> Self {
        Self {
            flags_floor,
            ..Self::default()
        }
    }

    pub fn knows(&self, id: EntityId) -> bool {
        self.last_sent.contains_key(&id)
    }

    pub fn snapshot_sent(&self) -> bool {
        self.snapshot_sent
    }

    fn take_flags(&mut self, frame: &SyncFrame, id: EntityId) -> Vec<Flag> {
        let delivered = self
            .last_sent_flags
            .get(&id)
            .copied()
            .unwrap_or(0)
            .max(self.flags_floor);
        let flags = frame.flags_for(id, delivered);
        if !flags.is_empty() {
            self.last_sent_flags.insert(id, frame.tick);
        }
        flags
    }

    fn snapshot(&mut self, frame: &SyncFrame, ack: u32, self_id: Option<EntityId>) -> FullSnapshot {
        let mut entities = Vec::with_capacity(frame.entities.len());
        for entity in frame.entities.iter().filter(|entity| !entity.removed) {
            let flags = self.take_flags(frame, entity.id);
            self.last_sent.insert(entity.id, entity.state.clone());
            entities.push(EntitySnapshot {
                id: entity.id,
                kind: entity.kind,
                fields: entity.state.fields().to_vec(),
                flags,
            });
        }

        self.snapshot_sent = true;
        self.last_ack = ack;
        self.last_self_id = self_id;
        FullSnapshot {
            tick: frame.tick,
            ack,
            self_id,
            entities,
        }
    }

    fn diff(&mut self, frame: &SyncFrame, ack: u32, self_id: Option<EntityId>) -> Option<StateDiff> {
        let mut entities = Vec::new();
        let mut removed_ids = Vec::new();

        for entity in &frame.entities {
            // Never seen and already gone: nothing to tell this client.
            if entity.removed && !self.knows(entity.id) {
                continue;
            }

            let flags = self.take_flags(frame, entity.id);
            let diff = match self.last_sent.get_mut(&entity.id) {
                Some(previous) => {
                    let fields = entity.state.changes_since(previous);
                    *previous = entity.state.clone();
                    EntityDiff {
                        id: entity.id,
                        kind: None,
                        fields,
                        flags,
                    }
                }
                None => {
                    self.last_sent.insert(entity.id, entity.state.clone());
                    EntityDiff {
                        id: entity.id,
                        kind: Some(entity.kind),
                        fields: entity.state.fields().to_vec(),
                        flags,
                    }
                }
            };
            if !diff.is_empty() {
                entities.push(diff);
            }

            if entity.removed {
                self.last_sent.remove(&entity.id);
                self.last_sent_flags.remove(&entity.id);
                removed_ids.push(entity.id);
            }
        }

        if entities.is_empty()
            && removed_ids.is_empty()
            && ack == self.last_ack
            && self_id == self.last_self_id
        {
            return None;
        }

        self.last_ack = ack;
        self.last_self_id = self_id;
        Some(StateDiff {
            tick: frame.tick,
            ack,
            self_id,
            entities,
            removed_ids,
        })
    }

    fn forget(&mut self, id: EntityId) {
        self.last_sent.remove(&id);
        self.last_sent_flags.remove(&id);
    }
}

/// Sync records of every connected client.
#[derive(Debug, Default)]
pub struct DeltaSynchronizer {
    clients: HashMap<ClientId, ClientSyncState>,
}

impl DeltaSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a client. Flags raised up to `current_tick` are not
    /// delivered to it.
    pub fn add_client(&mut self, client: ClientId, current_tick: u64) {
        self.clients
            .insert(client, ClientSyncState::new(current_tick));
    }

    pub fn remove_client(&mut self, client: ClientId) -> bool {
        self.clients.remove(&client).is_some()
    }

    #[cfg(test)]
    pub fn has_client(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client(&self, client: ClientId) -> Option<&ClientSyncState> {
        self.clients.get(&client)
    }

    /// Computes the next message for `client` and records it as sent.
    ///
    /// Returns `None` for unknown clients and when nothing changed for this
    /// client since its last message.
    pub fn prepare(
        &mut self,
        client: ClientId,
        frame: &SyncFrame,
        ack: u32,
        self_id: Option<EntityId>,
    ) -> Option<Packet> {
        let state = self.clients.get_mut(&client)?;
        if !state.snapshot_sent {
            return Some(Packet::FullSnapshot(state.snapshot(frame, ack, self_id)));
        }
        state.diff(frame, ack, self_id).map(Packet::StateDiff)
    }

    /// Drops destroyed entities from every client's record.
    pub fn forget(&mut self, ids: &[EntityId]) {
        for state in self.clients.values_mut() {
            for id in ids {
                state.forget(*id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use shared::Field;

    fn world_with_coin() -> (World, EntityId) {
        let mut world = World::new(4000.0, 4000.0);
        let mut coin = Entity::coin(world.next_id(), 3, 120_000, 0);
        coin.place_at(500.0, 500.0);
        let id = world.insert(coin);
        (world, id)
    }

    fn frame(world: &World, events: &[FlagEvent]) -> SyncFrame {
        SyncFrame::capture(world, events)
    }

    fn expect_diff(packet: Option<Packet>) -> StateDiff {
        match packet {
            Some(Packet::StateDiff(diff)) => diff,
            other => panic!("expected a state diff, got {:?}", other),
        }
    }

    #[test]
    fn test_first_message_is_full_snapshot() {
        let (world, coin) = world_with_coin();
        let mut sync = DeltaSynchronizer::new();
        sync.add_client(1, 0);

        match sync.prepare(1, &frame(&world, &[]), 0, None) {
            Some(Packet::FullSnapshot(snapshot)) => {
                assert_eq!(snapshot.entities.len(), 1);
                assert_eq!(snapshot.entities[0].id, coin);
                assert_eq!(
                    snapshot.entities[0].fields.len(),
                    EntityKind::Coin.schema().len()
                );
            }
            other => panic!("expected a snapshot, got {:?}", other),
        }
        assert!(sync.client(1).unwrap().knows(coin));
    }

    #[test]
    fn test_unchanged_world_sends_nothing() {
        let (world, _) = world_with_coin();
        let mut sync = DeltaSynchronizer::new();
        sync.add_client(1, 0);
        let frame = frame(&world, &[]);

        assert!(sync.prepare(1, &frame, 0, None).is_some());
        assert!(sync.prepare(1, &frame, 0, None).is_none());
        // A new ack alone is worth a message.
        let diff = expect_diff(sync.prepare(1, &frame, 4, None));
        assert!(diff.entities.is_empty());
        assert_eq!(diff.ack, 4);
    }

    #[test]
    fn test_only_changed_fields_are_sent() {
        let (mut world, coin) = world_with_coin();
        let mut sync = DeltaSynchronizer::new();
        sync.add_client(1, 0);
        sync.prepare(1, &frame(&world, &[]), 0, None);

        world.get_mut(coin).unwrap().shape.x = 620.0;
        let diff = expect_diff(sync.prepare(1, &frame(&world, &[]), 0, None));

        let entity = diff.entity(coin).unwrap();
        assert_eq!(entity.kind, None);
        assert_eq!(entity.fields.len(), 1);
        assert_eq!(entity.fields[0].field, Field::X);
    }

    #[test]
    fn test_new_entity_is_sent_in_full_with_kind() {
        let (mut world, _) = world_with_coin();
        let mut sync = DeltaSynchronizer::new();
        sync.add_client(1, 0);
        sync.prepare(1, &frame(&world, &[]), 0, None);

        let mut spike = Entity::ice_spike(world.next_id(), 0);
        spike.place_at(900.0, 900.0);
        let spike = world.insert(spike);

        let diff = expect_diff(sync.prepare(1, &frame(&world, &[]), 0, None));
        let entity = diff.entity(spike).unwrap();
        assert_eq!(entity.kind, Some(EntityKind::IceSpike));
        assert_eq!(entity.fields.len(), 3);
    }

    #[test]
    fn test_flags_are_delivered_once_per_client() {
        let (world, coin) = world_with_coin();
        let mut sync = DeltaSynchronizer::new();
        sync.add_client(1, 0);
        sync.add_client(2, 0);
        let quiet = frame(&world, &[]);
        sync.prepare(1, &quiet, 0, None);
        sync.prepare(2, &quiet, 0, None);

        let events = [FlagEvent {
            tick: world.tick() + 1,
            entity: coin,
            flag: Flag::Damaged,
        }];
        let mut flagged = frame(&world, &events);
        flagged.tick += 1;

        for client in [1, 2] {
            let diff = expect_diff(sync.prepare(client, &flagged, 0, None));
            assert_eq!(diff.entity(coin).unwrap().flags, vec![Flag::Damaged]);
            assert!(diff.entity(coin).unwrap().fields.is_empty());
            assert!(sync.prepare(client, &flagged, 0, None).is_none());
        }
    }

    #[test]
    fn test_removal_is_sent_once_then_forgotten() {
        let (mut world, coin) = world_with_coin();
        let mut sync = DeltaSynchronizer::new();
        sync.add_client(1, 0);
        sync.prepare(1, &frame(&world, &[]), 0, None);

        world.get_mut(coin).unwrap().remove();
        let removed = frame(&world, &[]);
        let diff = expect_diff(sync.prepare(1, &removed, 0, None));
        assert_eq!(diff.removed_ids, vec![coin]);
        assert!(!sync.client(1).unwrap().knows(coin));

        // A client that never saw the coin is not told about its removal.
        sync.add_client(2, 0);
        match sync.prepare(2, &removed, 0, None) {
            Some(Packet::FullSnapshot(snapshot)) => assert!(snapshot.entities.is_empty()),
            other => panic!("expected a snapshot, got {:?}", other),
        }

        let destroyed = world.destroy_removed();
        sync.forget(&destroyed);
        assert!(sync.prepare(1, &frame(&world, &[]), 0, None).is_none());
    }

    #[test]
    fn test_flags_before_joining_are_not_delivered() {
        let (world, coin) = world_with_coin();
        let events = [FlagEvent {
            tick: 5,
            entity: coin,
            flag: Flag::GetCoin,
        }];
        let mut frame = frame(&world, &events);
        frame.tick = 5;

        let mut sync = DeltaSynchronizer::new();
        sync.add_client(1, 5);
        match sync.prepare(1, &frame, 0, None) {
            Some(Packet::FullSnapshot(snapshot)) => assert!(snapshot.entities[0].flags.is_empty()),
            other => panic!("expected a snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_client_gets_nothing() {
        let (world, _) = world_with_coin();
        let mut sync = DeltaSynchronizer::new();
        assert!(sync.prepare(9, &frame(&world, &[]), 0, None).is_none());
        sync.add_client(9, 0);
        assert!(sync.remove_client(9));
        assert_eq!(sync.client_count(), 0);
    }
}
