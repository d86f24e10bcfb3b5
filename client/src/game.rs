//! Client-side reconciliation of server state
//!
//! [`ClientGameState`] turns snapshots and diffs into [`Mirror`]s, keeps the
//! self entity's aim predicted until the server acknowledges it, and delays
//! dropping removed mirrors until their fade-out has played.

use crate::mirror::{Effect, Mirror, RenderEntity};
use log::{debug, warn};
use shared::schema::validate_update;
use shared::{
    ClientInput, EntityId, EntityKind, Field, FieldUpdate, Flag, FullSnapshot, InputState,
    StateDiff, REMOVE_TRANSITION_MS,
};
use std::collections::BTreeMap;

/// Aim input sent to the server but not yet acknowledged.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingAngle {
    sequence: u32,
    angle: f64,
}

pub struct ClientGameState {
    mirrors: BTreeMap<EntityId, Mirror>,
    self_id: Option<EntityId>,
    last_tick: Option<u64>,
    ack: u32,
    now_ms: u64,
    remove_transition_ms: u64,
    pending_angles: Vec<PendingAngle>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::with_remove_transition(REMOVE_TRANSITION_MS)
    }

    pub fn with_remove_transition(remove_transition_ms: u64) -> Self {
        Self {
            mirrors: BTreeMap::new(),
            self_id: None,
            last_tick: None,
            ack: 0,
            now_ms: 0,
            remove_transition_ms,
            pending_angles: Vec::new(),
        }
    }

    pub fn set_remove_transition(&mut self, remove_transition_ms: u64) {
        self.remove_transition_ms = remove_transition_ms;
    }

    pub fn self_id(&self) -> Option<EntityId> {
        self.self_id
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    pub fn ack(&self) -> u32 {
        self.ack
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn has_snapshot(&self) -> bool {
        self.last_tick.is_some()
    }

    pub fn mirror(&self, id: EntityId) -> Option<&Mirror> {
        self.mirrors.get(&id)
    }

    pub fn self_mirror(&self) -> Option<&Mirror> {
        self.self_id.and_then(|id| self.mirrors.get(&id))
    }

    pub fn mirrors(&self) -> impl Iterator<Item = &Mirror> {
        self.mirrors.values()
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn pending_predictions(&self) -> usize {
        self.pending_angles.len()
    }

    /// Replaces every mirror with the snapshot's entities.
    pub fn apply_snapshot(&mut self, snapshot: &FullSnapshot) -> Vec<Effect> {
        if self.is_stale(snapshot.tick) {
            debug!("Dropping stale snapshot for tick {}", snapshot.tick);
            return Vec::new();
        }

        for mirror in self.mirrors.values_mut() {
            mirror.cancel_animations();
        }
        self.mirrors.clear();

        self.last_tick = Some(snapshot.tick);
        self.self_id = snapshot.self_id;
        self.acknowledge(snapshot.ack);

        let mut effects = Vec::new();
        for entity in &snapshot.entities {
            effects.extend(self.create_mirror(entity.id, entity.kind, &entity.fields, &entity.flags));
        }
        self.refresh_self_angle();
        effects
    }

    /// Applies one incremental update. Stale or repeated ticks are ignored
    /// whole, so a duplicated diff changes nothing.
    pub fn apply_diff(&mut self, diff: &StateDiff) -> Vec<Effect> {
        if self.is_stale(diff.tick) {
            debug!("Dropping stale diff for tick {}", diff.tick);
            return Vec::new();
        }
        self.last_tick = Some(diff.tick);
        self.acknowledge(diff.ack);

        if self.self_id != diff.self_id {
            if let Some(old) = self.self_id.and_then(|id| self.mirrors.get_mut(&id)) {
                old.set_is_self(false);
            }
            if let Some(new) = diff.self_id.and_then(|id| self.mirrors.get_mut(&id)) {
                new.set_is_self(true);
            }
            self.self_id = diff.self_id;
        }

        let mut effects = Vec::new();
        for entity in &diff.entities {
            match (self.mirrors.contains_key(&entity.id), entity.kind) {
                (true, _) => effects.extend(self.update_mirror(entity.id, &entity.fields, &entity.flags)),
                (false, Some(kind)) => {
                    effects.extend(self.create_mirror(entity.id, kind, &entity.fields, &entity.flags))
                }
                (false, None) => {
                    warn!("Diff for unknown entity {} without a kind, skipping", entity.id);
                }
            }
        }

        for id in &diff.removed_ids {
            if let Some(mirror) = self.mirrors.get_mut(id) {
                mirror.begin_removal(self.now_ms, self.remove_transition_ms);
            }
        }

        self.refresh_self_angle();
        effects
    }

    /// Applies the local part of an input before the server has seen it.
    pub fn predict(&mut self, input: &InputState) {
        let ClientInput::Angle(angle) = input.input else {
            return;
        };
        self.pending_angles.push(PendingAngle {
            sequence: input.sequence,
            angle,
        });
        if let Some(mirror) = self.self_id.and_then(|id| self.mirrors.get_mut(&id)) {
            mirror.set_predicted_angle(angle);
        }
    }

    /// Advances the local clock, smoothing and fades, and drops mirrors whose
    /// removal transition has run out. Returns the ids it dropped.
    pub fn update(&mut self, dt_ms: f64, sword_held: bool) -> Vec<EntityId> {
        self.now_ms += dt_ms.max(0.0) as u64;

        for mirror in self.mirrors.values_mut() {
            mirror.interpolate(dt_ms, sword_held);
            if mirror.is_self() {
                mirror.predict_sword(sword_held);
            }
            mirror.advance_tweens(dt_ms);
        }

        let expired: Vec<EntityId> = self
            .mirrors
            .values()
            .filter(|mirror| mirror.is_expired(self.now_ms, self.remove_transition_ms))
            .map(Mirror::id)
            .collect();
        for id in &expired {
            if let Some(mut mirror) = self.mirrors.remove(id) {
                mirror.cancel_animations();
            }
            if self.self_id == Some(*id) {
                self.self_id = None;
            }
        }
        expired
    }

    pub fn render_entities(&self) -> Vec<RenderEntity> {
        self.mirrors.values().map(Mirror::render).collect()
    }

    fn is_stale(&self, tick: u64) -> bool {
        self.last_tick.is_some_and(|last| tick <= last)
    }

    fn acknowledge(&mut self, ack: u32) {
        self.ack = self.ack.max(ack);
        let ack = self.ack;
        self.pending_angles.retain(|pending| pending.sequence > ack);
    }

    /// Keeps showing the newest unacknowledged aim; once everything is
    /// acknowledged the confirmed angle takes over.
    fn refresh_self_angle(&mut self) {
        let predicted = self.pending_angles.last().map(|pending| pending.angle);
        let Some(mirror) = self.self_id.and_then(|id| self.mirrors.get_mut(&id)) else {
            return;
        };
        let angle = predicted.or_else(|| mirror.state().get_f64(Field::Angle));
        if let Some(angle) = angle {
            mirror.set_predicted_angle(angle);
        }
    }

    fn create_mirror(
        &mut self,
        id: EntityId,
        kind: EntityKind,
        fields: &[FieldUpdate],
        flags: &[Flag],
    ) -> Vec<Effect> {
        if !kind.is_known() {
            warn!("Entity {} has a kind this client does not know, skipping", id);
            return Vec::new();
        }
        let fields = known_fields(id, kind, fields);
        let mut mirror = Mirror::new(id, kind, self.self_id == Some(id), &fields);
        let effects = mirror.after_update(&fields, flags, &self.mirrors);
        self.mirrors.insert(id, mirror);
        effects
    }

    fn update_mirror(&mut self, id: EntityId, fields: &[FieldUpdate], flags: &[Flag]) -> Vec<Effect> {
        let Some(mut mirror) = self.mirrors.remove(&id) else {
            return Vec::new();
        };
        let fields = known_fields(id, mirror.kind(), fields);

        mirror.before_update(&fields);
        mirror.apply(&fields);
        let effects = mirror.after_update(&fields, flags, &self.mirrors);

        self.mirrors.insert(id, mirror);
        effects
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops updates that do not fit the kind's schema, logging each one.
fn known_fields(id: EntityId, kind: EntityKind, fields: &[FieldUpdate]) -> Vec<FieldUpdate> {
    fields
        .iter()
        .filter(|update| match validate_update(kind, update) {
            Ok(()) => true,
            Err(e) => {
                warn!("Skipping field on entity {}: {}", id, e);
                false
            }
        })
        .cloned()
        .collect()
}
