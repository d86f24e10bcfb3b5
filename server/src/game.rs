use crate::collision;
use crate::config::GameConfig;
use crate::entity::{Entity, LifeEnded, TickContext};
use crate::lifecycle::{LifecycleManager, SpawnedEntity};
use log::debug;
use shared::{ClientInput, EntityId, EntityKind, FlagEvent, Shape};

/// Work queued for an entity between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityCommand {
    Input { entity: EntityId, input: ClientInput },
    Remove { entity: EntityId },
}

/// What a tick produced besides the new entity states.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub tick: u64,
    pub events: Vec<FlagEvent>,
    pub lives_ended: Vec<LifeEnded>,
    pub spawned: Vec<SpawnedEntity>,
    pub collisions: usize,
}

/// The authoritative entity set.
///
/// Entities are kept in insertion order, which is also id order since ids are
/// handed out monotonically and never reused. Collision resolution walks the
/// same order, so a tick is reproducible from its inputs and seed.
#[derive(Debug, Clone)]
pub struct World {
    entities: Vec<Entity>,
    next_id: EntityId,
    tick: u64,
    clock_ms: f64,
    width: f64,
    height: f64,
}

impl World {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            entities: Vec::new(),
            next_id: 1,
            tick: 0,
            clock_ms: 0.0,
            width,
            height,
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.world_width, config.world_height)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn now_ms(&self) -> u64 {
        self.clock_ms as u64
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub(crate) fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    /// Id the next inserted entity must carry.
    pub fn next_id(&self) -> EntityId {
        self.next_id
    }

    fn index_of(&self, id: EntityId) -> Option<usize> {
        self.entities
            .binary_search_by_key(&id, |entity| entity.id)
            .ok()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.index_of(id).map(|index| &self.entities[index])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.index_of(id).map(move |index| &mut self.entities[index])
    }

    /// Adds a placed entity and activates it.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        debug_assert!(
            entity.id >= self.next_id,
            "entity id {} reused or out of order",
            entity.id
        );
        let id = entity.id;
        self.next_id = id + 1;
        entity.on_spawn();
        self.entities.push(entity);
        id
    }

    pub fn count_active(&self, kind: EntityKind) -> usize {
        self.entities
            .iter()
            .filter(|entity| entity.is_active() && entity.kind() == kind)
            .count()
    }

    /// True when `shape` would overlap an active entity of a kind `kind` may
    /// not be placed on.
    pub fn overlaps_forbidden(&self, kind: EntityKind, shape: &Shape) -> bool {
        self.entities.iter().any(|entity| {
            entity.is_active() && kind.forbids(entity.kind()) && entity.shape.intersects(shape)
        })
    }

    /// Runs one tick: inputs, entity updates, collisions, lifecycle.
    pub fn step(
        &mut self,
        commands: Vec<EntityCommand>,
        lifecycle: &mut LifecycleManager,
        dt_ms: f64,
    ) -> TickOutput {
        self.tick += 1;
        self.clock_ms += dt_ms.max(0.0);
        let now = self.now_ms();
        let mut ctx = TickContext::new(self.tick, now, dt_ms, self.width, self.height);

        for command in commands {
            match command {
                EntityCommand::Input { entity, input } => {
                    if let Some(entity) = self.get_mut(entity) {
                        entity.apply_input(&input, now);
                    }
                }
                EntityCommand::Remove { entity } => {
                    if let Some(entity) = self.get_mut(entity) {
                        let life = entity.life_ended(None, now);
                        if entity.remove() {
                            ctx.lives_ended.extend(life);
                        }
                    }
                }
            }
        }

        for entity in self.entities.iter_mut() {
            entity.on_tick(&mut ctx);
        }

        let collisions = collision::resolve_collisions(&mut self.entities, &mut ctx);

        for request in ctx.spawns.drain(..) {
            lifecycle.request(request);
        }
        let spawned = lifecycle.run(self);

        TickOutput {
            tick: self.tick,
            events: ctx.flags.take(),
            lives_ended: ctx.lives_ended,
            spawned,
            collisions,
        }
    }

    /// Drops every removed entity. Call once the removal has been synced.
    pub fn destroy_removed(&mut self) -> Vec<EntityId> {
        let mut destroyed = Vec::new();
        self.entities.retain_mut(|entity| {
            if entity.destroy() {
                destroyed.push(entity.id);
                false
            } else {
                true
            }
        });
        if !destroyed.is_empty() {
            debug!("Destroyed {} entities at tick {}", destroyed.len(), self.tick);
        }
        destroyed
    }
}
