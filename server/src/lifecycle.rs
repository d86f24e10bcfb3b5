//! Spawning, respawning and placement of entities
//!
//! Gameplay code never inserts entities directly: it files a [`SpawnRequest`]
//! and the lifecycle manager places it during the lifecycle phase of a tick.
//! A request whose placement keeps colliding with forbidden kinds stays
//! pending and is retried on the next tick.

use crate::config::{GameConfig, ValueRange};
use crate::entity::Entity;
use crate::game::World;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{ClientId, EntityId, EntityKind, Shape};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub enum SpawnKind {
    Player { name: String },
    Coin { value: ValueRange },
    IceSpike,
}

impl SpawnKind {
    pub fn kind(&self) -> EntityKind {
        match self {
            SpawnKind::Player { .. } => EntityKind::Player,
            SpawnKind::Coin { .. } => EntityKind::Coin,
            SpawnKind::IceSpike => EntityKind::IceSpike,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub kind: SpawnKind,
    /// Preferred position, tried before random spots around it.
    pub at: Option<(f64, f64)>,
    pub respawnable: bool,
    pub owner: Option<ClientId>,
}

impl SpawnRequest {
    pub fn random(kind: SpawnKind) -> Self {
        Self {
            kind,
            at: None,
            respawnable: false,
            owner: None,
        }
    }

    pub fn at(kind: SpawnKind, x: f64, y: f64) -> Self {
        Self {
            at: Some((x, y)),
            ..Self::random(kind)
        }
    }

    pub fn respawnable(mut self) -> Self {
        self.respawnable = true;
        self
    }

    pub fn owned_by(mut self, owner: ClientId) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Target density for one kind of entity.
#[derive(Debug, Clone)]
pub struct SpawnTemplate {
    pub kind: SpawnKind,
    pub count: usize,
    pub respawnable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owner: Option<ClientId>,
}

pub struct LifecycleManager {
    templates: Vec<SpawnTemplate>,
    pending: VecDeque<SpawnRequest>,
    rng: StdRng,
    placement_attempts: u32,
    coin_lifetime_ms: u64,
}

impl LifecycleManager {
    pub fn new(config: &GameConfig) -> Self {
        let templates = vec![
            SpawnTemplate {
                kind: SpawnKind::IceSpike,
                count: config.ice_spikes.count,
                respawnable: config.ice_spikes.respawnable,
            },
            SpawnTemplate {
                kind: SpawnKind::Coin {
                    value: config.coins.value,
                },
                count: config.coins.count,
                respawnable: config.coins.respawnable,
            },
        ];
        let seed = config.seed.unwrap_or_else(rand::random);
        Self::with_seed(
            templates,
            config.placement_attempts,
            config.coins.lifetime_ms,
            seed,
        )
    }

    pub fn with_seed(
        templates: Vec<SpawnTemplate>,
        placement_attempts: u32,
        coin_lifetime_ms: u64,
        seed: u64,
    ) -> Self {
        Self {
            templates,
            pending: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            placement_attempts: placement_attempts.max(1),
            coin_lifetime_ms,
        }
    }

    pub fn templates(&self) -> &[SpawnTemplate] {
        &self.templates
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn request(&mut self, request: SpawnRequest) {
        self.pending.push_back(request);
    }

    pub fn has_pending_for(&self, owner: ClientId) -> bool {
        self.pending
            .iter()
            .any(|request| request.owner == Some(owner))
    }

    /// Drops queued spawns for a client that went away.
    pub fn cancel_for_owner(&mut self, owner: ClientId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|request| request.owner != Some(owner));
        before - self.pending.len()
    }

    /// Fills the world up to every template's count.
    pub fn populate(&mut self, world: &mut World) -> Vec<SpawnedEntity> {
        let templates = self.templates.clone();
        for template in templates {
            let existing = world.count_active(template.kind.kind());
            for _ in existing..template.count {
                let mut request = SpawnRequest::random(template.kind.clone());
                request.respawnable = template.respawnable;
                self.request(request);
            }
        }
        self.drain(world)
    }

    /// Lifecycle phase of a tick: replace removed respawnable entities, then
    /// place everything pending.
    pub fn run(&mut self, world: &mut World) -> Vec<SpawnedEntity> {
        for entity in world.entities_mut() {
            if !entity.is_removed() {
                continue;
            }
            if let Some(template) = entity.respawn.take() {
                self.pending
                    .push_back(SpawnRequest::random(template).respawnable());
            }
        }
        self.drain(world)
    }

    fn drain(&mut self, world: &mut World) -> Vec<SpawnedEntity> {
        let mut spawned = Vec::new();
        let mut deferred = VecDeque::new();

        while let Some(request) = self.pending.pop_front() {
            match self.spawn(world, &request) {
                Some(id) => spawned.push(SpawnedEntity {
                    id,
                    kind: request.kind.kind(),
                    owner: request.owner,
                }),
                None => {
                    debug!(
                        "No free spot for {:?} after {} attempts, retrying next tick",
                        request.kind.kind(),
                        self.placement_attempts
                    );
                    deferred.push_back(request);
                }
            }
        }

        self.pending = deferred;
        spawned
    }

    fn spawn(&mut self, world: &mut World, request: &SpawnRequest) -> Option<EntityId> {
        let mut entity = self.build(world.next_id(), &request.kind, world.now_ms());
        let (x, y) = self.find_position(world, entity.kind(), entity.shape.radius(), request.at)?;
        entity.place_at(x, y);
        if request.respawnable {
            entity = entity.with_respawn(request.kind.clone());
        }
        Some(world.insert(entity))
    }

    fn build(&mut self, id: EntityId, kind: &SpawnKind, now_ms: u64) -> Entity {
        match kind {
            SpawnKind::Player { name } => Entity::player(id, name, now_ms),
            SpawnKind::Coin { value } => {
                let value = value.roll(&mut self.rng);
                Entity::coin(id, value, self.coin_lifetime_ms, now_ms)
            }
            SpawnKind::IceSpike => Entity::ice_spike(id, now_ms),
        }
    }

    fn find_position(
        &mut self,
        world: &World,
        kind: EntityKind,
        radius: f64,
        preferred: Option<(f64, f64)>,
    ) -> Option<(f64, f64)> {
        let (width, height) = world.bounds();

        for attempt in 0..self.placement_attempts {
            let (x, y) = match preferred {
                Some(point) if attempt == 0 => point,
                Some((px, py)) => {
                    let spread = radius * 2.0;
                    (
                        px + self.rng.gen_range(-spread..=spread),
                        py + self.rng.gen_range(-spread..=spread),
                    )
                }
                None => (
                    random_axis(&mut self.rng, radius, width),
                    random_axis(&mut self.rng, radius, height),
                ),
            };
            let candidate = Shape::circle(
                inset(x, radius, width),
                inset(y, radius, height),
                radius,
            );
            if !world.overlaps_forbidden(kind, &candidate) {
                return Some((candidate.x, candidate.y));
            }
        }
        None
    }
}

fn axis_bounds(radius: f64, extent: f64) -> (f64, f64) {
    let low = radius.min(extent / 2.0);
    let high = (extent - radius).max(low);
    (low, high)
}

fn inset(value: f64, radius: f64, extent: f64) -> f64 {
    let (low, high) = axis_bounds(radius, extent);
    value.clamp(low, high)
}

fn random_axis(rng: &mut StdRng, radius: f64, extent: f64) -> f64 {
    let (low, high) = axis_bounds(radius, extent);
    if high > low {
        rng.gen_range(low..=high)
    } else {
        low
    }
}
