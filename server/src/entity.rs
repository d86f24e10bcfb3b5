//! Server-side entities
//!
//! Every entity shares a circle, a velocity and a lifecycle; what it is lives
//! in [`EntityBody`]. Collision *detection* is owned by the collision pass,
//! collision *response* by [`Entity::process_targets_collision`], keyed off the
//! kind of the entity reacting.

use crate::coin::Coin;
use crate::config::ValueRange;
use crate::ice_spike::IceSpike;
use crate::lifecycle::{SpawnKind, SpawnRequest};
use crate::physics::{direction, Vec2};
use crate::player::{Player, SWORD_KNOCKBACK};
use log::debug;
use shared::{
    ClientInput, EntityId, EntityKind, EntityState, Flag, FlagLog, Shape, ICE_SPIKE_RADIUS,
    VELOCITY_DECAY,
};

/// `Spawning → Active → Removed → Destroyed`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Spawning,
    Active,
    /// Out of the simulation; kept for one more sync round so clients see the
    /// final state.
    Removed,
    Destroyed,
}

/// A player's life came to an end, by death or by leaving.
#[derive(Debug, Clone, PartialEq)]
pub struct LifeEnded {
    pub entity: EntityId,
    pub killer: Option<EntityId>,
    pub coins: i64,
    pub kills: i64,
    pub playtime_ms: u64,
}

/// Everything a tick phase may read or produce besides the entities themselves.
#[derive(Debug)]
pub struct TickContext {
    pub tick: u64,
    pub now_ms: u64,
    pub dt_ms: f64,
    pub world_width: f64,
    pub world_height: f64,
    pub flags: FlagLog,
    pub spawns: Vec<SpawnRequest>,
    pub lives_ended: Vec<LifeEnded>,
}

impl TickContext {
    pub fn new(tick: u64, now_ms: u64, dt_ms: f64, world_width: f64, world_height: f64) -> Self {
        Self {
            tick,
            now_ms,
            dt_ms,
            world_width,
            world_height,
            flags: FlagLog::new(tick),
            spawns: Vec::new(),
            lives_ended: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EntityBody {
    Player(Player),
    Coin(Coin),
    IceSpike(IceSpike),
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub shape: Shape,
    pub velocity: Vec2,
    lifecycle: Lifecycle,
    /// Template a replacement is spawned from once this entity is removed.
    pub respawn: Option<SpawnKind>,
    pub spawned_at_ms: u64,
    pub body: EntityBody,
}

impl Entity {
    pub fn new(id: EntityId, body: EntityBody, now_ms: u64) -> Self {
        let radius = match &body {
            EntityBody::Player(player) => player.radius(),
            EntityBody::Coin(coin) => coin.radius(),
            EntityBody::IceSpike(_) => ICE_SPIKE_RADIUS,
        };
        let mut shape = Shape::circle(0.0, 0.0, radius);
        let max_radius = kind_of(&body).max_radius();
        shape.set_radius_clamped(radius, max_radius);

        Self {
            id,
            shape,
            velocity: Vec2::ZERO,
            lifecycle: Lifecycle::Spawning,
            respawn: None,
            spawned_at_ms: now_ms,
            body,
        }
    }

    pub fn player(id: EntityId, name: &str, now_ms: u64) -> Self {
        Self::new(id, EntityBody::Player(Player::new(name)), now_ms)
    }

    pub fn coin(id: EntityId, value: i64, lifetime_ms: u64, now_ms: u64) -> Self {
        Self::new(id, EntityBody::Coin(Coin::new(value, now_ms, lifetime_ms)), now_ms)
    }

    pub fn ice_spike(id: EntityId, now_ms: u64) -> Self {
        Self::new(id, EntityBody::IceSpike(IceSpike), now_ms)
    }

    pub fn with_respawn(mut self, template: SpawnKind) -> Self {
        self.respawn = Some(template);
        self
    }

    pub fn place_at(&mut self, x: f64, y: f64) {
        self.shape.x = x;
        self.shape.y = y;
    }

    pub fn kind(&self) -> EntityKind {
        kind_of(&self.body)
    }

    /// Kinds this entity reacts to on contact.
    pub fn targets(&self) -> &'static [EntityKind] {
        match self.body {
            EntityBody::Player(_) => &[EntityKind::Player],
            EntityBody::Coin(_) => &[EntityKind::Player],
            EntityBody::IceSpike(_) => &[EntityKind::Player],
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn is_removed(&self) -> bool {
        self.lifecycle == Lifecycle::Removed
    }

    pub fn as_player(&self) -> Option<&Player> {
        match &self.body {
            EntityBody::Player(player) => Some(player),
            _ => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut Player> {
        match &mut self.body {
            EntityBody::Player(player) => Some(player),
            _ => None,
        }
    }

    pub fn as_coin(&self) -> Option<&Coin> {
        match &self.body {
            EntityBody::Coin(coin) => Some(coin),
            _ => None,
        }
    }

    pub fn on_spawn(&mut self) {
        if self.lifecycle == Lifecycle::Spawning {
            self.lifecycle = Lifecycle::Active;
        }
    }

    pub fn apply_input(&mut self, input: &ClientInput, now_ms: u64) {
        if !self.is_active() {
            return;
        }
        if let EntityBody::Player(player) = &mut self.body {
            player.apply_input(input, now_ms);
        }
    }

    pub fn on_tick(&mut self, ctx: &mut TickContext) {
        if !self.is_active() {
            return;
        }

        let expired = match &mut self.body {
            EntityBody::Player(player) => {
                player.update(&mut self.velocity, ctx);
                false
            }
            EntityBody::Coin(coin) => coin.is_expired(ctx.now_ms),
            EntityBody::IceSpike(_) => false,
        };

        self.integrate();
        self.clamp_to_world(ctx.world_width, ctx.world_height);

        if let EntityBody::Player(player) = &self.body {
            let radius = player.radius();
            self.shape
                .set_radius_clamped(radius, EntityKind::Player.max_radius());
        }

        if expired {
            debug!("Entity {} despawned after its lifetime", self.id);
            self.remove();
        }
    }

    fn integrate(&mut self) {
        self.shape.translate(self.velocity.x, self.velocity.y);
        self.velocity = self.velocity.scale(VELOCITY_DECAY);
    }

    fn clamp_to_world(&mut self, width: f64, height: f64) {
        let radius = self.shape.radius();
        self.shape.x = clamp_axis(self.shape.x, radius, width);
        self.shape.y = clamp_axis(self.shape.y, radius, height);
    }

    /// Takes the entity out of the simulation. Returns false when it already was.
    pub fn remove(&mut self) -> bool {
        match self.lifecycle {
            Lifecycle::Spawning | Lifecycle::Active => {
                self.lifecycle = Lifecycle::Removed;
                self.on_remove();
                true
            }
            Lifecycle::Removed | Lifecycle::Destroyed => false,
        }
    }

    pub fn on_remove(&mut self) {
        self.velocity = Vec2::ZERO;
        if let EntityBody::Player(player) = &mut self.body {
            player.on_remove();
        }
    }

    pub fn destroy(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Removed {
            self.lifecycle = Lifecycle::Destroyed;
            true
        } else {
            false
        }
    }

    /// Current values of the fields declared for this entity's kind.
    pub fn state(&self) -> EntityState {
        let mut state = EntityState::with_shape(&self.shape);
        match &self.body {
            EntityBody::Player(player) => player.write_state(&mut state),
            EntityBody::Coin(coin) => coin.write_state(&mut state),
            EntityBody::IceSpike(_) => {}
        }
        state
    }

    pub fn life_ended(&self, killer: Option<EntityId>, now_ms: u64) -> Option<LifeEnded> {
        let player = self.as_player()?;
        Some(LifeEnded {
            entity: self.id,
            killer,
            coins: player.coins,
            kills: player.kills,
            playtime_ms: now_ms.saturating_sub(self.spawned_at_ms),
        })
    }

    /// Reacts to touching `other`, which is of one of this entity's target kinds.
    pub fn process_targets_collision(&mut self, other: &mut Entity, ctx: &mut TickContext) {
        debug_assert!(
            self.is_active() && other.is_active(),
            "collision dispatched between {} and {} after removal",
            self.id,
            other.id
        );
        if !self.is_active() || !other.is_active() {
            return;
        }

        match self.kind() {
            EntityKind::Coin => self.collect_coin(other, ctx),
            EntityKind::IceSpike => self.spike(other, ctx),
            EntityKind::Player => self.sword_hit(other, ctx),
            EntityKind::Unknown => {}
        }
    }

    fn collect_coin(&mut self, collector: &mut Entity, ctx: &mut TickContext) {
        let EntityBody::Coin(coin) = &mut self.body else {
            return;
        };
        let EntityBody::Player(player) = &mut collector.body else {
            return;
        };

        if player.add_coins(coin.value) {
            ctx.flags.set(collector.id, Flag::LevelUp);
        }
        ctx.flags.set(collector.id, Flag::GetCoin);
        coin.hunter_id = Some(collector.id);
        self.remove();
    }

    fn spike(&mut self, target: &mut Entity, ctx: &mut TickContext) {
        let now = ctx.now_ms;
        let EntityBody::Player(player) = &mut target.body else {
            return;
        };
        if player.is_hurt(now) {
            return;
        }

        let lethal = player.take_damage(IceSpike::DAMAGE, now, IceSpike::IMMUNITY_MS);
        ctx.flags.set(target.id, Flag::Damaged);
        knock_back(&self.shape, target, IceSpike::KNOCKBACK);
        if lethal {
            kill(target, None, ctx);
        }
    }

    fn sword_hit(&mut self, target: &mut Entity, ctx: &mut TickContext) {
        let target_id = target.id;
        let EntityBody::Player(attacker) = &mut self.body else {
            return;
        };
        if !attacker.can_hit(target_id) {
            return;
        }
        let EntityBody::Player(victim) = &mut target.body else {
            return;
        };

        attacker.record_hit(target_id);
        let lethal = victim.take_damage(attacker.sword_damage(), ctx.now_ms, 0);
        if lethal {
            attacker.kills += 1;
        }
        ctx.flags.set(self.id, Flag::EnemyHit(target_id));
        ctx.flags.set(target_id, Flag::Damaged);

        knock_back(&self.shape, target, SWORD_KNOCKBACK);
        if lethal {
            kill(target, Some(self.id), ctx);
        }
    }
}

fn kind_of(body: &EntityBody) -> EntityKind {
    match body {
        EntityBody::Player(_) => EntityKind::Player,
        EntityBody::Coin(_) => EntityKind::Coin,
        EntityBody::IceSpike(_) => EntityKind::IceSpike,
    }
}

fn clamp_axis(value: f64, radius: f64, extent: f64) -> f64 {
    let low = radius.min(extent / 2.0);
    let high = (extent - radius).max(low);
    value.clamp(low, high)
}

fn knock_back(from: &Shape, target: &mut Entity, strength: f64) {
    let mut dir = direction((from.x, from.y), (target.shape.x, target.shape.y));
    if dir.is_zero() {
        dir = Vec2::new(1.0, 0.0);
    }
    target.velocity = target.velocity.add(&dir.scale(strength));
}

/// Ends a player's life and drops half of its coins where it fell.
fn kill(victim: &mut Entity, killer: Option<EntityId>, ctx: &mut TickContext) {
    let Some(life) = victim.life_ended(killer, ctx.now_ms) else {
        return;
    };
    if !victim.remove() {
        return;
    }

    let drop = (life.coins / 2).max(1);
    ctx.spawns.push(SpawnRequest::at(
        SpawnKind::Coin {
            value: ValueRange::exact(drop),
        },
        victim.shape.x,
        victim.shape.y,
    ));
    debug!(
        "Entity {} was killed by {:?}, dropping {} coins",
        victim.id, killer, drop
    );
    ctx.lives_ended.push(life);
}
