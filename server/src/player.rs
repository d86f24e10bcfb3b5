//! Player-controlled entity data and its per-tick behaviour

use crate::entity::TickContext;
use crate::physics::Vec2;
use shared::{
    normalize_angle, ClientInput, EntityId, EntityState, Field, InputKey, ABILITY_ACTIVE_MS,
    ABILITY_COOLDOWN_MS, CHAT_DURATION_MS, CHAT_MAX_LEN, PLAYER_ACCELERATION, PLAYER_BASE_RADIUS,
    PLAYER_BASE_ZOOM, PLAYER_MAX_HEALTH, PLAYER_MAX_RADIUS, SWORD_SWING_DURATION_MS,
};

pub const SWORD_DAMAGE: f64 = 20.0;
pub const SWORD_KNOCKBACK: f64 = 40.0;
pub const MAX_LEVEL: i64 = 30;
const ABILITY_SPEED_MULTIPLIER: f64 = 1.5;
const RADIUS_PER_LEVEL: f64 = 4.0;
const LEVELS_PER_EVOLUTION: i64 = 5;
const MAX_NAME_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
struct Controls {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    sword: bool,
}

impl Controls {
    fn direction(&self) -> Vec2 {
        let mut dir = Vec2::ZERO;
        if self.up {
            dir.y -= 1.0;
        }
        if self.down {
            dir.y += 1.0;
        }
        if self.left {
            dir.x -= 1.0;
        }
        if self.right {
            dir.x += 1.0;
        }
        dir.normalize()
    }
}

/// Raise while the button is held from rest, hold at 1, lower on release.
#[derive(Debug, Clone)]
struct SwordSwing {
    angle: f64,
    progress: f64,
    duration_ms: f64,
    raising: bool,
    hit: Vec<EntityId>,
}

impl Default for SwordSwing {
    fn default() -> Self {
        Self {
            angle: 0.0,
            progress: 0.0,
            duration_ms: SWORD_SWING_DURATION_MS,
            raising: false,
            hit: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Chat {
    text: String,
    expires_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub name: String,
    pub angle: f64,
    pub kills: i64,
    pub coins: i64,
    pub level: i64,
    pub evolution: i64,
    pub health: f64,
    controls: Controls,
    sword: SwordSwing,
    ability_active: bool,
    ability_until_ms: u64,
    ability_ready_ms: u64,
    ability_cooldown_secs: f64,
    chat: Option<Chat>,
    hurt_until_ms: u64,
}

impl Player {
    pub fn new(name: &str) -> Self {
        Self {
            name: sanitize_name(name),
            angle: normalize_angle(0.0),
            kills: 0,
            coins: 0,
            level: 1,
            evolution: 0,
            health: PLAYER_MAX_HEALTH,
            controls: Controls::default(),
            sword: SwordSwing::default(),
            ability_active: false,
            ability_until_ms: 0,
            ability_ready_ms: 0,
            ability_cooldown_secs: 0.0,
            chat: None,
            hurt_until_ms: 0,
        }
    }

    pub fn apply_input(&mut self, input: &ClientInput, now_ms: u64) {
        match input {
            ClientInput::Key { key, down } => match key {
                InputKey::Up => self.controls.up = *down,
                InputKey::Down => self.controls.down = *down,
                InputKey::Left => self.controls.left = *down,
                InputKey::Right => self.controls.right = *down,
                InputKey::SwordSwing => self.controls.sword = *down,
                InputKey::Ability => {
                    if *down {
                        self.activate_ability(now_ms);
                    }
                }
            },
            ClientInput::Angle(angle) => {
                if angle.is_finite() {
                    self.angle = normalize_angle(*angle);
                }
            }
            ClientInput::Chat(text) => self.say(text, now_ms),
            ClientInput::Respawn => {}
        }
    }

    fn activate_ability(&mut self, now_ms: u64) {
        if now_ms < self.ability_ready_ms {
            return;
        }
        self.ability_active = true;
        self.ability_until_ms = now_ms + ABILITY_ACTIVE_MS;
        self.ability_ready_ms = now_ms + ABILITY_COOLDOWN_MS;
    }

    fn say(&mut self, text: &str, now_ms: u64) {
        let text: String = text.trim().chars().take(CHAT_MAX_LEN).collect();
        if text.is_empty() {
            return;
        }
        self.chat = Some(Chat {
            text,
            expires_at_ms: now_ms + CHAT_DURATION_MS,
        });
    }

    /// Adds movement acceleration and advances timers. Runs before integration.
    pub fn update(&mut self, velocity: &mut Vec2, ctx: &TickContext) {
        let now = ctx.now_ms;

        if self.ability_active && now >= self.ability_until_ms {
            self.ability_active = false;
        }
        self.ability_cooldown_secs = self.ability_ready_ms.saturating_sub(now) as f64 / 1000.0;

        let mut acceleration = PLAYER_ACCELERATION;
        if self.ability_active {
            acceleration *= ABILITY_SPEED_MULTIPLIER;
        }
        *velocity = velocity.add(&self.controls.direction().scale(acceleration));

        self.update_sword(ctx.dt_ms);

        if matches!(&self.chat, Some(chat) if now >= chat.expires_at_ms) {
            self.chat = None;
        }
    }

    fn update_sword(&mut self, dt_ms: f64) {
        let step = dt_ms / self.sword.duration_ms;
        if self.controls.sword {
            if !self.sword.raising && self.sword.progress == 0.0 {
                self.sword.raising = true;
                self.sword.angle = self.angle;
                self.sword.hit.clear();
            }
            if self.sword.raising {
                self.sword.progress = (self.sword.progress + step).min(1.0);
                if self.sword.progress >= 1.0 {
                    self.sword.raising = false;
                }
            }
        } else {
            self.sword.raising = false;
            if self.sword.progress > 0.0 {
                self.sword.progress = (self.sword.progress - step).max(0.0);
            }
        }
    }

    /// A raising sword lands on each target at most once per swing.
    pub fn can_hit(&self, target: EntityId) -> bool {
        self.sword.raising && !self.sword.hit.contains(&target)
    }

    pub fn record_hit(&mut self, target: EntityId) {
        self.sword.hit.push(target);
    }

    #[cfg(test)]
    pub fn is_swinging(&self) -> bool {
        self.sword.raising
    }

    pub fn is_hurt(&self, now_ms: u64) -> bool {
        now_ms < self.hurt_until_ms
    }

    /// Applies damage and returns true when it was lethal.
    pub fn take_damage(&mut self, amount: f64, now_ms: u64, immune_for_ms: u64) -> bool {
        self.health = (self.health - amount).max(0.0);
        self.hurt_until_ms = self.hurt_until_ms.max(now_ms.saturating_add(immune_for_ms));
        self.health <= 0.0
    }

    /// Adds coins and returns true when the player gained a level.
    pub fn add_coins(&mut self, value: i64) -> bool {
        self.coins = self.coins.saturating_add(value).max(0);
        let level = level_for_coins(self.coins);
        let leveled_up = level > self.level;
        self.level = level;
        self.evolution = (self.level - 1) / LEVELS_PER_EVOLUTION;
        leveled_up
    }

    pub fn radius(&self) -> f64 {
        (PLAYER_BASE_RADIUS + (self.level - 1) as f64 * RADIUS_PER_LEVEL).min(PLAYER_MAX_RADIUS)
    }

    /// Bigger players see more of the world.
    pub fn viewport_zoom(&self) -> f64 {
        PLAYER_BASE_ZOOM * PLAYER_BASE_RADIUS / self.radius()
    }

    pub fn sword_damage(&self) -> f64 {
        SWORD_DAMAGE * (1.0 + self.evolution as f64 * 0.25)
    }

    pub fn on_remove(&mut self) {
        self.controls = Controls::default();
        self.sword = SwordSwing::default();
        self.chat = None;
        self.ability_active = false;
    }

    pub fn write_state(&self, state: &mut EntityState) {
        state.push(Field::Name, self.name.as_str());
        state.push(Field::Angle, self.angle);
        state.push(Field::Kills, self.kills);
        state.push(Field::Coins, self.coins);
        state.push(Field::Level, self.level);
        state.push(Field::Evolution, self.evolution);
        state.push(Field::Health, self.health);
        state.push(Field::AbilityActive, self.ability_active);
        state.push(Field::AbilityCooldown, self.ability_cooldown_secs);
        state.push(Field::SwordSwingAngle, self.sword.angle);
        state.push(Field::SwordSwingProgress, self.sword.progress);
        state.push(Field::SwordSwingDuration, self.sword.duration_ms);
        state.push(Field::ViewportZoom, self.viewport_zoom());
        state.push(
            Field::ChatMessage,
            self.chat
                .as_ref()
                .map(|chat| chat.text.clone())
                .unwrap_or_default(),
        );
    }
}

pub fn level_for_coins(coins: i64) -> i64 {
    let level = 1 + ((coins.max(0) as f64) / 5.0).sqrt().floor() as i64;
    level.min(MAX_LEVEL)
}

fn sanitize_name(name: &str) -> String {
    let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();
    if name.is_empty() {
        "Player".to_string()
    } else {
        name
    }
}
