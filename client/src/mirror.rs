//! Local mirrors of server entities
//!
//! A [`Mirror`] holds the last confirmed state of one entity plus everything
//! the client layers on top of it: smoothed position and angle, the sword
//! animation, fades and the chat bubble. Incoming changes pass through
//! [`Mirror::before_update`], [`Mirror::apply`] and [`Mirror::after_update`]
//! in that order, never interleaved with another change for the same entity.

use crate::tween::{TweenHandle, TweenProperty, Tweens};
use shared::{
    EntityId, EntityKind, EntityState, Field, FieldUpdate, Flag, SWORD_SWING_DURATION_MS,
};
use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};

/// Time for a remote entity's rendered angle to reach a new server angle.
pub const ANGLE_LERP_MS: f64 = 120.0;
/// Time for a rendered position to reach a new server position.
pub const POSITION_LERP_MS: f64 = 100.0;
pub const CHAT_FADE_MS: f64 = 200.0;
/// Fade-out before a chat bubble swaps to a new message.
pub const CHAT_SWAP_MS: f64 = 100.0;

/// One-shot cosmetic or UI reaction produced by the post-update hook.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The self entity's viewport zoom changed.
    Zoom(f64),
    /// A stat shown on the HUD changed for the self entity.
    HudRefresh,
    /// The entity's evolution overlay needs redrawing.
    EvolutionOverlay { entity: EntityId, evolution: i64 },
    CoinPickup { entity: EntityId, x: f64, y: f64 },
    DamagedParticles { entity: EntityId, x: f64, y: f64 },
    /// Sword hit landing on a non-player mirror. A player target shows its
    /// own `DamagedParticles`, and current server swords only target
    /// players, so this fires only once some other kind becomes hittable.
    HitParticles {
        entity: EntityId,
        target: EntityId,
        x: f64,
        y: f64,
    },
    LevelUp { entity: EntityId },
}

/// What the renderer needs to draw one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub is_self: bool,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub angle: f64,
    pub sword_progress: f64,
    pub alpha: f64,
    pub name: String,
    pub chat_text: String,
    pub chat_alpha: f64,
}

#[derive(Debug, Clone)]
pub struct Mirror {
    id: EntityId,
    kind: EntityKind,
    is_self: bool,
    state: EntityState,

    render_x: f64,
    render_y: f64,
    render_angle: f64,
    previous_x: f64,
    previous_y: f64,
    previous_angle: f64,
    position_lerp: f64,
    angle_lerp: f64,

    sword_lerp: f64,
    sword_raise_started: bool,
    sword_decrease_started: bool,

    overlay_dirty: bool,
    alpha: f64,
    chat_alpha: f64,
    chat_text: String,
    pending_chat: Option<String>,
    removing_since_ms: Option<u64>,
    tweens: Tweens,
    fade_tween: Option<TweenHandle>,
    chat_tween: Option<TweenHandle>,
}

impl Mirror {
    /// Creates a mirror from its first full payload. Rendering starts at the
    /// confirmed position; there is nothing to interpolate from yet.
    pub fn new(id: EntityId, kind: EntityKind, is_self: bool, fields: &[FieldUpdate]) -> Self {
        let mut state = EntityState::defaults(kind);
        state.apply(fields);

        let x = state.get_f64(Field::X).unwrap_or(0.0);
        let y = state.get_f64(Field::Y).unwrap_or(0.0);
        let angle = state.get_f64(Field::Angle).unwrap_or(0.0);

        Self {
            id,
            kind,
            is_self,
            state,
            render_x: x,
            render_y: y,
            render_angle: angle,
            previous_x: x,
            previous_y: y,
            previous_angle: angle,
            position_lerp: 1.0,
            angle_lerp: 1.0,
            sword_lerp: 0.0,
            sword_raise_started: false,
            sword_decrease_started: false,
            overlay_dirty: kind == EntityKind::Player,
            alpha: 1.0,
            chat_alpha: 0.0,
            chat_text: String::new(),
            pending_chat: None,
            removing_since_ms: None,
            tweens: Tweens::new(),
            fade_tween: None,
            chat_tween: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn set_is_self(&mut self, is_self: bool) {
        self.is_self = is_self;
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn position(&self) -> (f64, f64) {
        (self.render_x, self.render_y)
    }

    pub fn angle(&self) -> f64 {
        self.render_angle
    }

    pub fn sword_progress(&self) -> f64 {
        self.sword_lerp
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn chat_text(&self) -> &str {
        &self.chat_text
    }

    pub fn chat_alpha(&self) -> f64 {
        self.chat_alpha
    }

    #[cfg(test)]
    pub fn tweens(&self) -> &Tweens {
        &self.tweens
    }

    pub fn is_removing(&self) -> bool {
        self.removing_since_ms.is_some()
    }

    /// Pre-update hook. Sees only the changed fields, before any of them is
    /// written, so it can compare old against new.
    pub fn before_update(&mut self, changes: &[FieldUpdate]) {
        let mut position_reset = false;

        for change in changes {
            match change.field {
                Field::SwordSwingProgress if !self.is_self => {
                    let Some(next) = change.value.as_f64() else {
                        continue;
                    };
                    let current = self.state.get_f64(Field::SwordSwingProgress).unwrap_or(0.0);
                    if current == 0.0 && next != 0.0 {
                        self.sword_raise_started = true;
                    }
                    if current == 1.0 && next != 1.0 {
                        self.sword_decrease_started = true;
                    }
                }
                Field::Angle => {
                    self.previous_angle = self.render_angle;
                    self.angle_lerp = 0.0;
                }
                Field::X | Field::Y if !position_reset => {
                    self.previous_x = self.render_x;
                    self.previous_y = self.render_y;
                    self.position_lerp = 0.0;
                    position_reset = true;
                }
                Field::Evolution => {
                    if self.state.get(Field::Evolution) != Some(&change.value) {
                        self.overlay_dirty = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// Writes every change at once. Applying the same changes twice leaves the
    /// mirror as it was after the first time.
    pub fn apply(&mut self, changes: &[FieldUpdate]) {
        self.state.apply(changes);
    }

    /// Post-update hook. `others` holds every other mirror, for effects that
    /// reference a second entity.
    pub fn after_update(
        &mut self,
        changes: &[FieldUpdate],
        flags: &[Flag],
        others: &BTreeMap<EntityId, Mirror>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut hud_changed = false;

        for change in changes {
            match change.field {
                Field::ViewportZoom if self.is_self => {
                    if let Some(zoom) = change.value.as_f64() {
                        effects.push(Effect::Zoom(zoom));
                    }
                }
                Field::ChatMessage => self.update_chat(),
                Field::Coins | Field::Level | Field::Kills | Field::Health | Field::Evolution
                    if self.is_self =>
                {
                    hud_changed = true;
                }
                _ => {}
            }
        }
        if hud_changed {
            effects.push(Effect::HudRefresh);
        }
        if self.overlay_dirty {
            self.overlay_dirty = false;
            effects.push(Effect::EvolutionOverlay {
                entity: self.id,
                evolution: self.state.get_i64(Field::Evolution).unwrap_or(0),
            });
        }

        let (x, y) = self.position();
        for flag in flags {
            match *flag {
                Flag::GetCoin => effects.push(Effect::CoinPickup {
                    entity: self.id,
                    x,
                    y,
                }),
                Flag::Damaged => effects.push(Effect::DamagedParticles {
                    entity: self.id,
                    x,
                    y,
                }),
                Flag::EnemyHit(target) => match others.get(&target) {
                    Some(hit) if hit.kind != EntityKind::Player => {
                        let (x, y) = hit.position();
                        effects.push(Effect::HitParticles {
                            entity: self.id,
                            target,
                            x,
                            y,
                        });
                    }
                    _ => {}
                },
                Flag::LevelUp => effects.push(Effect::LevelUp { entity: self.id }),
            }
        }

        effects
    }

    fn update_chat(&mut self) {
        let message = self
            .state
            .get_str(Field::ChatMessage)
            .unwrap_or_default()
            .to_string();

        let chat_animating = self
            .chat_tween
            .is_some_and(|handle| self.tweens.is_active(handle));
        if message.is_empty() {
            self.pending_chat = None;
            if self.chat_text.is_empty() && !chat_animating {
                return;
            }
            self.start_chat_tween(self.chat_alpha, 0.0, CHAT_FADE_MS);
        } else if !self.chat_text.is_empty() {
            self.pending_chat = Some(message);
            self.start_chat_tween(self.chat_alpha, 0.0, CHAT_SWAP_MS);
        } else {
            self.chat_text = message;
            self.start_chat_tween(self.chat_alpha, 1.0, CHAT_FADE_MS);
        }
    }

    /// Cancels the running chat tween, if any, and starts its replacement.
    fn start_chat_tween(&mut self, from: f64, to: f64, duration_ms: f64) {
        if let Some(handle) = self.chat_tween.take() {
            self.tweens.cancel(handle);
        }
        self.chat_tween = Some(
            self.tweens
                .start(TweenProperty::ChatAlpha, from, to, duration_ms),
        );
    }

    /// Shows a locally predicted aim angle right away.
    pub fn set_predicted_angle(&mut self, angle: f64) {
        self.render_angle = angle;
        self.previous_angle = angle;
        self.angle_lerp = 1.0;
    }

    /// Starts the local sword raise as soon as the button goes down.
    pub fn predict_sword(&mut self, sword_held: bool) {
        if sword_held && !(self.sword_raise_started || self.sword_decrease_started) {
            self.sword_raise_started = true;
        }
    }

    /// Advances smoothing and animations by one frame.
    pub fn interpolate(&mut self, dt_ms: f64, sword_held: bool) {
        let duration = self
            .state
            .get_f64(Field::SwordSwingDuration)
            .filter(|duration| *duration > 0.0)
            .unwrap_or(SWORD_SWING_DURATION_MS);
        let sword_step = dt_ms / duration;

        if self.sword_raise_started {
            self.sword_lerp += sword_step;
            if self.sword_lerp >= 1.0 {
                self.sword_lerp = 1.0;
                self.sword_raise_started = false;
                if self.is_self && !sword_held {
                    self.sword_decrease_started = true;
                }
            }
        } else if self.sword_decrease_started {
            self.sword_lerp -= sword_step;
            if self.sword_lerp <= 0.0 {
                self.sword_lerp = 0.0;
                self.sword_decrease_started = false;
            }
        }

        let target_x = self.state.get_f64(Field::X).unwrap_or(self.render_x);
        let target_y = self.state.get_f64(Field::Y).unwrap_or(self.render_y);
        self.position_lerp = (self.position_lerp + dt_ms / POSITION_LERP_MS).min(1.0);
        self.render_x = self.previous_x + (target_x - self.previous_x) * self.position_lerp;
        self.render_y = self.previous_y + (target_y - self.previous_y) * self.position_lerp;

        if !self.is_self {
            let target = self.state.get_f64(Field::Angle).unwrap_or(self.render_angle);
            self.angle_lerp = (self.angle_lerp + dt_ms / ANGLE_LERP_MS).min(1.0);
            self.render_angle = rotate_to(self.previous_angle, target, self.angle_lerp);
        }
    }

    pub fn advance_tweens(&mut self, dt_ms: f64) {
        for step in self.tweens.advance(dt_ms) {
            match step.property {
                TweenProperty::Alpha => {
                    self.alpha = step.value;
                    if step.finished {
                        self.fade_tween = None;
                    }
                }
                TweenProperty::ChatAlpha => {
                    self.chat_alpha = step.value;
                    if !step.finished {
                        continue;
                    }
                    self.chat_tween = None;
                    if let Some(next) = self.pending_chat.take() {
                        self.chat_text = next;
                        self.start_chat_tween(0.0, 1.0, CHAT_FADE_MS);
                    } else if self.chat_alpha <= 0.0 {
                        self.chat_text.clear();
                    }
                }
            }
        }
    }

    /// Starts the fade-out. Returns false if the mirror was already leaving.
    pub fn begin_removal(&mut self, now_ms: u64, transition_ms: u64) -> bool {
        if self.removing_since_ms.is_some() {
            return false;
        }
        self.removing_since_ms = Some(now_ms);
        self.fade_tween = Some(self.tweens.start(
            TweenProperty::Alpha,
            self.alpha,
            0.0,
            transition_ms as f64,
        ));
        true
    }

    pub fn is_expired(&self, now_ms: u64, transition_ms: u64) -> bool {
        self.removing_since_ms
            .is_some_and(|since| now_ms.saturating_sub(since) >= transition_ms)
    }

    /// Stops every animation still touching this mirror. Must run before the
    /// mirror is dropped.
    pub fn cancel_animations(&mut self) -> usize {
        self.pending_chat = None;
        [self.fade_tween.take(), self.chat_tween.take()]
            .into_iter()
            .flatten()
            .filter(|handle| self.tweens.cancel(*handle))
            .count()
    }

    pub fn render(&self) -> RenderEntity {
        RenderEntity {
            id: self.id,
            kind: self.kind,
            is_self: self.is_self,
            x: self.render_x,
            y: self.render_y,
            radius: self.state.get_f64(Field::Radius).unwrap_or(0.0),
            angle: self.render_angle,
            sword_progress: self.sword_lerp,
            alpha: self.alpha,
            name: self.state.get_str(Field::Name).unwrap_or_default().to_string(),
            chat_text: self.chat_text.clone(),
            chat_alpha: self.chat_alpha,
        }
    }
}

/// Turns from `from` toward `to` along the shorter arc, `t` of the way.
fn rotate_to(from: f64, to: f64, t: f64) -> f64 {
    let mut delta = (to - from).rem_euclid(TAU);
    if delta > PI {
        delta -= TAU;
    }
    from + delta * t
}
