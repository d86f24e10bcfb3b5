//! Client input management with sequencing and change detection

use crate::game::ClientGameState;
use shared::{
    normalize_angle, ClientInput, EntityKind, Field, InputKey, InputState, CHAT_MAX_LEN,
};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Turns raw key and pointer events into sequenced network inputs
pub struct InputManager {
    next_sequence: u32,
    held: HashSet<InputKey>,
    last_angle: Option<f64>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            held: HashSet::new(),
            last_angle: None,
        }
    }

    pub fn is_down(&self, key: InputKey) -> bool {
        self.held.contains(&key)
    }

    /// Returns an input only when the key actually changed state.
    pub fn key(&mut self, key: InputKey, down: bool) -> Option<InputState> {
        let changed = if down {
            self.held.insert(key)
        } else {
            self.held.remove(&key)
        };
        changed.then(|| self.next_input(ClientInput::Key { key, down }))
    }

    /// Aims from the entity position toward a world-space pointer. Returns an
    /// input only when the rounded angle differs from the last one sent.
    pub fn aim(&mut self, from: (f64, f64), pointer: (f64, f64)) -> Option<InputState> {
        let angle = normalize_angle((pointer.1 - from.1).atan2(pointer.0 - from.0));
        if self.last_angle == Some(angle) {
            return None;
        }
        self.last_angle = Some(angle);
        Some(self.next_input(ClientInput::Angle(angle)))
    }

    pub fn chat(&mut self, text: &str) -> Option<InputState> {
        let text: String = text.trim().chars().take(CHAT_MAX_LEN).collect();
        if text.is_empty() {
            return None;
        }
        Some(self.next_input(ClientInput::Chat(text)))
    }

    pub fn respawn(&mut self) -> InputState {
        self.held.clear();
        self.last_angle = None;
        self.next_input(ClientInput::Respawn)
    }

    fn next_input(&mut self, input: ClientInput) -> InputState {
        let state = InputState {
            sequence: self.next_sequence,
            timestamp: Self::get_timestamp(),
            input,
        };
        self.next_sequence += 1;
        state
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Distance at which the bot starts swinging at another player.
const BOT_ATTACK_RANGE: f64 = 350.0;
/// The bot stops steering along an axis once it is this close.
const BOT_DEAD_ZONE: f64 = 20.0;

/// Plays the game from the mirrored state alone: chases the nearest coin and
/// swings at players that come close.
pub struct BotController {
    input: InputManager,
    respawn_requested: bool,
}

impl BotController {
    pub fn new() -> Self {
        Self {
            input: InputManager::new(),
            respawn_requested: false,
        }
    }

    pub fn sword_held(&self) -> bool {
        self.input.is_down(InputKey::SwordSwing)
    }

    pub fn update(&mut self, game: &ClientGameState) -> Vec<InputState> {
        let mut inputs = Vec::new();

        let Some(me) = game.self_mirror() else {
            if game.has_snapshot() && !self.respawn_requested {
                self.respawn_requested = true;
                inputs.push(self.input.respawn());
            }
            return inputs;
        };
        self.respawn_requested = false;
        let position = me.position();

        let nearest = |kind: EntityKind| {
            game.mirrors()
                .filter(|mirror| mirror.kind() == kind && !mirror.is_self() && !mirror.is_removing())
                .map(|mirror| (distance(position, mirror.position()), mirror.position()))
                .min_by(|a, b| a.0.total_cmp(&b.0))
        };

        let enemy = nearest(EntityKind::Player);
        let attacking = matches!(enemy, Some((range, _)) if range <= BOT_ATTACK_RANGE);
        let target = if attacking {
            enemy.map(|(_, at)| at)
        } else {
            nearest(EntityKind::Coin).map(|(_, at)| at)
        };

        let (dx, dy) = target
            .map(|(x, y)| (x - position.0, y - position.1))
            .unwrap_or((0.0, 0.0));
        // Press from rest, hold to the top, then let go until it is back down.
        let progress = me.state().get_f64(Field::SwordSwingProgress).unwrap_or(0.0);
        let swing = attacking && (progress == 0.0 || (self.sword_held() && progress < 1.0));

        let steering = [
            (InputKey::Left, dx < -BOT_DEAD_ZONE),
            (InputKey::Right, dx > BOT_DEAD_ZONE),
            (InputKey::Up, dy < -BOT_DEAD_ZONE),
            (InputKey::Down, dy > BOT_DEAD_ZONE),
            (InputKey::SwordSwing, swing),
        ];
        for (key, down) in steering {
            inputs.extend(self.input.key(key, down));
        }

        if let Some(target) = target {
            inputs.extend(self.input.aim(position, target));
        }

        inputs
    }
}

impl Default for BotController {
    fn default() -> Self {
        Self::new()
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}
