//! Types shared by the arena server and client
//!
//! Geometry, per-kind field schemas, transient flags and the wire protocol
//! live here so both sides agree on them byte for byte.

pub mod error;
pub mod flags;
pub mod protocol;
pub mod schema;
pub mod shape;

pub use error::{ProtocolError, SchemaError, ShapeError};
pub use flags::{Flag, FlagEvent, FlagLog};
pub use protocol::{
    ClientInput, EntityDiff, EntitySnapshot, FullSnapshot, InputKey, InputState, Packet, StateDiff,
};
pub use schema::{EntityKind, EntityState, Field, FieldSpec, FieldUpdate, FieldValue, ValueKind};
pub use shape::Shape;

pub type EntityId = u32;
pub type ClientId = u32;

pub const PROTOCOL_VERSION: u32 = 1;

pub const WORLD_WIDTH: f64 = 4000.0;
pub const WORLD_HEIGHT: f64 = 4000.0;

/// Velocity multiplier applied once per tick after integration.
pub const VELOCITY_DECAY: f64 = 0.5;

pub const PLAYER_BASE_RADIUS: f64 = 100.0;
pub const PLAYER_MAX_RADIUS: f64 = 300.0;
pub const PLAYER_MAX_HEALTH: f64 = 100.0;
pub const PLAYER_ACCELERATION: f64 = 12.0;
pub const PLAYER_BASE_ZOOM: f64 = 1.0;

pub const COIN_BASE_RADIUS: f64 = 80.0;
pub const COIN_RADIUS_PER_VALUE: f64 = 10.0;
pub const COIN_MAX_RADIUS: f64 = 300.0;
pub const COIN_DESPAWN_MS: u64 = 120_000;

pub const ICE_SPIKE_RADIUS: f64 = 60.0;
pub const ICE_SPIKE_MAX_RADIUS: f64 = 120.0;

pub const SWORD_SWING_DURATION_MS: f64 = 250.0;
pub const ABILITY_ACTIVE_MS: u64 = 5_000;
pub const ABILITY_COOLDOWN_MS: u64 = 30_000;
pub const CHAT_DURATION_MS: u64 = 5_000;
pub const CHAT_MAX_LEN: usize = 35;

/// How long a client keeps a removed mirror around for its fade-out.
pub const REMOVE_TRANSITION_MS: u64 = 1000;

/// Radius a coin of the given value is drawn and collided with.
pub fn coin_radius(value: i64) -> f64 {
    (COIN_BASE_RADIUS + value as f64 * COIN_RADIUS_PER_VALUE).min(COIN_MAX_RADIUS)
}

/// Normalizes an angle in radians to `(0, 2π]`, keeping two decimals.
pub fn normalize_angle(angle: f64) -> f64 {
    let tau = std::f64::consts::TAU;
    let mut angle = (angle.rem_euclid(tau) * 100.0).round() / 100.0;
    if angle <= 0.0 {
        angle += (tau * 100.0).round() / 100.0;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_coin_radius_grows_with_value_and_clamps() {
        assert_approx_eq!(coin_radius(1), 90.0);
        assert_approx_eq!(coin_radius(10), 180.0);
        assert_approx_eq!(coin_radius(1000), COIN_MAX_RADIUS);
    }

    #[test]
    fn test_normalize_angle() {
        assert_approx_eq!(normalize_angle(1.234), 1.23);
        assert_approx_eq!(normalize_angle(-std::f64::consts::FRAC_PI_2), 4.71);
        assert_approx_eq!(normalize_angle(0.0), 6.28);
        assert!(normalize_angle(0.001) > 0.0);
    }

    #[test]
    fn test_input_state_creation() {
        let input = InputState {
            sequence: 42,
            timestamp: 123456,
            input: ClientInput::Key {
                key: InputKey::Up,
                down: true,
            },
        };

        assert_eq!(input.sequence, 42);
        assert_eq!(input.timestamp, 123456);
        assert_eq!(
            input.input,
            ClientInput::Key {
                key: InputKey::Up,
                down: true
            }
        );
    }
}
