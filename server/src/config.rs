//! Game tuning loaded from an optional JSON file
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides. Command line flags are applied on top by the binary.

use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::{COIN_DESPAWN_MS, REMOVE_TRANSITION_MS, WORLD_HEIGHT, WORLD_WIDTH};
use std::path::Path;
use std::time::Duration;

/// Longest coin lifetime a config may ask for: one day.
pub const MAX_COIN_LIFETIME_MS: u64 = 24 * 60 * 60 * 1000;
/// Largest value a configured coin may roll.
pub const MAX_COIN_VALUE: i64 = 1_000_000;

/// Inclusive integer range a coin value is rolled from.
///
/// Written either as a single number `n` (meaning `[n, n]`) or as a
/// two-element array `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawValueRange", into = "RawValueRange")]
pub struct ValueRange {
    min: i64,
    max: i64,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawValueRange {
    Single(i64),
    Pair([i64; 2]),
}

impl From<RawValueRange> for ValueRange {
    fn from(raw: RawValueRange) -> Self {
        match raw {
            RawValueRange::Single(n) => ValueRange { min: n, max: n },
            RawValueRange::Pair([min, max]) => ValueRange { min, max },
        }
    }
}

impl From<ValueRange> for RawValueRange {
    fn from(range: ValueRange) -> Self {
        if range.min == range.max {
            RawValueRange::Single(range.min)
        } else {
            RawValueRange::Pair([range.min, range.max])
        }
    }
}

impl ValueRange {
    pub fn new(min: i64, max: i64) -> Result<Self, ConfigError> {
        let range = ValueRange { min, max };
        range.check()?;
        Ok(range)
    }

    pub fn fixed(value: i64) -> Result<Self, ConfigError> {
        Self::new(value, value)
    }

    /// A single-value range for values the server computed itself; floored at 1.
    pub fn exact(value: i64) -> Self {
        let value = value.max(1);
        ValueRange {
            min: value,
            max: value,
        }
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// Ranges must be non-empty and strictly positive.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.min < 1 || self.min > self.max {
            return Err(ConfigError::InvalidValueRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    pub fn roll<R: Rng>(&self, rng: &mut R) -> i64 {
        if self.min >= self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        ValueRange { min: 1, max: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinTemplate {
    /// Coins kept in the world at all times.
    pub count: usize,
    pub value: ValueRange,
    pub lifetime_ms: u64,
    pub respawnable: bool,
}

impl Default for CoinTemplate {
    fn default() -> Self {
        Self {
            count: 60,
            value: ValueRange::default(),
            lifetime_ms: COIN_DESPAWN_MS,
            respawnable: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceSpikeTemplate {
    pub count: usize,
    pub respawnable: bool,
}

impl Default for IceSpikeTemplate {
    fn default() -> Self {
        Self {
            count: 12,
            respawnable: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    pub world_width: f64,
    pub world_height: f64,
    pub max_clients: usize,
    /// Positions tried per spawn request before it is deferred to the next tick.
    pub placement_attempts: u32,
    pub coins: CoinTemplate,
    pub ice_spikes: IceSpikeTemplate,
    pub remove_transition_ms: u64,
    /// Seed for spawn placement and value rolls; random when absent.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            max_clients: 32,
            placement_attempts: 16,
            coins: CoinTemplate::default(),
            ice_spikes: IceSpikeTemplate::default(),
            remove_transition_ms: REMOVE_TRANSITION_MS,
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 240 {
            return Err(ConfigError::Invalid(format!(
                "tick_rate must be within 1..=240, got {}",
                self.tick_rate
            )));
        }
        if !(self.world_width > 0.0 && self.world_height > 0.0) {
            return Err(ConfigError::Invalid(
                "world dimensions must be positive".to_string(),
            ));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid(
                "max_clients must be at least 1".to_string(),
            ));
        }
        if self.placement_attempts == 0 {
            return Err(ConfigError::Invalid(
                "placement_attempts must be at least 1".to_string(),
            ));
        }
        if self.coins.lifetime_ms == 0 || self.coins.lifetime_ms > MAX_COIN_LIFETIME_MS {
            return Err(ConfigError::Invalid(format!(
                "coins.lifetime_ms must be within 1..={}, got {}",
                MAX_COIN_LIFETIME_MS, self.coins.lifetime_ms
            )));
        }
        self.coins.value.check()?;
        if self.coins.value.max() > MAX_COIN_VALUE {
            return Err(ConfigError::Invalid(format!(
                "coins.value must not exceed {}, got {}",
                MAX_COIN_VALUE,
                self.coins.value.max()
            )));
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn tick_ms(&self) -> f64 {
        1000.0 / f64::from(self.tick_rate.max(1))
    }
}
