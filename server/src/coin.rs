use shared::{coin_radius, EntityId, EntityState, Field};

/// A pickup worth `value` coins. Despawns on its own after its lifetime.
#[derive(Debug, Clone)]
pub struct Coin {
    pub value: i64,
    pub hunter_id: Option<EntityId>,
    pub despawn_at_ms: u64,
}

impl Coin {
    pub fn new(value: i64, now_ms: u64, lifetime_ms: u64) -> Self {
        Self {
            value: value.max(1),
            hunter_id: None,
            despawn_at_ms: now_ms.saturating_add(lifetime_ms),
        }
    }

    pub fn radius(&self) -> f64 {
        coin_radius(self.value)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.despawn_at_ms
    }

    pub fn write_state(&self, state: &mut EntityState) {
        state.push(Field::Value, self.value);
        state.push(Field::HunterId, self.hunter_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_coin_expiry_is_strict() {
        let coin = Coin::new(1, 1_000, 120_000);
        assert!(!coin.is_expired(121_000));
        assert!(coin.is_expired(121_001));
    }

    #[test]
    fn test_coin_radius_follows_value() {
        assert_approx_eq!(Coin::new(1, 0, 1).radius(), 90.0);
        assert_approx_eq!(Coin::new(0, 0, 1).radius(), 90.0);
        assert_approx_eq!(Coin::new(50, 0, 1).radius(), 300.0);
    }

    #[test]
    fn test_unbounded_lifetime_saturates() {
        let coin = Coin::new(1, 5, u64::MAX);
        assert_eq!(coin.despawn_at_ms, u64::MAX);
        assert!(!coin.is_expired(u64::MAX));
    }
}
