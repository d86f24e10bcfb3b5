//! Transient per-tick event markers
//!
//! A flag says "this happened to this entity during tick T". Flags are never
//! part of steady state: the simulation records them in a [`FlagLog`], the log
//! is drained into the tick output, and the synchronizer delivers each event to
//! each client once.

use crate::EntityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// The entity picked up a coin.
    GetCoin,
    /// The entity hit the referenced entity.
    EnemyHit(EntityId),
    /// The entity took damage.
    Damaged,
    /// The entity reached a new level.
    LevelUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEvent {
    pub tick: u64,
    pub entity: EntityId,
    pub flag: Flag,
}

/// Ordered event log for the tick in progress.
#[derive(Debug, Clone, Default)]
pub struct FlagLog {
    tick: u64,
    events: Vec<FlagEvent>,
}

impl FlagLog {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            events: Vec::new(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn set(&mut self, entity: EntityId, flag: Flag) {
        self.events.push(FlagEvent {
            tick: self.tick,
            entity,
            flag,
        });
    }

    pub fn is_set(&self, entity: EntityId, flag: Flag) -> bool {
        self.events
            .iter()
            .any(|event| event.entity == entity && event.flag == flag)
    }

    pub fn for_entity(&self, entity: EntityId) -> impl Iterator<Item = &FlagEvent> {
        self.events.iter().filter(move |event| event.entity == entity)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hands the recorded events over; the log is left empty.
    pub fn take(&mut self) -> Vec<FlagEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_stamped_with_tick_and_kept_in_order() {
        let mut log = FlagLog::new(12);
        log.set(3, Flag::Damaged);
        log.set(1, Flag::GetCoin);
        log.set(3, Flag::EnemyHit(1));

        assert_eq!(log.len(), 3);
        assert!(log.is_set(1, Flag::GetCoin));
        assert!(!log.is_set(1, Flag::Damaged));

        let flags: Vec<Flag> = log.for_entity(3).map(|event| event.flag).collect();
        assert_eq!(flags, vec![Flag::Damaged, Flag::EnemyHit(1)]);

        let events = log.take();
        assert!(events.iter().all(|event| event.tick == 12));
        assert!(log.is_empty());
    }
}
