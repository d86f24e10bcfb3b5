//! Persistence boundary for per-account game statistics
//!
//! The simulation reports one [`GameRecord`] whenever a registered player's
//! life ends. What happens to it (a database, a remote service, a log line)
//! is up to the [`StatsSink`] the server was built with.

use crate::entity::LifeEnded;
use log::info;
use std::collections::HashMap;
use std::sync::Mutex;

/// Experience granted per kill on top of one per coin.
pub const XP_PER_KILL: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameRecord {
    pub account_id: u64,
    pub xp: i64,
    pub coins: i64,
    pub kills: i64,
    pub playtime_secs: u64,
    pub games: u32,
}

impl GameRecord {
    pub fn from_life(account_id: u64, life: &LifeEnded) -> Self {
        Self {
            account_id,
            xp: life.coins + XP_PER_KILL * life.kills,
            coins: life.coins,
            kills: life.kills,
            playtime_secs: life.playtime_ms / 1000,
            games: 1,
        }
    }

    /// Adds another record's counters into this one.
    pub fn accumulate(&mut self, other: &GameRecord) {
        self.xp += other.xp;
        self.coins += other.coins;
        self.kills += other.kills;
        self.playtime_secs += other.playtime_secs;
        self.games += other.games;
    }
}

pub trait StatsSink: Send + Sync {
    fn record_game(&self, record: GameRecord);
}

/// Writes every record to the log.
#[derive(Debug, Default)]
pub struct LogStatsSink;

impl StatsSink for LogStatsSink {
    fn record_game(&self, record: GameRecord) {
        info!(
            "Account {}: +{} xp, {} coins, {} kills, {}s played",
            record.account_id, record.xp, record.coins, record.kills, record.playtime_secs
        );
    }
}

/// Keeps running totals per account in memory.
#[derive(Debug, Default)]
pub struct MemoryStatsSink {
    totals: Mutex<HashMap<u64, GameRecord>>,
}

impl MemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self, account_id: u64) -> Option<GameRecord> {
        self.totals
            .lock()
            .ok()
            .and_then(|totals| totals.get(&account_id).copied())
    }

    pub fn accounts(&self) -> usize {
        self.totals.lock().map(|totals| totals.len()).unwrap_or(0)
    }
}

impl StatsSink for MemoryStatsSink {
    fn record_game(&self, record: GameRecord) {
        let Ok(mut totals) = self.totals.lock() else {
            return;
        };
        totals
            .entry(record.account_id)
            .or_insert_with(|| GameRecord {
                account_id: record.account_id,
                ..GameRecord::default()
            })
            .accumulate(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn life(coins: i64, kills: i64, playtime_ms: u64) -> LifeEnded {
        LifeEnded {
            entity: 1,
            killer: None,
            coins,
            kills,
            playtime_ms,
        }
    }

    #[test]
    fn test_record_from_life() {
        let record = GameRecord::from_life(9, &life(12, 2, 61_500));
        assert_eq!(record.account_id, 9);
        assert_eq!(record.xp, 32);
        assert_eq!(record.coins, 12);
        assert_eq!(record.kills, 2);
        assert_eq!(record.playtime_secs, 61);
        assert_eq!(record.games, 1);
    }

    #[test]
    fn test_memory_sink_sums_every_counter() {
        let sink = MemoryStatsSink::new();
        sink.record_game(GameRecord::from_life(3, &life(5, 0, 10_000)));
        sink.record_game(GameRecord::from_life(3, &life(1, 1, 2_000)));
        sink.record_game(GameRecord::from_life(4, &life(2, 0, 1_000)));

        let totals = sink.totals(3).unwrap();
        assert_eq!(totals.coins, 6);
        assert_eq!(totals.kills, 1);
        assert_eq!(totals.xp, 16);
        assert_eq!(totals.playtime_secs, 12);
        assert_eq!(totals.games, 2);
        assert_eq!(sink.accounts(), 2);
        assert!(sink.totals(5).is_none());
    }
}
