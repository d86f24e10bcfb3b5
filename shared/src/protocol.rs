//! Wire messages exchanged over the per-client channel

use crate::error::ProtocolError;
use crate::flags::Flag;
use crate::schema::{EntityKind, FieldUpdate};
use crate::{ClientId, EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
        account_id: Option<u64>,
    },
    Input(InputState),
    Disconnect,

    Connected {
        client_id: ClientId,
        /// How long clients keep a removed entity on screen before dropping it.
        remove_transition_ms: u64,
    },
    FullSnapshot(FullSnapshot),
    StateDiff(StateDiff),
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(ProtocolError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(bytes).map_err(ProtocolError::Decode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputKey {
    Up,
    Down,
    Left,
    Right,
    SwordSwing,
    Ability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientInput {
    Key { key: InputKey, down: bool },
    /// Aim angle in radians, normalized to `(0, 2π]`.
    Angle(f64),
    Chat(String),
    Respawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub input: ClientInput,
}

/// Every active entity's full declared state; the first message a client gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSnapshot {
    pub tick: u64,
    pub ack: u32,
    pub self_id: Option<EntityId>,
    pub entities: Vec<EntitySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub fields: Vec<FieldUpdate>,
    pub flags: Vec<Flag>,
}

/// Changes since the last message sent to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    pub tick: u64,
    pub ack: u32,
    pub self_id: Option<EntityId>,
    pub entities: Vec<EntityDiff>,
    pub removed_ids: Vec<EntityId>,
}

impl StateDiff {
    pub fn entity(&self, id: EntityId) -> Option<&EntityDiff> {
        self.entities.iter().find(|diff| diff.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff {
    pub id: EntityId,
    /// Present the first time a client hears about the entity.
    pub kind: Option<EntityKind>,
    pub fields: Vec<FieldUpdate>,
    pub flags: Vec<Flag>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.fields.is_empty() && self.flags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    #[test]
    fn test_packet_serialization_connect() {
        let packet = Packet::Connect {
            client_version: 1,
            name: "knight".to_string(),
            account_id: Some(9),
        };
        let bytes = packet.to_bytes().unwrap();

        match Packet::from_bytes(&bytes).unwrap() {
            Packet::Connect {
                client_version,
                name,
                account_id,
            } => {
                assert_eq!(client_version, 1);
                assert_eq!(name, "knight");
                assert_eq!(account_id, Some(9));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_state_diff() {
        let diff = StateDiff {
            tick: 42,
            ack: 7,
            self_id: Some(3),
            entities: vec![EntityDiff {
                id: 3,
                kind: None,
                fields: vec![FieldUpdate::new(Field::Coins, 5i64)],
                flags: vec![Flag::GetCoin],
            }],
            removed_ids: vec![8],
        };
        let bytes = Packet::StateDiff(diff.clone()).to_bytes().unwrap();

        match Packet::from_bytes(&bytes).unwrap() {
            Packet::StateDiff(decoded) => assert_eq!(decoded, diff),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_malformed_packet_is_an_error() {
        let bytes = Packet::Disconnect.to_bytes().unwrap();
        assert!(Packet::from_bytes(&[]).is_err());
        assert!(Packet::from_bytes(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());
        assert!(Packet::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_entity_diff_is_empty() {
        let mut diff = EntityDiff {
            id: 1,
            kind: None,
            fields: Vec::new(),
            flags: Vec::new(),
        };
        assert!(diff.is_empty());
        diff.flags.push(Flag::Damaged);
        assert!(!diff.is_empty());
    }
}
