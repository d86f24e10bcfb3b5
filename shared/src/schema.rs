//! Per-kind field schemas and the state records built from them
//!
//! Every synchronizable piece of entity data is named by a [`Field`] and
//! declared in exactly one kind's schema. The synchronizer diffs
//! [`EntityState`] records built in schema order; anything not declared here
//! stays local to the server or the client and never crosses the wire.

use crate::error::SchemaError;
use crate::shape::Shape;
use crate::{EntityId, COIN_MAX_RADIUS, ICE_SPIKE_MAX_RADIUS, PLAYER_MAX_RADIUS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Coin,
    IceSpike,
    /// Any kind this build does not know about. Receivers skip it.
    #[serde(other)]
    Unknown,
}

impl EntityKind {
    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Player => PLAYER_SCHEMA,
            EntityKind::Coin => COIN_SCHEMA,
            EntityKind::IceSpike => ICE_SPIKE_SCHEMA,
            EntityKind::Unknown => &[],
        }
    }

    pub fn spec(self, field: Field) -> Option<&'static FieldSpec> {
        self.schema().iter().find(|spec| spec.field == field)
    }

    pub fn is_known(self) -> bool {
        self != EntityKind::Unknown
    }

    /// Upper bound on the collision radius, which bounds collision cost.
    pub fn max_radius(self) -> f64 {
        match self {
            EntityKind::Player => PLAYER_MAX_RADIUS,
            EntityKind::Coin => COIN_MAX_RADIUS,
            EntityKind::IceSpike => ICE_SPIKE_MAX_RADIUS,
            EntityKind::Unknown => 0.0,
        }
    }

    /// Kinds this kind may never be placed on top of, and never reacts to.
    pub fn forbidden_entities(self) -> &'static [EntityKind] {
        match self {
            EntityKind::Coin => &[EntityKind::IceSpike],
            EntityKind::Player | EntityKind::IceSpike | EntityKind::Unknown => &[],
        }
    }

    pub fn forbids(self, other: EntityKind) -> bool {
        self.forbidden_entities().contains(&other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    X,
    Y,
    Radius,
    Name,
    Angle,
    Kills,
    Coins,
    Level,
    Evolution,
    Health,
    AbilityActive,
    AbilityCooldown,
    SwordSwingAngle,
    SwordSwingProgress,
    SwordSwingDuration,
    ViewportZoom,
    ChatMessage,
    Value,
    HunterId,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    Text,
    Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Entity(Option<EntityId>),
}

impl FieldValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Float(_) => ValueKind::Float,
            FieldValue::Int(_) => ValueKind::Int,
            FieldValue::Bool(_) => ValueKind::Bool,
            FieldValue::Text(_) => ValueKind::Text,
            FieldValue::Entity(_) => ValueKind::Entity,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            FieldValue::Entity(v) => *v,
            _ => None,
        }
    }

    /// Floats are kept to two decimals on the wire.
    fn quantized(self) -> Self {
        match self {
            FieldValue::Float(v) => FieldValue::Float((v * 100.0).round() / 100.0),
            other => other,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<Option<EntityId>> for FieldValue {
    fn from(v: Option<EntityId>) -> Self {
        FieldValue::Entity(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub field: Field,
    pub kind: ValueKind,
}

impl FieldSpec {
    const fn new(field: Field, kind: ValueKind) -> Self {
        Self { field, kind }
    }

    pub fn default_value(&self) -> FieldValue {
        match self.kind {
            ValueKind::Float => FieldValue::Float(0.0),
            ValueKind::Int => FieldValue::Int(0),
            ValueKind::Bool => FieldValue::Bool(false),
            ValueKind::Text => FieldValue::Text(String::new()),
            ValueKind::Entity => FieldValue::Entity(None),
        }
    }
}

const PLAYER_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(Field::X, ValueKind::Float),
    FieldSpec::new(Field::Y, ValueKind::Float),
    FieldSpec::new(Field::Radius, ValueKind::Float),
    FieldSpec::new(Field::Name, ValueKind::Text),
    FieldSpec::new(Field::Angle, ValueKind::Float),
    FieldSpec::new(Field::Kills, ValueKind::Int),
    FieldSpec::new(Field::Coins, ValueKind::Int),
    FieldSpec::new(Field::Level, ValueKind::Int),
    FieldSpec::new(Field::Evolution, ValueKind::Int),
    FieldSpec::new(Field::Health, ValueKind::Float),
    FieldSpec::new(Field::AbilityActive, ValueKind::Bool),
    FieldSpec::new(Field::AbilityCooldown, ValueKind::Float),
    FieldSpec::new(Field::SwordSwingAngle, ValueKind::Float),
    FieldSpec::new(Field::SwordSwingProgress, ValueKind::Float),
    FieldSpec::new(Field::SwordSwingDuration, ValueKind::Float),
    FieldSpec::new(Field::ViewportZoom, ValueKind::Float),
    FieldSpec::new(Field::ChatMessage, ValueKind::Text),
];

const COIN_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(Field::X, ValueKind::Float),
    FieldSpec::new(Field::Y, ValueKind::Float),
    FieldSpec::new(Field::Radius, ValueKind::Float),
    FieldSpec::new(Field::Value, ValueKind::Int),
    FieldSpec::new(Field::HunterId, ValueKind::Entity),
];

const ICE_SPIKE_SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(Field::X, ValueKind::Float),
    FieldSpec::new(Field::Y, ValueKind::Float),
    FieldSpec::new(Field::Radius, ValueKind::Float),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: Field,
    pub value: FieldValue,
}

impl FieldUpdate {
    pub fn new(field: Field, value: impl Into<FieldValue>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// Checks one update against a kind's schema.
pub fn validate_update(kind: EntityKind, update: &FieldUpdate) -> Result<(), SchemaError> {
    if !kind.is_known() {
        return Err(SchemaError::UnknownKind);
    }
    let spec = kind.spec(update.field).ok_or(SchemaError::UnknownField {
        kind,
        field: update.field,
    })?;
    let found = update.value.kind();
    if found != spec.kind {
        return Err(SchemaError::TypeMismatch {
            field: update.field,
            expected: spec.kind,
            found,
        });
    }
    Ok(())
}

/// Declared field values of one entity, in schema order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    fields: Vec<FieldUpdate>,
}

impl EntityState {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Starts a state with the base fields every kind declares.
    pub fn with_shape(shape: &Shape) -> Self {
        let mut state = Self {
            fields: Vec::with_capacity(8),
        };
        state.push(Field::X, shape.x);
        state.push(Field::Y, shape.y);
        state.push(Field::Radius, shape.radius());
        state
    }

    pub fn defaults(kind: EntityKind) -> Self {
        Self {
            fields: kind
                .schema()
                .iter()
                .map(|spec| FieldUpdate {
                    field: spec.field,
                    value: spec.default_value(),
                })
                .collect(),
        }
    }

    pub fn from_updates(updates: Vec<FieldUpdate>) -> Self {
        let mut state = Self::new();
        state.apply(&updates);
        state
    }

    pub fn push(&mut self, field: Field, value: impl Into<FieldValue>) {
        self.set(field, value.into());
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        let value = value.quantized();
        match self.fields.iter_mut().find(|update| update.field == field) {
            Some(existing) => existing.value = value,
            None => self.fields.push(FieldUpdate { field, value }),
        }
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|update| update.field == field)
            .map(|update| &update.value)
    }

    pub fn get_f64(&self, field: Field) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }

    pub fn get_i64(&self, field: Field) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_i64)
    }

    pub fn get_bool(&self, field: Field) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_bool)
    }

    pub fn get_str(&self, field: Field) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn fields(&self) -> &[FieldUpdate] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<FieldUpdate> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields whose value differs from `previous`, in this state's order.
    pub fn changes_since(&self, previous: &EntityState) -> Vec<FieldUpdate> {
        self.fields
            .iter()
            .filter(|update| previous.get(update.field) != Some(&update.value))
            .cloned()
            .collect()
    }

    pub fn apply(&mut self, changes: &[FieldUpdate]) {
        for change in changes {
            self.set(change.field, change.value.clone());
        }
    }

    pub fn validate(&self, kind: EntityKind) -> Result<(), SchemaError> {
        self.fields
            .iter()
            .try_for_each(|update| validate_update(kind, update))
    }
}
