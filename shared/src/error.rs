use crate::schema::{EntityKind, Field, ValueKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("unknown entity kind")]
    UnknownKind,

    #[error("field {field:?} is not declared for {kind:?}")]
    UnknownField { kind: EntityKind, field: Field },

    #[error("field {field:?} expects {expected:?}, got {found:?}")]
    TypeMismatch {
        field: Field,
        expected: ValueKind,
        found: ValueKind,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("shape radius must be positive, got {0}")]
    NonPositiveRadius(f64),
}
