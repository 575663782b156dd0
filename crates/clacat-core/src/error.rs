//! Generator and classifier failures.
//!
//! Faults raised by *executing* a primitive are not errors of this crate;
//! hosts report them as outcomes.

use thiserror::Error;

use crate::classify::AttackClass;
use crate::primitive::{PrimitiveId, ShapeKey};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{class} space holds {available} distinct primitives, {requested} requested")]
    SpaceExhausted {
        class: AttackClass,
        requested: usize,
        available: usize,
    },
    #[error("primitive {id} duplicates shape {shape}")]
    DuplicatePrimitive { id: PrimitiveId, shape: ShapeKey },
    #[error("classification of {id} is not deterministic")]
    NonDeterministicClassification { id: PrimitiveId },
    #[error("primitive {id} generated for {expected} classifies as {actual}")]
    Misclassified {
        id: PrimitiveId,
        expected: AttackClass,
        actual: AttackClass,
    },
    #[error("unknown primitive id: {0}")]
    UnknownPrimitive(String),
    #[error("label row {row}: {message}")]
    InvalidLabel { row: usize, message: String },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
