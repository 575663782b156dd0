//! Cross-language attack catalog core.
//!
//! This crate models small native-side operations that receive raw addresses
//! or integers from a safety-tracked host and corrupt, misinterpret or forge
//! them. It provides:
//! - [`AttackPrimitive`]: an operation recipe against a [`TargetDescriptor`]
//! - [`classify`]: the structural classification engine (Safe, Class 1..5)
//! - [`SequenceState`]: call-order-dependent state for forged callback returns
//! - [`VariantGenerator`]: closed, de-duplicated enumeration of the taxonomy
//! - [`Catalog`]: ordered `(primitive, classification)` pairs and their
//!   persisted record form
//! - [`evaluate`]: scores predicted labels against a ground-truth label set

#![forbid(unsafe_code)]

pub mod catalog;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod evaluate;
pub mod forge;
pub mod generate;
pub mod primitive;
pub mod sequence;
pub mod target;
pub mod value;

pub use catalog::{
    CATALOG_FORMAT_VERSION, CallbackSlot, Catalog, CatalogDocument, CatalogEntry, CatalogRecord,
    records_digest,
};
pub use classify::{AttackClass, Classification, RiskLevel, classify};
pub use config::{CoverageMode, GeneratorConfig, parse_seed};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, NullSink};
pub use error::CatalogError;
pub use evaluate::{
    ClassMetrics, ConfusionMatrix, Evaluation, LabelSet, Mismatch, evaluate, parse_label,
};
pub use forge::{FixedForge, ForgeSource};
pub use generate::VariantGenerator;
pub use primitive::{
    AttackPrimitive, EffectiveWrite, Guard, Offset, OffsetKind, Operation, PrimitiveId, ShapeKey,
};
pub use sequence::{SequenceKind, SequenceRecipe, SequenceState, replay};
pub use target::{RecordField, TargetDescriptor, TargetKind};
pub use value::{
    CombineOp, Combinator, Detached, MaskLane, Operand, OperandKind, Transform, TransformKind,
    ValueContext, ValueSource,
};
