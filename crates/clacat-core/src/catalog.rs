//! Catalog assembly, persistence, and per-instance callback state.
//!
//! A catalog is the ordered `(primitive, classification)` list handed to a
//! host harness. Its persisted form is a [`CatalogDocument`]: one
//! [`CatalogRecord`] per primitive plus a digest over the records, stable
//! for a given generator configuration.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classify::{AttackClass, Classification, RiskLevel, classify};
use crate::config::GeneratorConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::CatalogError;
use crate::forge::ForgeSource;
use crate::generate::VariantGenerator;
use crate::primitive::{AttackPrimitive, PrimitiveId, ShapeKey};
use crate::sequence::SequenceState;
use crate::target::TargetKind;
use crate::value::{Detached, ValueSource};

/// Version of the persisted document layout.
pub const CATALOG_FORMAT_VERSION: u32 = 1;

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// A primitive together with its derived classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    primitive: AttackPrimitive,
    classification: Classification,
}

impl CatalogEntry {
    #[must_use]
    pub fn primitive(&self) -> &AttackPrimitive {
        &self.primitive
    }

    #[must_use]
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    #[must_use]
    pub fn id(&self) -> &PrimitiveId {
        self.primitive.id()
    }

    #[must_use]
    pub fn class(&self) -> AttackClass {
        self.classification.class
    }

    #[must_use]
    pub fn record(&self) -> CatalogRecord {
        CatalogRecord {
            id: self.primitive.id().clone(),
            class: self.classification.class,
            class_code: self.classification.class.code(),
            risk: self.classification.risk,
            target_kind: self.primitive.target_kind(),
            rationale: self.classification.rationale.clone(),
            fingerprint: self.primitive.fingerprint(),
        }
    }
}

/// Persisted form of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: PrimitiveId,
    pub class: AttackClass,
    pub class_code: u8,
    pub risk: RiskLevel,
    pub target_kind: Option<TargetKind>,
    pub rationale: String,
    pub fingerprint: String,
}

/// Persisted catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub version: u32,
    pub seed: u64,
    pub digest: String,
    pub records: Vec<CatalogRecord>,
}

impl CatalogDocument {
    #[must_use]
    pub fn new(seed: u64, records: Vec<CatalogRecord>) -> Self {
        Self {
            version: CATALOG_FORMAT_VERSION,
            seed,
            digest: records_digest(&records),
            records,
        }
    }

    /// True when `digest` matches the records.
    #[must_use]
    pub fn digest_matches(&self) -> bool {
        self.digest == records_digest(&self.records)
    }

    pub fn to_json(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn write_file(&self, path: &Path) -> Result<(), CatalogError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// SHA-256 over the canonical JSON of `records`.
#[must_use]
pub fn records_digest(records: &[CatalogRecord]) -> String {
    let bytes = serde_json::to_vec(records).expect("catalog records always serialize");
    sha256_hex(&bytes)
}

/// Per-instance runtime for a primitive that returns a word to the host.
///
/// Owns the instance's [`SequenceState`]; a slot is never shared between
/// primitives or callers.
#[derive(Debug, Clone)]
pub struct CallbackSlot {
    id: PrimitiveId,
    value: ValueSource,
    state: Option<SequenceState>,
    calls: u64,
}

impl CallbackSlot {
    /// Fresh slot for `primitive`, or `None` if it returns nothing.
    #[must_use]
    pub fn new(primitive: &AttackPrimitive) -> Option<Self> {
        let value = *primitive.returns()?;
        let state = match value {
            ValueSource::Sequenced(recipe) => Some(SequenceState::new(recipe)),
            _ => None,
        };
        Some(Self {
            id: primitive.id().clone(),
            value,
            state,
            calls: 0,
        })
    }

    #[must_use]
    pub fn id(&self) -> &PrimitiveId {
        &self.id
    }

    #[must_use]
    pub const fn calls(&self) -> u64 {
        self.calls
    }

    #[must_use]
    pub fn is_sequenced(&self) -> bool {
        self.state.is_some()
    }

    /// One call: draw a forged word, produce the returned word, report it.
    pub fn invoke(&mut self, forge: &mut dyn ForgeSource, sink: &dyn DiagnosticSink) -> u64 {
        let forged = forge.forge();
        let value = self.value.evaluate(forged, &Detached, self.state.as_mut());
        self.calls += 1;
        sink.report(
            Diagnostic::new(self.id.clone(), format!("callback_return#{}", self.calls))
                .with_value(value),
        );
        value
    }

    /// Forget every call made so far.
    pub fn reset(&mut self) {
        self.calls = 0;
        if let Some(state) = self.state.as_mut() {
            state.reset();
        }
    }
}

/// Ordered, classified primitives.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    seed: u64,
    entries: Vec<CatalogEntry>,
    index: HashMap<PrimitiveId, usize>,
}

impl Catalog {
    /// Generate and classify the full catalog for `config`.
    pub fn generate(config: GeneratorConfig) -> Result<Self, CatalogError> {
        let primitives = VariantGenerator::new(config).generate_all()?;
        Self::from_primitives(config.seed, primitives)
    }

    /// Classify `primitives` in order.
    ///
    /// Fails on a repeated id, on two primitives of one class sharing a
    /// shape, and on a classification that differs between two passes.
    pub fn from_primitives(
        seed: u64,
        primitives: impl IntoIterator<Item = AttackPrimitive>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            seed,
            ..Self::default()
        };
        let mut shapes: HashSet<(AttackClass, ShapeKey)> = HashSet::new();
        for primitive in primitives {
            let classification = classify(&primitive);
            if classify(&primitive) != classification {
                return Err(CatalogError::NonDeterministicClassification {
                    id: primitive.id().clone(),
                });
            }
            let shape = primitive.shape();
            if catalog.index.contains_key(primitive.id())
                || !shapes.insert((classification.class, shape.clone()))
            {
                return Err(CatalogError::DuplicatePrimitive {
                    id: primitive.id().clone(),
                    shape,
                });
            }
            catalog
                .index
                .insert(primitive.id().clone(), catalog.entries.len());
            catalog.entries.push(CatalogEntry {
                primitive,
                classification,
            });
        }
        Ok(catalog)
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.index
            .get(&PrimitiveId::new(id))
            .and_then(|&i| self.entries.get(i))
    }

    pub fn by_class(&self, class: AttackClass) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |e| e.class() == class)
    }

    /// Count of entries per class, in class order.
    #[must_use]
    pub fn class_counts(&self) -> Vec<(AttackClass, usize)> {
        AttackClass::ALL
            .into_iter()
            .map(|class| (class, self.by_class(class).count()))
            .collect()
    }

    /// Re-classify every entry and compare with the stored label.
    pub fn verify_determinism(&self) -> Result<(), CatalogError> {
        for entry in &self.entries {
            if classify(&entry.primitive) != entry.classification {
                return Err(CatalogError::NonDeterministicClassification {
                    id: entry.id().clone(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn document(&self) -> CatalogDocument {
        CatalogDocument::new(
            self.seed,
            self.entries.iter().map(CatalogEntry::record).collect(),
        )
    }

    /// A fresh callback slot for every forged-capability entry.
    #[must_use]
    pub fn instantiate_callbacks(&self) -> Vec<CallbackSlot> {
        self.by_class(AttackClass::ForgedCapability)
            .filter_map(|e| CallbackSlot::new(&e.primitive))
            .collect()
    }

    /// A fresh callback slot for the entry `id`.
    pub fn callback(&self, id: &str) -> Result<CallbackSlot, CatalogError> {
        self.get(id)
            .and_then(|e| CallbackSlot::new(&e.primitive))
            .ok_or_else(|| CatalogError::UnknownPrimitive(id.to_string()))
    }
}
