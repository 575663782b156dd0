//! Attack primitives: ordered operation sequences against a target.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::sha256_hex;
use crate::target::{RecordField, TargetDescriptor, TargetKind};
use crate::value::{Combinator, ValueSource};

/// Offsets at or beyond this many words count as far overruns.
pub const FAR_OFFSET_WORDS: i64 = 16;

/// Stable identifier of a primitive within a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimitiveId(String);

impl PrimitiveId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Word offset relative to the target base, with its derivation.
///
/// Offsets are deliberately unconstrained by the target's extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offset {
    /// Direct index from the base.
    Index(i64),
    /// Base moved by `shift` words, then indexed by `index`.
    Shifted { shift: i64, index: i64 },
    /// Iteration `step` of a loop starting at `start` moving by `stride`.
    Strided { start: i64, stride: i64, step: i64 },
}

/// How an offset was produced, with parameters erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetKind {
    /// Index 0.
    Base,
    /// Small positive index.
    Near,
    /// Index of [`FAR_OFFSET_WORDS`] or more.
    Far,
    /// Negative direct index.
    Below,
    /// Pointer shift followed by an index.
    Shifted,
    /// Derived from a loop variable.
    Loop,
}

impl Offset {
    pub const BASE: Self = Self::Index(0);

    #[must_use]
    pub const fn effective(self) -> i64 {
        match self {
            Self::Index(i) => i,
            Self::Shifted { shift, index } => shift.wrapping_add(index),
            Self::Strided {
                start,
                stride,
                step,
            } => start.wrapping_add(stride.wrapping_mul(step)),
        }
    }

    #[must_use]
    pub const fn kind(self) -> OffsetKind {
        match self {
            Self::Index(0) => OffsetKind::Base,
            Self::Index(i) if i < 0 => OffsetKind::Below,
            Self::Index(i) if i < FAR_OFFSET_WORDS => OffsetKind::Near,
            Self::Index(_) => OffsetKind::Far,
            Self::Shifted { .. } => OffsetKind::Shifted,
            Self::Strided { .. } => OffsetKind::Loop,
        }
    }

    /// Loop iterations `0..count` of a strided walk.
    pub fn strided(start: i64, stride: i64, count: i64) -> impl Iterator<Item = Self> {
        (0..count).map(move |step| Self::Strided {
            start,
            stride,
            step,
        })
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Shifted { shift, index } => write!(f, "(base+{shift})[{index}]"),
            Self::Strided {
                start,
                stride,
                step,
            } => write!(f, "[{start}+{stride}*{step}]"),
        }
    }
}

/// Runtime predicate guarding a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Predicate the native side fixed at build time.
    Constant(bool),
    /// Predicate unknown until the call; treated as taken.
    Opaque,
}

impl Guard {
    #[must_use]
    pub const fn may_be_taken(self) -> bool {
        !matches!(self, Self::Constant(false))
    }
}

/// One step of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Read {
        offset: Offset,
    },
    Write {
        offset: Offset,
        value: ValueSource,
    },
    GuardedWrite {
        offset: Offset,
        value: ValueSource,
        guard: Guard,
    },
    /// Relinquish the allocation at `offset` (the handle itself at the base).
    Release {
        offset: Offset,
    },
    /// Allocate a fresh block holding `seed` and store its address at `offset`.
    Alias {
        offset: Offset,
        seed: ValueSource,
    },
}

/// Operation tag with parameters erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Read,
    Write,
    GuardedWrite,
    Release,
    Alias,
}

impl Operation {
    #[must_use]
    pub const fn write(offset: i64, value: ValueSource) -> Self {
        Self::Write {
            offset: Offset::Index(offset),
            value,
        }
    }

    #[must_use]
    pub const fn read(offset: i64) -> Self {
        Self::Read {
            offset: Offset::Index(offset),
        }
    }

    /// Release of the handle itself.
    #[must_use]
    pub const fn release() -> Self {
        Self::Release {
            offset: Offset::BASE,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> OpKind {
        match self {
            Self::Read { .. } => OpKind::Read,
            Self::Write { .. } => OpKind::Write,
            Self::GuardedWrite { .. } => OpKind::GuardedWrite,
            Self::Release { .. } => OpKind::Release,
            Self::Alias { .. } => OpKind::Alias,
        }
    }

    #[must_use]
    pub const fn offset(&self) -> Offset {
        match self {
            Self::Read { offset }
            | Self::Write { offset, .. }
            | Self::GuardedWrite { offset, .. }
            | Self::Release { offset }
            | Self::Alias { offset, .. } => *offset,
        }
    }

    /// Value stored by a word-storing operation (the seed, for an alias).
    #[must_use]
    pub const fn value(&self) -> Option<&ValueSource> {
        match self {
            Self::Write { value, .. } | Self::GuardedWrite { value, .. } => Some(value),
            Self::Alias { seed, .. } => Some(seed),
            Self::Read { .. } | Self::Release { .. } => None,
        }
    }

    /// False only for writes behind a guard fixed to false.
    #[must_use]
    pub const fn may_execute(&self) -> bool {
        match self {
            Self::GuardedWrite { guard, .. } => guard.may_be_taken(),
            _ => true,
        }
    }

    /// True for operations that store a word.
    #[must_use]
    pub const fn stores(&self) -> bool {
        matches!(
            self,
            Self::Write { .. } | Self::GuardedWrite { .. } | Self::Alias { .. }
        )
    }
}

/// The last store landing on one effective offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveWrite {
    /// Index of the operation in the primitive.
    pub index: usize,
    pub offset: i64,
    pub value: ValueSource,
    /// Stored word is a fresh block address holding `value`.
    pub aliased: bool,
}

/// Where an operation lands, parameters erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Place {
    /// A named record field; structural for record targets.
    Field(RecordField),
    Offset(OffsetKind),
}

/// Shape of one operation with parameters erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpShape {
    pub op: OpKind,
    pub place: Place,
    pub value: Option<Combinator>,
}

/// De-duplication key: target kind, erased operation shape, value combinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeKey {
    pub target: Option<TargetKind>,
    pub operations: Vec<OpShape>,
    pub returns: Option<Combinator>,
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self.target.map_or("none", TargetKind::as_str);
        write!(f, "{target}:")?;
        for shape in &self.operations {
            write!(f, " {:?}@{:?}", shape.op, shape.place)?;
            if let Some(value) = shape.value {
                write!(f, "={value:?}")?;
            }
        }
        if let Some(returns) = self.returns {
            write!(f, " -> {returns:?}")?;
        }
        Ok(())
    }
}

/// One operation sequence against a target descriptor.
///
/// Built once by the generator and never mutated afterwards; a changed
/// recipe is a new primitive with a new id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackPrimitive {
    id: PrimitiveId,
    target: Option<TargetDescriptor>,
    operations: Vec<Operation>,
    returns: Option<ValueSource>,
}

impl AttackPrimitive {
    /// Start a primitive against `target` with no operations.
    #[must_use]
    pub fn new(id: impl Into<String>, target: Option<TargetDescriptor>) -> Self {
        Self {
            id: PrimitiveId::new(id),
            target,
            operations: Vec::new(),
            returns: None,
        }
    }

    /// Primitive with no target that only returns a word to the host.
    #[must_use]
    pub fn returning_only(id: impl Into<String>, value: ValueSource) -> Self {
        Self::new(id, None).returning(value)
    }

    /// Append an operation.
    #[must_use]
    pub fn with_op(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// Append several operations.
    #[must_use]
    pub fn with_ops(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.operations.extend(ops);
        self
    }

    /// Set the word returned to the host.
    #[must_use]
    pub fn returning(mut self, value: ValueSource) -> Self {
        self.returns = Some(value);
        self
    }

    /// Same recipe under a different id.
    #[must_use]
    pub(crate) fn renamed(mut self, id: impl Into<String>) -> Self {
        self.id = PrimitiveId::new(id);
        self
    }

    #[must_use]
    pub fn id(&self) -> &PrimitiveId {
        &self.id
    }

    #[must_use]
    pub fn target(&self) -> Option<TargetDescriptor> {
        self.target
    }

    #[must_use]
    pub fn target_kind(&self) -> Option<TargetKind> {
        self.target.map(TargetDescriptor::kind)
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn returns(&self) -> Option<&ValueSource> {
        self.returns.as_ref()
    }

    /// True when a call may store into or release target memory.
    #[must_use]
    pub fn mutates_target(&self) -> bool {
        self.operations.iter().any(|op| {
            op.may_execute() && (op.stores() || matches!(op, Operation::Release { .. }))
        })
    }

    /// Final store per effective offset, in order of first touch.
    ///
    /// A decoy store overwritten later at the same offset is folded away.
    #[must_use]
    pub fn effective_writes(&self) -> Vec<EffectiveWrite> {
        let mut order: Vec<i64> = Vec::new();
        let mut last: HashMap<i64, EffectiveWrite> = HashMap::new();
        for (index, op) in self.operations.iter().enumerate() {
            if !op.may_execute() {
                continue;
            }
            let Some(value) = op.value() else {
                continue;
            };
            let offset = op.offset().effective();
            if !last.contains_key(&offset) {
                order.push(offset);
            }
            last.insert(
                offset,
                EffectiveWrite {
                    index,
                    offset,
                    value: *value,
                    aliased: matches!(op, Operation::Alias { .. }),
                },
            );
        }
        order.into_iter().filter_map(|o| last.remove(&o)).collect()
    }

    /// De-duplication key with parameters erased.
    #[must_use]
    pub fn shape(&self) -> ShapeKey {
        let on_record = matches!(self.target, Some(TargetDescriptor::RecordTriple));
        let operations = self
            .operations
            .iter()
            .map(|op| {
                let offset = op.offset();
                let place = match RecordField::from_offset(offset.effective()) {
                    Some(field) if on_record => Place::Field(field),
                    _ => Place::Offset(offset.kind()),
                };
                OpShape {
                    op: op.kind(),
                    place,
                    value: op.value().map(ValueSource::combinator),
                }
            })
            .collect();
        ShapeKey {
            target: self.target_kind(),
            operations,
            returns: self.returns.as_ref().map(ValueSource::combinator),
        }
    }

    /// SHA-256 over the canonical recipe (id excluded).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let recipe = (&self.target, &self.operations, &self.returns);
        let bytes = serde_json::to_vec(&recipe).expect("recipe types always serialize");
        sha256_hex(&bytes)
    }
}
