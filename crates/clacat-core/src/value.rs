//! Value sources: how the word a primitive writes or returns is produced.

use serde::{Deserialize, Serialize};

use crate::sequence::{SequenceKind, SequenceRecipe, SequenceState, replay};

/// Where a non-forged input word comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A literal word.
    Constant(u64),
    /// Contents of the target word at `offset`, as they were on entry.
    Slot(i64),
    /// Address of a local on the native call frame.
    StackAddress,
    /// The target's own base address.
    BaseAddress,
}

/// [`Operand`] with its parameter erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    Constant,
    Slot,
    StackAddress,
    BaseAddress,
}

impl Operand {
    #[must_use]
    pub const fn kind(self) -> OperandKind {
        match self {
            Self::Constant(_) => OperandKind::Constant,
            Self::Slot(_) => OperandKind::Slot,
            Self::StackAddress => OperandKind::StackAddress,
            Self::BaseAddress => OperandKind::BaseAddress,
        }
    }

    /// Resolve the operand against the invocation context.
    #[must_use]
    pub fn resolve(self, ctx: &dyn ValueContext) -> u64 {
        match self {
            Self::Constant(v) => v,
            Self::Slot(offset) => ctx.slot(offset),
            Self::StackAddress => ctx.stack_address(),
            Self::BaseAddress => ctx.base_address(),
        }
    }

    fn describe(self) -> String {
        match self {
            Self::Constant(v) => format!("constant {v:#x}"),
            Self::Slot(offset) => format!("original word [{offset}]"),
            Self::StackAddress => "a native stack address".to_string(),
            Self::BaseAddress => "the handle's own address".to_string(),
        }
    }
}

/// 32-bit lane selected by [`CombineOp::AndMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskLane {
    High32,
    Low32,
}

impl MaskLane {
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Self::High32 => 0xFFFF_FFFF_0000_0000,
            Self::Low32 => 0x0000_0000_FFFF_FFFF,
        }
    }
}

/// How a forged word is merged with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOp {
    /// Forged word replaces the operand.
    Assign,
    Xor,
    Or,
    /// Operand bits outside the lane, forged bits inside it.
    AndMask(MaskLane),
    /// Wrapping sum of operand and forged word.
    Add,
}

impl CombineOp {
    #[must_use]
    pub const fn apply(self, operand: u64, forged: u64) -> u64 {
        match self {
            Self::Assign => forged,
            Self::Xor => operand ^ forged,
            Self::Or => operand | forged,
            Self::AndMask(lane) => (operand & !lane.mask()) | (forged & lane.mask()),
            Self::Add => operand.wrapping_add(forged),
        }
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Assign => "assigned over",
            Self::Xor => "XORed with",
            Self::Or => "ORed with",
            Self::AndMask(MaskLane::High32) => "masked into the high 32 bits of",
            Self::AndMask(MaskLane::Low32) => "masked into the low 32 bits of",
            Self::Add => "offset by",
        }
    }
}

/// Arithmetic applied to a non-forged operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Identity,
    Add(i64),
    Mul(i64),
    Div(i64),
}

/// [`Transform`] with its parameter erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Identity,
    Add,
    Mul,
    Div,
}

impl Transform {
    #[must_use]
    pub const fn kind(self) -> TransformKind {
        match self {
            Self::Identity => TransformKind::Identity,
            Self::Add(_) => TransformKind::Add,
            Self::Mul(_) => TransformKind::Mul,
            Self::Div(_) => TransformKind::Div,
        }
    }

    /// Apply on the word reinterpreted as a signed integer, wrapping.
    #[must_use]
    pub fn apply(self, value: u64) -> u64 {
        let v = value as i64;
        let out = match self {
            Self::Identity => v,
            Self::Add(k) => v.wrapping_add(k),
            Self::Mul(k) => v.wrapping_mul(k),
            Self::Div(k) => v.checked_div(k).unwrap_or(v),
        };
        out as u64
    }
}

/// Word-producing recipe for a write or a returned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// A literal word chosen by the native side.
    Fixed(u64),
    /// The attacker-controlled word, unmodified.
    Forged,
    /// The forged word merged with an operand.
    Combine { operand: Operand, op: CombineOp },
    /// A word computed from existing memory or addresses, no forged input.
    Derived { from: Operand, transform: Transform },
    /// A word produced by the primitive's sequence state.
    Sequenced(SequenceRecipe),
}

/// Value-combinator tag used for de-duplication, parameters erased.
///
/// A zero literal is kept apart from other literals: nulling a word and
/// planting a value in it are different recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    Null,
    Constant,
    Forged,
    Combine { operand: OperandKind, op: CombineOp },
    Derived { from: OperandKind, transform: TransformKind },
    Sequenced(SequenceKind),
}

/// Invocation context a value source is evaluated against.
pub trait ValueContext {
    /// Contents of the target word at `offset` on primitive entry.
    fn slot(&self, offset: i64) -> u64;
    /// Base address of the target.
    fn base_address(&self) -> u64;
    /// Address of a native stack local.
    fn stack_address(&self) -> u64;
}

/// Context for primitives without a target: no memory, no base.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl ValueContext for Detached {
    fn slot(&self, _offset: i64) -> u64 {
        0
    }

    fn base_address(&self) -> u64 {
        0
    }

    fn stack_address(&self) -> u64 {
        let local = 0_u64;
        std::ptr::addr_of!(local) as u64
    }
}

impl ValueSource {
    /// Forged word merged with a literal.
    #[must_use]
    pub const fn forged_with(pattern: u64, op: CombineOp) -> Self {
        Self::Combine {
            operand: Operand::Constant(pattern),
            op,
        }
    }

    /// Forged word merged with the original contents of `offset`.
    #[must_use]
    pub const fn forged_into_slot(offset: i64, op: CombineOp) -> Self {
        Self::Combine {
            operand: Operand::Slot(offset),
            op,
        }
    }

    /// The original contents of `offset`, transformed.
    #[must_use]
    pub const fn from_slot(offset: i64, transform: Transform) -> Self {
        Self::Derived {
            from: Operand::Slot(offset),
            transform,
        }
    }

    /// True when any attacker-controlled bits reach the produced word.
    #[must_use]
    pub const fn is_tainted(&self) -> bool {
        matches!(self, Self::Forged | Self::Combine { .. } | Self::Sequenced(_))
    }

    /// True when the value re-writes the unchanged contents of `offset`.
    #[must_use]
    pub fn is_rewrite_of(&self, offset: i64) -> bool {
        matches!(
            self,
            Self::Derived { from: Operand::Slot(o), transform: Transform::Identity } if *o == offset
        )
    }

    #[must_use]
    pub const fn combinator(&self) -> Combinator {
        match self {
            Self::Fixed(0) => Combinator::Null,
            Self::Fixed(_) => Combinator::Constant,
            Self::Forged => Combinator::Forged,
            Self::Combine { operand, op } => Combinator::Combine {
                operand: operand.kind(),
                op: *op,
            },
            Self::Derived { from, transform } => Combinator::Derived {
                from: from.kind(),
                transform: transform.kind(),
            },
            Self::Sequenced(recipe) => Combinator::Sequenced(recipe.kind()),
        }
    }

    /// Produce the word.
    ///
    /// A sequenced source advances `state` when one is supplied; without one
    /// it behaves as the first call of a fresh state.
    pub fn evaluate(
        &self,
        forged: u64,
        ctx: &dyn ValueContext,
        state: Option<&mut SequenceState>,
    ) -> u64 {
        match self {
            Self::Fixed(v) => *v,
            Self::Forged => forged,
            Self::Combine { operand, op } => op.apply(operand.resolve(ctx), forged),
            Self::Derived { from, transform } => transform.apply(from.resolve(ctx)),
            Self::Sequenced(recipe) => match state {
                Some(state) => state.advance(forged),
                None => replay(*recipe, forged, 1),
            },
        }
    }

    /// Human-readable description for rationales.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Fixed(0) => "a null word".to_string(),
            Self::Fixed(v) => format!("the constant {v:#x}"),
            Self::Forged => "the forged value".to_string(),
            Self::Combine { operand, op } => {
                format!("the forged value {} {}", op.verb(), operand.describe())
            }
            Self::Derived {
                from,
                transform: Transform::Identity,
            } => from.describe(),
            Self::Derived { from, transform } => {
                format!("{} transformed by {transform:?}", from.describe())
            }
            Self::Sequenced(recipe) => {
                format!("a {} sequence over the forged value", recipe.kind().as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Frame {
        words: [u64; 3],
    }

    impl ValueContext for Frame {
        fn slot(&self, offset: i64) -> u64 {
            usize::try_from(offset)
                .ok()
                .and_then(|i| self.words.get(i).copied())
                .unwrap_or(0)
        }

        fn base_address(&self) -> u64 {
            0x1000
        }

        fn stack_address(&self) -> u64 {
            0x7ffd_0000_1234
        }
    }

    #[test]
    fn mask_lane_keeps_operand_outside_lane() {
        let operand = 0xAAAA_AAAA_BBBB_BBBB;
        let forged = 0x1111_1111_2222_2222;
        let low = CombineOp::AndMask(MaskLane::Low32).apply(operand, forged);
        assert_eq!(low, 0xAAAA_AAAA_2222_2222);
        let high = CombineOp::AndMask(MaskLane::High32).apply(operand, forged);
        assert_eq!(high, 0x1111_1111_BBBB_BBBB);
    }

    #[test]
    fn slot_operands_read_entry_contents() {
        let frame = Frame { words: [5, 10, 20] };
        let swap = ValueSource::from_slot(2, Transform::Identity);
        assert_eq!(swap.evaluate(0, &frame, None), 20);
        let grown = ValueSource::from_slot(1, Transform::Add(100));
        assert_eq!(grown.evaluate(0, &frame, None), 110);
        let xored = ValueSource::forged_into_slot(0, CombineOp::Xor);
        assert_eq!(xored.evaluate(0xF0, &frame, None), 0xF5);
        let own = ValueSource::Derived {
            from: Operand::BaseAddress,
            transform: Transform::Identity,
        };
        assert_eq!(own.evaluate(0, &frame, None), 0x1000);
    }

    #[test]
    fn division_by_zero_leaves_word_unchanged() {
        assert_eq!(Transform::Div(0).apply(42), 42);
        assert_eq!(Transform::Div(2).apply(42), 21);
    }

    #[test]
    fn taint_follows_forged_input() {
        assert!(ValueSource::Forged.is_tainted());
        assert!(ValueSource::forged_with(3, CombineOp::Or).is_tainted());
        assert!(ValueSource::Sequenced(SequenceRecipe::Toggle).is_tainted());
        assert!(!ValueSource::Fixed(0xDEAD_BEEF).is_tainted());
        assert!(!ValueSource::from_slot(1, Transform::Mul(10)).is_tainted());
    }

    #[test]
    fn combinator_erases_parameters_but_not_nulling() {
        assert_eq!(
            ValueSource::Fixed(7).combinator(),
            ValueSource::Fixed(99).combinator()
        );
        assert_ne!(
            ValueSource::Fixed(0).combinator(),
            ValueSource::Fixed(99).combinator()
        );
        assert_eq!(
            ValueSource::forged_with(3, CombineOp::Or).combinator(),
            ValueSource::forged_with(0x40, CombineOp::Or).combinator()
        );
        assert_ne!(
            ValueSource::forged_with(3, CombineOp::Or).combinator(),
            ValueSource::forged_into_slot(3, CombineOp::Or).combinator()
        );
    }

    #[test]
    fn rewrite_detection_requires_same_slot_and_identity() {
        assert!(ValueSource::from_slot(1, Transform::Identity).is_rewrite_of(1));
        assert!(!ValueSource::from_slot(2, Transform::Identity).is_rewrite_of(1));
        assert!(!ValueSource::from_slot(1, Transform::Add(0)).is_rewrite_of(1));
    }
}
