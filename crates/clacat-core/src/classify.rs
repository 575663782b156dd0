//! Structural classification engine.
//!
//! `classify` inspects only the target descriptor and the operation recipe;
//! nothing is executed. Rules are tried in a fixed order and the first one
//! that matches decides the class:
//!
//! 1. use-after-release (Class 2)
//! 2. record-metadata corruption (Class 4)
//! 3. foreign out-of-bounds write (Class 1)
//! 4. local out-of-bounds access (Class 3)
//! 5. forged capability return (Class 5)
//! 6. safe

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::primitive::{AttackPrimitive, EffectiveWrite, Offset, Operation};
use crate::target::{RecordField, TargetDescriptor};
use crate::value::{Operand, ValueSource};

/// Closed taxonomy of cross-language violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackClass {
    Safe,
    /// Class 1: write beyond the extent of a host-owned handle.
    ForeignOutOfBounds,
    /// Class 2: access or release after the handle was released.
    UseAfterRelease,
    /// Class 3: access outside a native stack buffer.
    LocalOutOfBounds,
    /// Class 4: corruption of a (pointer, length, capacity) record.
    RecordMetadata,
    /// Class 5: unvalidated word returned to be trusted as a callback.
    ForgedCapability,
}

impl AttackClass {
    pub const ALL: [Self; 6] = [
        Self::Safe,
        Self::ForeignOutOfBounds,
        Self::UseAfterRelease,
        Self::LocalOutOfBounds,
        Self::RecordMetadata,
        Self::ForgedCapability,
    ];

    /// Numeric class code; 0 is safe.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Safe => 0,
            Self::ForeignOutOfBounds => 1,
            Self::UseAfterRelease => 2,
            Self::LocalOutOfBounds => 3,
            Self::RecordMetadata => 4,
            Self::ForgedCapability => 5,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Safe),
            1 => Some(Self::ForeignOutOfBounds),
            2 => Some(Self::UseAfterRelease),
            3 => Some(Self::LocalOutOfBounds),
            4 => Some(Self::RecordMetadata),
            5 => Some(Self::ForgedCapability),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::ForeignOutOfBounds => "foreign_out_of_bounds",
            Self::UseAfterRelease => "use_after_release",
            Self::LocalOutOfBounds => "local_out_of_bounds",
            Self::RecordMetadata => "record_metadata",
            Self::ForgedCapability => "forged_capability",
        }
    }

    /// Prefix of generated primitive ids.
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::ForeignOutOfBounds => "foreign-oob",
            Self::UseAfterRelease => "use-after-release",
            Self::LocalOutOfBounds => "local-oob",
            Self::RecordMetadata => "record-meta",
            Self::ForgedCapability => "forged-cb",
        }
    }

    /// Parse a class name loosely: codes, `classN`, snake/kebab names, id
    /// prefixes and descriptive attack names ("use-after-free", "vec
    /// metadata", "callback poisoning", ...) are all accepted.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        if let Some(code) = norm
            .strip_prefix("class")
            .map(|rest| rest.trim_start_matches('_'))
            .or(Some(norm.as_str()))
            .and_then(|digits| digits.parse::<u8>().ok())
        {
            return Self::from_code(code);
        }
        Self::ALL
            .into_iter()
            .find(|class| class.as_str() == norm || class.id_prefix().replace('-', "_") == norm)
            .or_else(|| Self::from_description(s))
    }

    /// Map a descriptive attack name onto a class, exact names first and
    /// keywords second.
    fn from_description(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        let key = lower.replace("attack", "");
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        if let Some((_, class)) = DESCRIPTIONS.iter().find(|(name, _)| *name == key) {
            return Some(*class);
        }
        KEYWORDS
            .iter()
            .find(|(words, _)| words.iter().any(|w| key.contains(w)))
            .map(|(_, class)| *class)
    }
}

const DESCRIPTIONS: [(&str, AttackClass); 17] = [
    ("rust bounds check bypass", AttackClass::ForeignOutOfBounds),
    ("bounds check bypass", AttackClass::ForeignOutOfBounds),
    ("out-of-bounds write", AttackClass::ForeignOutOfBounds),
    ("rust lifetime bypass", AttackClass::UseAfterRelease),
    ("lifetime bypass", AttackClass::UseAfterRelease),
    ("uaf", AttackClass::UseAfterRelease),
    ("use-after-free", AttackClass::UseAfterRelease),
    ("double-free", AttackClass::UseAfterRelease),
    ("hardening bypass via stack overflow", AttackClass::LocalOutOfBounds),
    ("hardening bypass", AttackClass::LocalOutOfBounds),
    ("c/c++ hardening bypass", AttackClass::LocalOutOfBounds),
    ("dynamic bounds corruption (vec metadata)", AttackClass::RecordMetadata),
    ("dynamic bounds corruption", AttackClass::RecordMetadata),
    ("vec metadata", AttackClass::RecordMetadata),
    ("intended interaction corruption", AttackClass::ForgedCapability),
    ("callback poisoning", AttackClass::ForgedCapability),
    ("benign", AttackClass::Safe),
];

// Checked in order; "dynamic bounds" must hit record metadata before the
// bare "bounds" keyword.
const KEYWORDS: [(&[&str], AttackClass); 5] = [
    (&["dynamic", "vec", "metadata"], AttackClass::RecordMetadata),
    (&["bounds"], AttackClass::ForeignOutOfBounds),
    (&["lifetime", "uaf", "use-after", "double-free"], AttackClass::UseAfterRelease),
    (&["hardening", "shadow", "cfi", "stack"], AttackClass::LocalOutOfBounds),
    (&["intended", "callback", "poison"], AttackClass::ForgedCapability),
];

impl fmt::Display for AttackClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| format!("unknown attack class: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    High,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }

    const fn tainted(tainted: bool) -> Self {
        if tainted { Self::High } else { Self::Low }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label derived from a primitive; never stored apart from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub class: AttackClass,
    pub risk: RiskLevel,
    pub rationale: String,
    /// Index of the operation that triggered the rule, if any.
    pub trigger: Option<usize>,
}

impl Classification {
    fn new(
        class: AttackClass,
        risk: RiskLevel,
        trigger: Option<usize>,
        rationale: String,
    ) -> Self {
        Self {
            class,
            risk,
            rationale,
            trigger,
        }
    }
}

/// Classify `p`. Total and deterministic.
#[must_use]
pub fn classify(p: &AttackPrimitive) -> Classification {
    let writes = p.effective_writes();
    if let Some(c) = use_after_release(p) {
        return c;
    }
    if let Some(c) = record_metadata(p, &writes) {
        return c;
    }
    if let Some(c) = foreign_out_of_bounds(p, &writes) {
        return c;
    }
    if let Some(c) = local_out_of_bounds(p, &writes) {
        return c;
    }
    if let Some(c) = forged_capability(p) {
        return c;
    }
    Classification::new(AttackClass::Safe, RiskLevel::Low, None, safe_rationale(p))
}

fn use_after_release(p: &AttackPrimitive) -> Option<Classification> {
    let ops = p.operations();
    let (released_at, release) = ops
        .iter()
        .enumerate()
        .find(|(_, op)| matches!(op, Operation::Release { .. }))?;
    let released = release.offset();
    let same_word = |offset: &Offset| offset.effective() == released.effective();
    let mut after = ops
        .iter()
        .enumerate()
        .skip(released_at + 1)
        .filter(|(_, op)| op.may_execute());
    // A second release of the same handle dominates any intervening access.
    let follow = after
        .clone()
        .find(|(_, op)| matches!(op, Operation::Release { offset } if same_word(offset)))
        .or_else(|| after.next());

    let (trigger, rationale) = match follow {
        Some((i, Operation::Release { offset })) if same_word(offset) => (
            i,
            format!(
                "handle released twice: operations {released_at} and {i} both release {offset}"
            ),
        ),
        Some((i, Operation::Release { offset })) => (
            i,
            format!(
                "releases {offset} inside a block already released at operation {released_at}"
            ),
        ),
        Some((i, Operation::Read { offset })) => (
            i,
            format!("reads {offset} after the handle was released at operation {released_at}"),
        ),
        Some((i, Operation::Alias { offset, seed })) => (
            i,
            format!(
                "stores a fresh allocation seeded with {} at {offset} after release at operation {released_at}",
                seed.describe()
            ),
        ),
        Some((i, op)) => {
            let value = op.value().map_or_else(String::new, ValueSource::describe);
            let guarded = if matches!(op, Operation::GuardedWrite { .. }) {
                "conditionally "
            } else {
                ""
            };
            (
                i,
                format!(
                    "{guarded}writes {value} at {} after the handle was released at operation {released_at}",
                    op.offset()
                ),
            )
        }
        None => (
            released_at,
            format!(
                "releases host-owned memory at {released}; the host keeps using a freed handle"
            ),
        ),
    };
    Some(Classification::new(
        AttackClass::UseAfterRelease,
        RiskLevel::High,
        Some(trigger),
        rationale,
    ))
}

fn record_metadata(p: &AttackPrimitive, writes: &[EffectiveWrite]) -> Option<Classification> {
    if !matches!(p.target(), Some(TargetDescriptor::RecordTriple)) {
        return None;
    }
    let corrupted: Vec<(RecordField, &EffectiveWrite)> = writes
        .iter()
        .filter_map(|w| RecordField::from_offset(w.offset).map(|f| (f, w)))
        .filter(|(_, w)| w.aliased || !w.value.is_rewrite_of(w.offset))
        .collect();
    let (_, first) = corrupted.first()?;
    let fields: Vec<String> = corrupted
        .iter()
        .map(|(field, w)| format!("{} <- {}", field.as_str(), stored(w)))
        .collect();
    Some(Classification::new(
        AttackClass::RecordMetadata,
        RiskLevel::High,
        Some(first.index),
        format!(
            "rewrites record metadata the host trusts for bounds and deallocation: {}",
            fields.join(", ")
        ),
    ))
}

fn foreign_out_of_bounds(
    p: &AttackPrimitive,
    writes: &[EffectiveWrite],
) -> Option<Classification> {
    let target = p.target()?;
    if !target.is_host_memory() {
        return None;
    }
    let hits: Vec<&EffectiveWrite> = writes
        .iter()
        .filter(|w| !target.contains(w.offset) || w.value.is_tainted())
        .collect();
    let hit = most_dangerous(&hits)?;
    let tainted = hit.value.is_tainted();
    let rationale = if target.contains(hit.offset) {
        format!(
            "writes {} into host-owned word [{}]; the host never sees the forged store",
            stored(hit),
            hit.offset
        )
    } else {
        format!(
            "writes {} at word [{}] of a host handle whose extent is unknown to the native side",
            stored(hit),
            hit.offset
        )
    };
    Some(Classification::new(
        AttackClass::ForeignOutOfBounds,
        RiskLevel::tainted(tainted),
        Some(hit.index),
        rationale,
    ))
}

fn local_out_of_bounds(
    p: &AttackPrimitive,
    writes: &[EffectiveWrite],
) -> Option<Classification> {
    let target @ TargetDescriptor::LocalBuffer { declared_length } = p.target()? else {
        return None;
    };
    let outside: Vec<&EffectiveWrite> =
        writes.iter().filter(|w| !target.contains(w.offset)).collect();
    if let Some(w) = most_dangerous(&outside) {
        let direction = if w.offset < 0 { "underruns" } else { "overruns" };
        return Some(Classification::new(
            AttackClass::LocalOutOfBounds,
            RiskLevel::tainted(w.value.is_tainted()),
            Some(w.index),
            format!(
                "{direction} a {declared_length}-element stack buffer writing {} at [{}]",
                stored(w),
                w.offset
            ),
        ));
    }
    let (index, op) = p.operations().iter().enumerate().find(|(_, op)| {
        matches!(op, Operation::Read { .. }) && !target.contains(op.offset().effective())
    })?;
    Some(Classification::new(
        AttackClass::LocalOutOfBounds,
        RiskLevel::Low,
        Some(index),
        format!(
            "reads {} outside a {declared_length}-element stack buffer",
            op.offset()
        ),
    ))
}

fn forged_capability(p: &AttackPrimitive) -> Option<Classification> {
    let returns = p.returns()?;
    let touches_host = p.target().is_some_and(TargetDescriptor::is_host_memory)
        && p.mutates_target();
    if touches_host {
        return None;
    }
    let rationale = match returns {
        ValueSource::Forged => {
            "returns the forged value unchecked as a callback pointer".to_string()
        }
        ValueSource::Combine { .. } => format!(
            "returns {} unchecked as a callback pointer",
            returns.describe()
        ),
        ValueSource::Fixed(v) => format!(
            "returns the unvalidated constant {v:#x} as a callback pointer; \
             the host has no means to check it"
        ),
        ValueSource::Derived {
            from: Operand::StackAddress,
            ..
        } => "returns a native stack address that dangles once the call returns".to_string(),
        ValueSource::Derived { .. } => format!(
            "returns {} as a callback pointer without validation",
            returns.describe()
        ),
        ValueSource::Sequenced(recipe) => format!(
            "returns a {} sequence: repeated calls change the callback the host trusts",
            recipe.kind().as_str()
        ),
    };
    Some(Classification::new(
        AttackClass::ForgedCapability,
        RiskLevel::High,
        None,
        rationale,
    ))
}

fn safe_rationale(p: &AttackPrimitive) -> String {
    match p.target() {
        None => "no target and no returned value".to_string(),
        Some(target) if p.operations().iter().all(|op| !op.stores()) => format!(
            "only reads inside the {}-word extent of a {}",
            target.provable_extent(),
            target.kind().as_str()
        ),
        Some(target) => format!(
            "all stores are untainted and stay inside the {}-word extent of a {}",
            target.provable_extent(),
            target.kind().as_str()
        ),
    }
}

/// First tainted write among `hits`, else the first one.
fn most_dangerous<'a>(hits: &[&'a EffectiveWrite]) -> Option<&'a EffectiveWrite> {
    hits.iter()
        .find(|w| w.value.is_tainted())
        .or_else(|| hits.first())
        .copied()
}

fn stored(w: &EffectiveWrite) -> String {
    if w.aliased {
        format!("a fresh allocation holding {}", w.value.describe())
    } else {
        w.value.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::Guard;
    use crate::sequence::SequenceRecipe;
    use crate::value::{CombineOp, Transform};

    fn foreign() -> AttackPrimitive {
        AttackPrimitive::new("t", Some(TargetDescriptor::ForeignHandle))
    }

    #[test]
    fn release_then_release_is_use_after_release() {
        let p = foreign()
            .with_op(Operation::release())
            .with_op(Operation::write(0, ValueSource::Fixed(0)))
            .with_op(Operation::release());
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::UseAfterRelease);
        assert_eq!(c.risk, RiskLevel::High);
        assert_eq!(c.trigger, Some(2));
        assert!(c.rationale.contains("released twice"));
    }

    #[test]
    fn use_after_release_dominates_record_rules() {
        let p = AttackPrimitive::new("t", Some(TargetDescriptor::RecordTriple))
            .with_op(Operation::release())
            .with_op(Operation::write(1, ValueSource::Fixed(10)));
        assert_eq!(classify(&p).class, AttackClass::UseAfterRelease);
    }

    #[test]
    fn dead_guarded_write_after_release_falls_back_to_release() {
        let p = foreign().with_op(Operation::release()).with_op(Operation::GuardedWrite {
            offset: Offset::BASE,
            value: ValueSource::Forged,
            guard: Guard::Constant(false),
        });
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::UseAfterRelease);
        assert_eq!(c.trigger, Some(0));
    }

    #[test]
    fn forged_write_past_foreign_extent_is_high_class1() {
        let p = foreign().with_op(Operation::write(3, ValueSource::Forged));
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::ForeignOutOfBounds);
        assert_eq!(c.risk, RiskLevel::High);
        assert!(c.rationale.contains("[3]"));
    }

    #[test]
    fn fixed_write_past_foreign_extent_is_low_class1() {
        let p = foreign().with_op(Operation::write(7, ValueSource::Fixed(0x41)));
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::ForeignOutOfBounds);
        assert_eq!(c.risk, RiskLevel::Low);
    }

    #[test]
    fn later_forged_overrun_raises_foreign_risk() {
        let p = foreign()
            .with_op(Operation::write(5, ValueSource::Fixed(1)))
            .with_op(Operation::write(7, ValueSource::Forged));
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::ForeignOutOfBounds);
        assert_eq!(c.risk, RiskLevel::High);
        assert_eq!(c.trigger, Some(1));
        assert!(c.rationale.contains("[7]"));
    }

    #[test]
    fn later_forged_overrun_raises_local_risk() {
        let p = AttackPrimitive::new("t", Some(TargetDescriptor::local(1)))
            .with_op(Operation::write(5, ValueSource::Fixed(1)))
            .with_op(Operation::write(28, ValueSource::Forged));
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::LocalOutOfBounds);
        assert_eq!(c.risk, RiskLevel::High);
        assert_eq!(c.trigger, Some(1));
        assert!(c.rationale.contains("[28]"));
    }

    #[test]
    fn shifted_release_of_the_same_word_is_a_double_release() {
        let p = foreign()
            .with_op(Operation::release())
            .with_op(Operation::read(0))
            .with_op(Operation::Release {
                offset: Offset::Shifted { shift: 1, index: -1 },
            });
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::UseAfterRelease);
        assert_eq!(c.trigger, Some(2));
        assert!(c.rationale.contains("released twice"));
    }

    #[test]
    fn fixed_write_at_foreign_base_is_safe() {
        let p = foreign().with_op(Operation::write(0, ValueSource::Fixed(0)));
        assert_eq!(classify(&p).class, AttackClass::Safe);
    }

    #[test]
    fn record_length_rewrite_is_class4() {
        let p = AttackPrimitive::new("t", Some(TargetDescriptor::RecordTriple))
            .with_op(Operation::write(1, ValueSource::Fixed(10_000_000)));
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::RecordMetadata);
        assert_eq!(c.risk, RiskLevel::High);
        assert!(c.rationale.contains("length"));
    }

    #[test]
    fn record_identity_rewrite_is_safe() {
        let p = AttackPrimitive::new("t", Some(TargetDescriptor::RecordTriple))
            .with_op(Operation::write(1, ValueSource::from_slot(1, Transform::Identity)));
        assert_eq!(classify(&p).class, AttackClass::Safe);
    }

    #[test]
    fn record_write_past_fields_is_class1() {
        let p = AttackPrimitive::new("t", Some(TargetDescriptor::RecordTriple))
            .with_op(Operation::write(5, ValueSource::Forged));
        assert_eq!(classify(&p).class, AttackClass::ForeignOutOfBounds);
    }

    #[test]
    fn local_overrun_and_underrun_are_class3() {
        let over = AttackPrimitive::new("t", Some(TargetDescriptor::local(1)))
            .with_op(Operation::write(28, ValueSource::Forged));
        let c = classify(&over);
        assert_eq!(c.class, AttackClass::LocalOutOfBounds);
        assert_eq!(c.risk, RiskLevel::High);

        let under = AttackPrimitive::new("t", Some(TargetDescriptor::local(4))).with_op(
            Operation::Write {
                offset: Offset::Shifted { shift: 1, index: -4 },
                value: ValueSource::Fixed(1),
            },
        );
        let c = classify(&under);
        assert_eq!(c.class, AttackClass::LocalOutOfBounds);
        assert_eq!(c.risk, RiskLevel::Low);
        assert!(c.rationale.starts_with("underruns"));
    }

    #[test]
    fn local_out_of_bounds_read_is_low_class3() {
        let p =
            AttackPrimitive::new("t", Some(TargetDescriptor::local(2))).with_op(Operation::read(9));
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::LocalOutOfBounds);
        assert_eq!(c.risk, RiskLevel::Low);
    }

    #[test]
    fn in_bounds_local_write_is_safe() {
        let p = AttackPrimitive::new("t", Some(TargetDescriptor::local(1)))
            .with_op(Operation::write(0, ValueSource::Fixed(0)));
        let c = classify(&p);
        assert_eq!(c.class, AttackClass::Safe);
        assert_eq!(c.risk, RiskLevel::Low);
    }

    #[test]
    fn every_returned_value_is_a_forged_capability() {
        let values = [
            ValueSource::Fixed(42),
            ValueSource::Forged,
            ValueSource::forged_with(0x7, CombineOp::Xor),
            ValueSource::Derived {
                from: Operand::StackAddress,
                transform: Transform::Identity,
            },
            ValueSource::Sequenced(SequenceRecipe::Toggle),
        ];
        for value in values {
            let c = classify(&AttackPrimitive::returning_only("cb", value));
            assert_eq!(c.class, AttackClass::ForgedCapability, "{value:?}");
            assert_eq!(c.risk, RiskLevel::High);
            assert_eq!(c.trigger, None);
        }
    }

    #[test]
    fn class_names_parse_loosely() {
        assert_eq!(AttackClass::from_str_loose("3"), Some(AttackClass::LocalOutOfBounds));
        assert_eq!(AttackClass::from_str_loose("Class2"), Some(AttackClass::UseAfterRelease));
        assert_eq!(AttackClass::from_str_loose("class-5"), Some(AttackClass::ForgedCapability));
        assert_eq!(AttackClass::from_str_loose("record-meta"), Some(AttackClass::RecordMetadata));
        assert_eq!(AttackClass::from_str_loose("SAFE"), Some(AttackClass::Safe));
        assert_eq!(AttackClass::from_str_loose("class9"), None);
        assert_eq!(AttackClass::from_str_loose("bogus"), None);
    }

    #[test]
    fn descriptive_attack_names_parse() {
        let cases = [
            ("Rust Bounds Check Bypass Attack", AttackClass::ForeignOutOfBounds),
            ("use-after-free", AttackClass::UseAfterRelease),
            ("double-free", AttackClass::UseAfterRelease),
            ("Hardening bypass via stack overflow", AttackClass::LocalOutOfBounds),
            ("dynamic bounds corruption (vec metadata)", AttackClass::RecordMetadata),
            ("vec metadata", AttackClass::RecordMetadata),
            ("callback poisoning", AttackClass::ForgedCapability),
            ("shadow stack smash", AttackClass::LocalOutOfBounds),
            ("poisoned function pointer", AttackClass::ForgedCapability),
        ];
        for (name, class) in cases {
            assert_eq!(AttackClass::from_str_loose(name), Some(class), "{name}");
        }
        assert_eq!(AttackClass::from_str_loose("attack"), None);
    }
}
