//! Closed enumeration of each class's parameter space.
//!
//! Every class has a finite set of axes. The generator walks their full
//! product in a canonical order (optionally permuted by a seed), drops any
//! candidate whose shape was already produced, and checks each survivor
//! classifies into the requested class. Asking for more primitives than the
//! space holds is an error, never a silent repeat.

use std::collections::HashSet;

use crate::classify::{AttackClass, classify};
use crate::config::GeneratorConfig;
use crate::error::CatalogError;
use crate::primitive::{AttackPrimitive, Guard, Offset, Operation};
use crate::sequence::SequenceRecipe;
use crate::target::{RECORD_CAPACITY, RECORD_LENGTH, RECORD_POINTER, TargetDescriptor};
use crate::value::{CombineOp, MaskLane, Operand, Transform, ValueSource};

/// Fixed pattern written before the real store at the same offset.
pub const DECOY_PATTERN: u64 = 0x4141_4141_4141_4141;
/// Pattern a forged word is XORed with.
pub const XOR_PATTERN: u64 = 0x5A5A_5A5A_5A5A_5A5A;
/// Low tag bits a forged word is ORed with.
pub const OR_PATTERN: u64 = 0x3;
/// Poison constant written into released memory.
pub const POISON: u64 = 0xDEAD_BEEF_DEAD_BEEF;

/// Iterations of a loop-derived overrun.
const LOOP_WORDS: i64 = 5;

/// How an out-of-bounds index is produced for Class 1 and Class 3.
#[derive(Debug, Clone, Copy)]
enum Reach {
    Small,
    Large,
    Underflow,
    Loop,
}

const REACHES: [Reach; 4] = [Reach::Small, Reach::Large, Reach::Underflow, Reach::Loop];

/// How the stored word is produced for Class 1 and Class 3.
#[derive(Debug, Clone, Copy)]
enum Payload {
    Plain,
    MaskHigh,
    MaskLow,
    OrPattern,
    XorPattern,
    DecoyThenForge,
}

const PAYLOADS: [Payload; 6] = [
    Payload::Plain,
    Payload::MaskHigh,
    Payload::MaskLow,
    Payload::OrPattern,
    Payload::XorPattern,
    Payload::DecoyThenForge,
];

impl Payload {
    const fn name(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::MaskHigh => "mask-high",
            Self::MaskLow => "mask-low",
            Self::OrPattern => "or",
            Self::XorPattern => "xor",
            Self::DecoyThenForge => "decoy",
        }
    }

    fn stores(self, offset: Offset) -> Vec<Operation> {
        let slot = offset.effective();
        let value = match self {
            Self::Plain | Self::DecoyThenForge => ValueSource::Forged,
            Self::MaskHigh => {
                ValueSource::forged_into_slot(slot, CombineOp::AndMask(MaskLane::High32))
            }
            Self::MaskLow => {
                ValueSource::forged_into_slot(slot, CombineOp::AndMask(MaskLane::Low32))
            }
            Self::OrPattern => ValueSource::forged_with(OR_PATTERN, CombineOp::Or),
            Self::XorPattern => ValueSource::forged_with(XOR_PATTERN, CombineOp::Xor),
        };
        let mut ops = Vec::with_capacity(2);
        if matches!(self, Self::DecoyThenForge) {
            ops.push(Operation::Write {
                offset,
                value: ValueSource::Fixed(DECOY_PATTERN),
            });
        }
        ops.push(Operation::Write { offset, value });
        ops
    }
}

/// Post-release action for Class 2.
#[derive(Debug, Clone, Copy)]
enum AfterRelease {
    Write,
    WriteThenRelease,
    WriteThenAlias,
    Conditional,
}

/// Deterministic xorshift64* stream for seeded orderings.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // A zero state never leaves zero.
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}

/// Enumerates de-duplicated primitives per class.
#[derive(Debug, Clone, Default)]
pub struct VariantGenerator {
    config: GeneratorConfig,
}

impl VariantGenerator {
    #[must_use]
    pub const fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Every candidate of `class` in enumeration order, before
    /// de-duplication. Ids are provisional labels naming the axes.
    #[must_use]
    pub fn candidates(&self, class: AttackClass) -> Vec<AttackPrimitive> {
        let mut candidates = match class {
            AttackClass::Safe => safe_controls(),
            AttackClass::ForeignOutOfBounds => foreign_overruns(),
            AttackClass::UseAfterRelease => releases(),
            AttackClass::LocalOutOfBounds => local_overruns(),
            AttackClass::RecordMetadata => record_corruptions(),
            AttackClass::ForgedCapability => self.forged_returns(),
        };
        if self.config.seed != 0 {
            let class_salt = u64::from(class.code()).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            XorShift64::new(self.config.seed ^ class_salt).shuffle(&mut candidates);
        }
        candidates
    }

    /// Number of structurally distinct primitives `class` can produce.
    #[must_use]
    pub fn space_size(&self, class: AttackClass) -> usize {
        let mut seen = HashSet::new();
        self.candidates(class)
            .iter()
            .filter(|p| seen.insert(p.shape()))
            .count()
    }

    /// Produce `count` distinct primitives of `class`.
    ///
    /// Ids are `<prefix>-NN`, numbered from 1 in output order.
    pub fn generate(
        &self,
        class: AttackClass,
        count: usize,
    ) -> Result<Vec<AttackPrimitive>, CatalogError> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(count);
        for candidate in self.candidates(class) {
            if out.len() == count {
                return Ok(out);
            }
            if !seen.insert(candidate.shape()) {
                continue;
            }
            let actual = classify(&candidate).class;
            if actual != class {
                return Err(CatalogError::Misclassified {
                    id: candidate.id().clone(),
                    expected: class,
                    actual,
                });
            }
            let id = format!("{}-{:02}", class.id_prefix(), out.len() + 1);
            out.push(candidate.renamed(id));
        }
        if out.len() < count {
            return Err(CatalogError::SpaceExhausted {
                class,
                requested: count,
                available: seen.len(),
            });
        }
        Ok(out)
    }

    /// Every class at the configured coverage, classes in code order.
    pub fn generate_all(&self) -> Result<Vec<AttackPrimitive>, CatalogError> {
        let mut all = Vec::new();
        for class in AttackClass::ALL {
            let count = self.config.coverage.limit(self.space_size(class));
            all.extend(self.generate(class, count)?);
        }
        Ok(all)
    }

    fn forged_returns(&self) -> Vec<AttackPrimitive> {
        let cfg = &self.config;
        let variants = [
            ("plain", ValueSource::Forged),
            ("or", ValueSource::forged_with(OR_PATTERN, CombineOp::Or)),
            ("xor", ValueSource::forged_with(0x7, CombineOp::Xor)),
            (
                "and-mask",
                ValueSource::forged_with(
                    0x0000_7FFF_0000_0000,
                    CombineOp::AndMask(MaskLane::Low32),
                ),
            ),
            ("add", ValueSource::forged_with(16, CombineOp::Add)),
            (
                "stack-mix",
                ValueSource::Combine {
                    operand: Operand::StackAddress,
                    op: CombineOp::AndMask(MaskLane::Low32),
                },
            ),
            ("constant", ValueSource::Fixed(42)),
            ("null", ValueSource::Fixed(0)),
            (
                "stack",
                ValueSource::Derived {
                    from: Operand::StackAddress,
                    transform: Transform::Identity,
                },
            ),
            ("toggle", ValueSource::Sequenced(SequenceRecipe::Toggle)),
            (
                "threshold",
                ValueSource::Sequenced(SequenceRecipe::CounterThreshold {
                    decoy: cfg.decoy,
                    threshold: cfg.threshold,
                }),
            ),
            (
                "modulo",
                ValueSource::Sequenced(SequenceRecipe::CounterModulo {
                    modulus: cfg.modulus,
                }),
            ),
            (
                "drift",
                ValueSource::Sequenced(SequenceRecipe::Drift {
                    stride: cfg.drift_stride,
                }),
            ),
        ];
        variants
            .into_iter()
            .map(|(name, value)| {
                AttackPrimitive::returning_only(format!("forged-cb:{name}"), value)
            })
            .collect()
    }
}

fn reach_offsets(
    reach: Reach,
    near: i64,
    far: i64,
    under: Offset,
    loop_start: i64,
) -> Vec<Offset> {
    match reach {
        Reach::Small => vec![Offset::Index(near)],
        Reach::Large => vec![Offset::Index(far)],
        Reach::Underflow => vec![under],
        Reach::Loop => Offset::strided(loop_start, 1, LOOP_WORDS).collect(),
    }
}

const fn reach_name(reach: Reach) -> &'static str {
    match reach {
        Reach::Small => "small",
        Reach::Large => "large",
        Reach::Underflow => "underflow",
        Reach::Loop => "loop",
    }
}

fn overrun(
    label: &str,
    target: TargetDescriptor,
    reach: Reach,
    payload: Payload,
    offsets: Vec<Offset>,
) -> AttackPrimitive {
    let id = format!("{label}:{}:{}", reach_name(reach), payload.name());
    let ops = offsets.into_iter().flat_map(|offset| payload.stores(offset));
    AttackPrimitive::new(id, Some(target)).with_ops(ops)
}

fn foreign_overruns() -> Vec<AttackPrimitive> {
    let mut out = Vec::with_capacity(REACHES.len() * PAYLOADS.len());
    for reach in REACHES {
        let under = Offset::Shifted {
            shift: 10,
            index: -5,
        };
        let offsets = reach_offsets(reach, 3, 16, under, 3);
        for payload in PAYLOADS {
            out.push(overrun(
                "foreign-oob",
                TargetDescriptor::ForeignHandle,
                reach,
                payload,
                offsets.clone(),
            ));
        }
    }
    out
}

fn local_overruns() -> Vec<AttackPrimitive> {
    let mut out = Vec::with_capacity(REACHES.len() * PAYLOADS.len());
    for reach in REACHES {
        let declared_length = match reach {
            Reach::Small => 2,
            Reach::Large | Reach::Loop => 1,
            Reach::Underflow => 4,
        };
        let under = Offset::Shifted { shift: 1, index: -4 };
        let offsets = reach_offsets(reach, 10, 28, under, 20);
        for payload in PAYLOADS {
            out.push(overrun(
                "local-oob",
                TargetDescriptor::local(declared_length),
                reach,
                payload,
                offsets.clone(),
            ));
        }
    }
    out
}

fn releases() -> Vec<AttackPrimitive> {
    let handle = || Some(TargetDescriptor::ForeignHandle);
    let values = [
        ("forged", ValueSource::Forged),
        ("poison", ValueSource::Fixed(POISON)),
        ("xor-original", ValueSource::forged_into_slot(0, CombineOp::Xor)),
    ];
    let actions = [
        ("write", AfterRelease::Write),
        ("write-release", AfterRelease::WriteThenRelease),
        ("write-alias", AfterRelease::WriteThenAlias),
        ("conditional", AfterRelease::Conditional),
    ];

    let mut out = Vec::new();
    for (action_name, action) in actions {
        for (value_name, value) in values {
            let id = format!("use-after-release:{action_name}:{value_name}");
            let mut p = AttackPrimitive::new(id, handle()).with_op(Operation::release());
            p = match action {
                AfterRelease::Write => p.with_op(Operation::write(0, value)),
                AfterRelease::WriteThenRelease => p
                    .with_op(Operation::write(0, value))
                    .with_op(Operation::release()),
                AfterRelease::WriteThenAlias => p.with_op(Operation::write(0, value)).with_op(
                    Operation::Alias {
                        offset: Offset::BASE,
                        seed: ValueSource::Forged,
                    },
                ),
                AfterRelease::Conditional => p.with_op(Operation::GuardedWrite {
                    offset: Offset::BASE,
                    value,
                    guard: Guard::Opaque,
                }),
            };
            out.push(p);
        }
    }
    out.push(
        AttackPrimitive::new("use-after-release:restore", handle())
            .with_op(Operation::read(0))
            .with_op(Operation::release())
            .with_op(Operation::write(0, ValueSource::from_slot(0, Transform::Identity))),
    );
    out.push(
        AttackPrimitive::new("use-after-release:neighbor", handle()).with_op(Operation::Release {
            offset: Offset::Index(1),
        }),
    );
    out
}

fn record_corruptions() -> Vec<AttackPrimitive> {
    let field = |offset, value| Operation::write(offset, value);
    let forged_pointer = ValueSource::forged_with(8, CombineOp::Add);
    let variants: [(&str, Vec<Operation>); 12] = [
        ("single:zero", vec![field(RECORD_POINTER, ValueSource::Fixed(0))]),
        (
            "single:huge",
            vec![field(RECORD_LENGTH, ValueSource::Fixed(10_000_000))],
        ),
        (
            "single:arith",
            vec![field(
                RECORD_CAPACITY,
                ValueSource::from_slot(RECORD_LENGTH, Transform::Add(100)),
            )],
        ),
        ("single:forged", vec![field(RECORD_POINTER, ValueSource::Forged)]),
        (
            "pair:zero",
            vec![
                field(RECORD_LENGTH, ValueSource::Fixed(0)),
                field(RECORD_CAPACITY, ValueSource::Fixed(0)),
            ],
        ),
        (
            "pair:huge",
            vec![
                field(RECORD_LENGTH, ValueSource::Fixed(1_000_000)),
                field(RECORD_CAPACITY, ValueSource::Fixed(1)),
            ],
        ),
        (
            "pair:swap",
            vec![
                field(
                    RECORD_LENGTH,
                    ValueSource::from_slot(RECORD_CAPACITY, Transform::Identity),
                ),
                field(
                    RECORD_CAPACITY,
                    ValueSource::from_slot(RECORD_LENGTH, Transform::Identity),
                ),
            ],
        ),
        (
            "pair:forged",
            vec![
                field(RECORD_POINTER, forged_pointer),
                field(RECORD_LENGTH, ValueSource::Fixed(1 << 20)),
            ],
        ),
        (
            "all:zero",
            vec![
                field(RECORD_POINTER, ValueSource::Fixed(0)),
                field(RECORD_LENGTH, ValueSource::Fixed(0)),
                field(RECORD_CAPACITY, ValueSource::Fixed(0)),
            ],
        ),
        (
            "all:huge",
            vec![
                field(RECORD_POINTER, ValueSource::Fixed(0x7FFF_F7FF_0000)),
                field(RECORD_LENGTH, ValueSource::Fixed(10_000)),
                field(RECORD_CAPACITY, ValueSource::Fixed(10_000)),
            ],
        ),
        (
            "all:arith",
            vec![
                field(
                    RECORD_POINTER,
                    ValueSource::Derived {
                        from: Operand::BaseAddress,
                        transform: Transform::Identity,
                    },
                ),
                field(
                    RECORD_LENGTH,
                    ValueSource::from_slot(RECORD_CAPACITY, Transform::Mul(10)),
                ),
                field(
                    RECORD_CAPACITY,
                    ValueSource::from_slot(RECORD_LENGTH, Transform::Mul(1000)),
                ),
            ],
        ),
        (
            "all:forged",
            vec![
                field(RECORD_POINTER, forged_pointer),
                field(RECORD_LENGTH, ValueSource::Fixed(1 << 20)),
                field(RECORD_CAPACITY, ValueSource::Fixed(1 << 20)),
            ],
        ),
    ];
    variants
        .into_iter()
        .map(|(name, ops)| {
            let id = format!("record-meta:{name}");
            AttackPrimitive::new(id, Some(TargetDescriptor::RecordTriple)).with_ops(ops)
        })
        .collect()
}

fn safe_controls() -> Vec<AttackPrimitive> {
    vec![
        AttackPrimitive::new("safe:local-zero", Some(TargetDescriptor::local(1)))
            .with_op(Operation::write(0, ValueSource::Fixed(0))),
        AttackPrimitive::new("safe:local-read", Some(TargetDescriptor::local(4)))
            .with_op(Operation::read(3)),
        AttackPrimitive::new("safe:handle-store", Some(TargetDescriptor::ForeignHandle))
            .with_op(Operation::write(0, ValueSource::Fixed(1))),
        AttackPrimitive::new("safe:handle-read", Some(TargetDescriptor::ForeignHandle))
            .with_op(Operation::read(0)),
        AttackPrimitive::new("safe:record-rewrite", Some(TargetDescriptor::RecordTriple)).with_op(
            Operation::write(
                RECORD_LENGTH,
                ValueSource::from_slot(RECORD_LENGTH, Transform::Identity),
            ),
        ),
    ]
}
