//! Shadow host: executes primitives against simulated host-owned memory.
//!
//! Every invocation gets a fresh layout. A foreign handle is a one-word heap
//! allocation sitting between host frame words (neighbouring callback
//! slots); a record triple is a three-word allocation whose pointer field
//! refers to a separate backing buffer; a local buffer sits in a native
//! stack frame followed by a saved control word. Released allocations stay
//! mapped with a bumped generation so later touches are attributed to
//! use-after-release instead of a wild access.
//!
//! Faults are outcomes, not errors: a run always returns an
//! [`ExecutionOutcome`].

use std::collections::BTreeMap;

use clacat_core::{
    AttackPrimitive, CallbackSlot, Diagnostic, DiagnosticSink, ForgeSource, Operation,
    RecordField, TargetDescriptor, ValueContext,
};
use serde::{Deserialize, Serialize};

/// Bytes per simulated word.
pub const WORD: u64 = 8;

const HOST_FRAME_BASE: u64 = 0x1000_0000;
const HEAP_BASE: u64 = 0x2000_0000;
const STACK_FRAME_BASE: u64 = 0x7FFE_0000_0000;
/// Host frame words below and above the target allocation.
const FRAME_BELOW: u64 = 4;
const FRAME_ABOVE: u64 = 28;
/// Native frame words below a local buffer.
const LOCALS_BELOW: u64 = 8;
const STACK_FRAME_WORDS: u64 = 64;
/// Longest local buffer mapped in full.
const MAX_LOCAL_WORDS: u64 = 4096;
/// Backing buffer capacity of a record triple, in words.
const RECORD_BACKING_WORDS: u64 = 8;
const RECORD_INITIAL_LENGTH: u64 = 4;
/// Fill pattern of host frame words; the low bits hold the word index.
const FRAME_CANARY: u64 = 0xC0DE_0000_0000_0000;
/// Registered callbacks the host would accept.
const CALLBACK_TABLE: [u64; 3] = [0x4000_1000, 0x4000_2000, 0x4000_3000];

/// Why an access faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Access to an allocation already released.
    UseAfterRelease,
    /// Second release of one allocation.
    DoubleRelease,
    /// Release of an address that is not an allocation base.
    InvalidRelease,
    /// Access outside every mapped region.
    WildAccess,
}

impl FaultKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UseAfterRelease => "use_after_release",
            Self::DoubleRelease => "double_release",
            Self::InvalidRelease => "invalid_release",
            Self::WildAccess => "wild_access",
        }
    }
}

/// What the host observed after a primitive ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Ran to completion touching only memory it may touch.
    Completed,
    /// Ran to completion but overwrote memory outside the target.
    SilentCorruption {
        /// Distinct words overwritten outside the target.
        words: usize,
        /// The saved control word of the native frame was overwritten.
        control_slot: bool,
    },
    /// Record fields no longer describe the backing allocation.
    MetadataCorrupted { fields: Vec<RecordField> },
    /// Terminated abruptly at operation `at`.
    Fault { kind: FaultKind, at: usize },
    /// Words returned to the host across repeated calls.
    Returned {
        values: Vec<u64>,
        /// Returned words absent from the host's callback table.
        unvalidated: usize,
    },
}

impl ExecutionOutcome {
    /// Stable label used in logs.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Completed => "completed".to_string(),
            Self::SilentCorruption { .. } => "silent_corruption".to_string(),
            Self::MetadataCorrupted { .. } => "metadata_corrupted".to_string(),
            Self::Fault { kind, .. } => format!("fault:{}", kind.as_str()),
            Self::Returned { .. } => "returned".to_string(),
        }
    }

    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionState {
    Live,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionRole {
    HostFrame,
    Target,
    RecordBacking,
    NativeFrame,
    ControlSlot,
    Alias,
}

#[derive(Debug, Clone)]
struct Region {
    base: u64,
    words: Vec<u64>,
    role: RegionRole,
    /// Only heap allocations may be released.
    allocation: bool,
    state: RegionState,
    generation: u32,
}

impl Region {
    fn new(base: u64, words: Vec<u64>, role: RegionRole, allocation: bool) -> Self {
        Self {
            base,
            words,
            role,
            allocation,
            state: RegionState::Live,
            generation: 1,
        }
    }

    fn end(&self) -> u64 {
        self.base + self.words.len() as u64 * WORD
    }

    fn index_of(&self, addr: u64) -> Option<usize> {
        if addr < self.base || addr >= self.end() || (addr - self.base) % WORD != 0 {
            return None;
        }
        usize::try_from((addr - self.base) / WORD).ok()
    }
}

/// Simulated address space for one invocation.
#[derive(Debug, Clone)]
struct Memory {
    regions: BTreeMap<u64, Region>,
    next_heap: u64,
}

impl Memory {
    fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next_heap: HEAP_BASE,
        }
    }

    fn map(&mut self, region: Region) {
        self.regions.insert(region.base, region);
    }

    fn allocate(&mut self, words: Vec<u64>, role: RegionRole) -> u64 {
        let base = self.next_heap;
        // One guard word between heap blocks.
        self.next_heap += (words.len() as u64 + 1) * WORD;
        self.map(Region::new(base, words, role, true));
        base
    }

    fn region_at(&self, addr: u64) -> Option<&Region> {
        self.regions
            .range(..=addr)
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| addr < r.end())
    }

    fn region_at_mut(&mut self, addr: u64) -> Option<&mut Region> {
        self.regions
            .range_mut(..=addr)
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| addr < r.end())
    }

    fn peek(&self, addr: u64) -> Option<u64> {
        let region = self.region_at(addr)?;
        region.index_of(addr).map(|i| region.words[i])
    }

    fn read(&self, addr: u64) -> Result<u64, FaultKind> {
        let region = self.region_at(addr).ok_or(FaultKind::WildAccess)?;
        if region.state == RegionState::Released {
            return Err(FaultKind::UseAfterRelease);
        }
        region
            .index_of(addr)
            .map(|i| region.words[i])
            .ok_or(FaultKind::WildAccess)
    }

    fn write(&mut self, addr: u64, value: u64) -> Result<RegionRole, FaultKind> {
        let region = self.region_at_mut(addr).ok_or(FaultKind::WildAccess)?;
        if region.state == RegionState::Released {
            return Err(FaultKind::UseAfterRelease);
        }
        let i = region.index_of(addr).ok_or(FaultKind::WildAccess)?;
        region.words[i] = value;
        Ok(region.role)
    }

    /// Release the allocation based at `addr`, returning its new generation.
    fn release(&mut self, addr: u64) -> Result<u32, FaultKind> {
        let region = self.region_at_mut(addr).ok_or(FaultKind::InvalidRelease)?;
        if !region.allocation || region.base != addr {
            return Err(FaultKind::InvalidRelease);
        }
        if region.state == RegionState::Released {
            return Err(FaultKind::DoubleRelease);
        }
        region.state = RegionState::Released;
        region.generation += 1;
        Ok(region.generation)
    }
}

/// Invocation context seen by value sources: entry contents and addresses.
struct EntryView<'a> {
    snapshot: &'a Memory,
    base: u64,
    stack: u64,
}

impl ValueContext for EntryView<'_> {
    fn slot(&self, offset: i64) -> u64 {
        self.snapshot
            .peek(word_address(self.base, offset))
            .unwrap_or(0)
    }

    fn base_address(&self) -> u64 {
        self.base
    }

    fn stack_address(&self) -> u64 {
        self.stack
    }
}

fn word_address(base: u64, offset: i64) -> u64 {
    base.wrapping_add_signed(offset.wrapping_mul(WORD as i64))
}

/// Prepared address space with the target placed in it.
struct Layout {
    memory: Memory,
    base: u64,
    stack: u64,
    record_backing: Option<u64>,
}

fn frame_words(count: u64, first_index: u64) -> Vec<u64> {
    (first_index..first_index + count)
        .map(|i| FRAME_CANARY | i)
        .collect()
}

/// Place `target_words` as a heap allocation between host frame words.
fn place_in_host_frame(memory: &mut Memory, target_words: Vec<u64>) -> u64 {
    let len = target_words.len() as u64;
    let base = HOST_FRAME_BASE + FRAME_BELOW * WORD;
    memory.map(Region::new(
        HOST_FRAME_BASE,
        frame_words(FRAME_BELOW, 0),
        RegionRole::HostFrame,
        false,
    ));
    memory.map(Region::new(base, target_words, RegionRole::Target, true));
    memory.map(Region::new(
        base + len * WORD,
        frame_words(FRAME_ABOVE, FRAME_BELOW + len),
        RegionRole::HostFrame,
        false,
    ));
    base
}

/// Place a `len`-word buffer in the native frame, followed by the saved
/// control word and the rest of the frame.
///
/// A buffer longer than [`MAX_LOCAL_WORDS`] cannot sit in a simulated frame:
/// only its first `MAX_LOCAL_WORDS` words are mapped and nothing follows
/// them, so touching the rest is a wild access.
fn place_in_native_frame(memory: &mut Memory, len: u64) -> u64 {
    let base = STACK_FRAME_BASE + LOCALS_BELOW * WORD;
    let mapped = len.min(MAX_LOCAL_WORDS);
    memory.map(Region::new(
        base,
        vec![0; mapped as usize],
        RegionRole::Target,
        false,
    ));
    if len > MAX_LOCAL_WORDS {
        return base;
    }
    memory.map(Region::new(
        base + len * WORD,
        vec![0x0040_1000],
        RegionRole::ControlSlot,
        false,
    ));
    let used = LOCALS_BELOW + len + 1;
    memory.map(Region::new(
        base + (len + 1) * WORD,
        frame_words(STACK_FRAME_WORDS.saturating_sub(used), used),
        RegionRole::NativeFrame,
        false,
    ));
    base
}

fn lay_out(target: Option<TargetDescriptor>) -> Layout {
    let mut memory = Memory::new();
    memory.map(Region::new(
        STACK_FRAME_BASE,
        frame_words(LOCALS_BELOW, 0),
        RegionRole::NativeFrame,
        false,
    ));
    let mut record_backing = None;
    let base = match target {
        None => 0,
        Some(TargetDescriptor::ForeignHandle) => place_in_host_frame(&mut memory, vec![0x1111]),
        Some(TargetDescriptor::RecordTriple) => {
            let backing = memory.allocate(
                vec![0; RECORD_BACKING_WORDS as usize],
                RegionRole::RecordBacking,
            );
            record_backing = Some(backing);
            place_in_host_frame(
                &mut memory,
                vec![backing, RECORD_INITIAL_LENGTH, RECORD_BACKING_WORDS],
            )
        }
        Some(TargetDescriptor::LocalBuffer { declared_length }) => {
            place_in_native_frame(&mut memory, declared_length)
        }
    };
    Layout {
        memory,
        base,
        stack: STACK_FRAME_BASE,
        record_backing,
    }
}

/// Executes catalog primitives one invocation at a time.
#[derive(Debug, Clone, Default)]
pub struct ShadowHost;

impl ShadowHost {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// True when the host would accept `value` as a callback.
    #[must_use]
    pub fn is_registered_callback(&self, value: u64) -> bool {
        CALLBACK_TABLE.contains(&value)
    }

    /// Run `primitive` once against a fresh layout.
    ///
    /// The forged word is drawn once per invocation.
    pub fn execute(
        &self,
        primitive: &AttackPrimitive,
        forge: &mut dyn ForgeSource,
        sink: &dyn DiagnosticSink,
    ) -> ExecutionOutcome {
        let Layout {
            mut memory,
            base,
            stack,
            record_backing,
        } = lay_out(primitive.target());
        let snapshot = memory.clone();
        let ctx = EntryView {
            snapshot: &snapshot,
            base,
            stack,
        };
        let forged = forge.forge();
        let id = primitive.id();
        let mut corrupted: BTreeMap<u64, RegionRole> = BTreeMap::new();

        for (at, op) in primitive.operations().iter().enumerate() {
            if !op.may_execute() {
                continue;
            }
            let offset = op.offset().effective();
            let addr = word_address(base, offset);
            let diag = |event: &str| {
                Diagnostic::new(id.clone(), event)
                    .with_address(addr)
                    .with_offset(offset)
            };
            let result = match op {
                Operation::Read { .. } => memory.read(addr).map(|v| {
                    sink.report(diag("read").with_value(v));
                }),
                Operation::Write { value, .. } | Operation::GuardedWrite { value, .. } => {
                    let word = value.evaluate(forged, &ctx, None);
                    sink.report(diag("write").with_value(word));
                    memory.write(addr, word).map(|role| {
                        if role != RegionRole::Target {
                            corrupted.insert(addr, role);
                        }
                    })
                }
                Operation::Release { .. } => memory.release(addr).map(|generation| {
                    sink.report(diag("release").with_value(u64::from(generation)));
                }),
                Operation::Alias { seed, .. } => {
                    let word = seed.evaluate(forged, &ctx, None);
                    let fresh = memory.allocate(vec![word], RegionRole::Alias);
                    sink.report(diag("alias").with_value(fresh));
                    memory.write(addr, fresh).map(|role| {
                        if role != RegionRole::Target {
                            corrupted.insert(addr, role);
                        }
                    })
                }
            };
            if let Err(kind) = result {
                sink.report(diag(kind.as_str()));
                return ExecutionOutcome::Fault { kind, at };
            }
        }

        if let Some(backing) = record_backing {
            let fields = corrupted_record_fields(&memory, &snapshot, base, backing);
            if !fields.is_empty() {
                return ExecutionOutcome::MetadataCorrupted { fields };
            }
        }
        if corrupted.is_empty() {
            ExecutionOutcome::Completed
        } else {
            ExecutionOutcome::SilentCorruption {
                words: corrupted.len(),
                control_slot: corrupted.values().any(|r| *r == RegionRole::ControlSlot),
            }
        }
    }

    /// Call a callback slot `calls` times and judge the returned words.
    pub fn invoke_callback(
        &self,
        slot: &mut CallbackSlot,
        calls: usize,
        forge: &mut dyn ForgeSource,
        sink: &dyn DiagnosticSink,
    ) -> ExecutionOutcome {
        let values: Vec<u64> = (0..calls).map(|_| slot.invoke(forge, sink)).collect();
        let unvalidated = values
            .iter()
            .filter(|v| !self.is_registered_callback(**v))
            .count();
        ExecutionOutcome::Returned {
            values,
            unvalidated,
        }
    }
}

/// Record fields that changed and leave the record inconsistent with its
/// backing allocation.
fn corrupted_record_fields(
    memory: &Memory,
    snapshot: &Memory,
    base: u64,
    backing: u64,
) -> Vec<RecordField> {
    let word = |m: &Memory, field: RecordField| m.peek(word_address(base, field.offset()));
    let pointer = word(memory, RecordField::Pointer);
    let length = word(memory, RecordField::Length);
    let capacity = word(memory, RecordField::Capacity);
    let consistent = pointer == Some(backing)
        && capacity == Some(RECORD_BACKING_WORDS)
        && length.zip(capacity).is_some_and(|(l, c)| l <= c);
    if consistent {
        return Vec::new();
    }
    RecordField::ALL
        .into_iter()
        .filter(|&f| word(memory, f) != word(snapshot, f))
        .collect()
}
