//! Typed views over the raw addresses a native primitive receives.
//!
//! The descriptor names the memory shape a primitive presumes, not the shape
//! the memory really has. The address itself is an invocation argument: a
//! catalog primitive is described before any host hands it a handle.

use serde::{Deserialize, Serialize};

/// Word offset of the pointer field in a record triple.
pub const RECORD_POINTER: i64 = 0;
/// Word offset of the length field in a record triple.
pub const RECORD_LENGTH: i64 = 1;
/// Word offset of the capacity field in a record triple.
pub const RECORD_CAPACITY: i64 = 2;
/// Number of word-sized fields in a record triple.
pub const RECORD_WORDS: i64 = 3;

/// Memory shape a primitive presumes for its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetDescriptor {
    /// Host-owned memory of unknown extent, passed in as an address.
    ForeignHandle,
    /// A buffer on the native side's own call frame.
    LocalBuffer {
        /// Statically known element count.
        declared_length: u64,
    },
    /// A foreign handle presumed to be `(pointer, length, capacity)`.
    RecordTriple,
}

/// Tag of a [`TargetDescriptor`], with parameters erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    ForeignHandle,
    LocalBuffer,
    RecordTriple,
}

impl TargetKind {
    /// Stable lowercase name used in persisted records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ForeignHandle => "foreign_handle",
            Self::LocalBuffer => "local_buffer",
            Self::RecordTriple => "record_triple",
        }
    }
}

impl TargetDescriptor {
    /// Local buffer with `declared_length` elements.
    #[must_use]
    pub const fn local(declared_length: u64) -> Self {
        Self::LocalBuffer { declared_length }
    }

    #[must_use]
    pub const fn kind(self) -> TargetKind {
        match self {
            Self::ForeignHandle => TargetKind::ForeignHandle,
            Self::LocalBuffer { .. } => TargetKind::LocalBuffer,
            Self::RecordTriple => TargetKind::RecordTriple,
        }
    }

    /// True when the target lives in host-owned memory.
    #[must_use]
    pub const fn is_host_memory(self) -> bool {
        matches!(self, Self::ForeignHandle | Self::RecordTriple)
    }

    /// Whether invoking a primitive on this target takes an address argument.
    #[must_use]
    pub const fn takes_address(self) -> bool {
        self.is_host_memory()
    }

    /// Number of words the native side can prove it owns from the base.
    ///
    /// A foreign handle guarantees only its first word; a record triple its
    /// three fields; a local buffer its declared length.
    #[must_use]
    pub const fn provable_extent(self) -> u64 {
        match self {
            Self::ForeignHandle => 1,
            Self::LocalBuffer { declared_length } => declared_length,
            Self::RecordTriple => RECORD_WORDS as u64,
        }
    }

    /// Returns true if `offset` lies inside `[0, provable_extent)`.
    #[must_use]
    pub fn contains(self, offset: i64) -> bool {
        u64::try_from(offset).is_ok_and(|o| o < self.provable_extent())
    }
}

/// Named field of a record triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Pointer,
    Length,
    Capacity,
}

impl RecordField {
    pub const ALL: [Self; 3] = [Self::Pointer, Self::Length, Self::Capacity];

    /// Field at word `offset`, if the offset addresses one.
    #[must_use]
    pub const fn from_offset(offset: i64) -> Option<Self> {
        match offset {
            RECORD_POINTER => Some(Self::Pointer),
            RECORD_LENGTH => Some(Self::Length),
            RECORD_CAPACITY => Some(Self::Capacity),
            _ => None,
        }
    }

    #[must_use]
    pub const fn offset(self) -> i64 {
        match self {
            Self::Pointer => RECORD_POINTER,
            Self::Length => RECORD_LENGTH,
            Self::Capacity => RECORD_CAPACITY,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pointer => "pointer",
            Self::Length => "length",
            Self::Capacity => "capacity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_handle_owns_only_base_word() {
        let t = TargetDescriptor::ForeignHandle;
        assert!(t.contains(0));
        assert!(!t.contains(1));
        assert!(!t.contains(-1));
    }

    #[test]
    fn local_buffer_extent_is_declared_length() {
        let t = TargetDescriptor::local(4);
        assert!(t.contains(3));
        assert!(!t.contains(4));
        assert!(!t.contains(-3));
        assert!(!t.takes_address());
    }

    #[test]
    fn record_fields_map_to_offsets() {
        for field in RecordField::ALL {
            assert_eq!(RecordField::from_offset(field.offset()), Some(field));
        }
        assert_eq!(RecordField::from_offset(3), None);
        assert!(TargetDescriptor::RecordTriple.contains(2));
        assert!(!TargetDescriptor::RecordTriple.contains(3));
    }
}
