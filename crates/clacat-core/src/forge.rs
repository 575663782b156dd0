//! Source of attacker-controlled words.
//!
//! The forged word is opaque and untrusted. Nothing in this crate range
//! checks or sanitizes it; whether the host does is what gets tested.

/// Supplies a forged 64-bit word on demand.
pub trait ForgeSource {
    fn forge(&mut self) -> u64;
}

/// Returns the same word on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedForge(pub u64);

impl FixedForge {
    /// Canonical forged word: a plausible but unmapped user-space address.
    pub const DEFAULT_WORD: u64 = 0x0000_4141_4141_4000;
}

impl Default for FixedForge {
    fn default() -> Self {
        Self(Self::DEFAULT_WORD)
    }
}

impl ForgeSource for FixedForge {
    fn forge(&mut self) -> u64 {
        self.0
    }
}

impl<F: FnMut() -> u64> ForgeSource for F {
    fn forge(&mut self) -> u64 {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_forge_sources() {
        let mut next = 0_u64;
        let mut source = move || {
            next += 0x10;
            next
        };
        assert_eq!(source.forge(), 0x10);
        assert_eq!(source.forge(), 0x20);
        assert_eq!(FixedForge::default().forge(), FixedForge::DEFAULT_WORD);
    }
}
