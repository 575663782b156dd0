//! Call-order-dependent state for forged callback returns.
//!
//! Each state is owned by exactly one primitive instance. A call applies one
//! transition first and then computes the returned word, so call `n` of a
//! fresh state is a pure function of `n` and the forged value.

use serde::{Deserialize, Serialize};

/// Transition table of a sequenced primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceRecipe {
    /// Odd calls return the forged value, even calls return zero.
    Toggle,
    /// The first `threshold` calls return `decoy`, later calls the forged value.
    CounterThreshold { decoy: u64, threshold: u32 },
    /// Returns the forged value when the call count is a multiple of `modulus`.
    CounterModulo { modulus: u32 },
    /// Anchors on the first forged value and moves by `stride` every call.
    Drift { stride: u64 },
}

/// [`SequenceRecipe`] with its parameters erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Toggle,
    CounterThreshold,
    CounterModulo,
    Drift,
}

impl SequenceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::CounterThreshold => "counter-threshold",
            Self::CounterModulo => "counter-modulo",
            Self::Drift => "drift",
        }
    }
}

impl SequenceRecipe {
    #[must_use]
    pub const fn kind(self) -> SequenceKind {
        match self {
            Self::Toggle => SequenceKind::Toggle,
            Self::CounterThreshold { .. } => SequenceKind::CounterThreshold,
            Self::CounterModulo { .. } => SequenceKind::CounterModulo,
            Self::Drift { .. } => SequenceKind::Drift,
        }
    }
}

/// Persistent per-instance sequence state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceState {
    recipe: SequenceRecipe,
    calls: u64,
    flag: bool,
    anchor: Option<u64>,
}

impl SequenceState {
    /// Fresh state: no calls observed yet.
    #[must_use]
    pub const fn new(recipe: SequenceRecipe) -> Self {
        Self {
            recipe,
            calls: 0,
            flag: false,
            anchor: None,
        }
    }

    #[must_use]
    pub const fn recipe(&self) -> SequenceRecipe {
        self.recipe
    }

    /// Number of calls applied so far.
    #[must_use]
    pub const fn calls(&self) -> u64 {
        self.calls
    }

    /// Apply one transition, then compute this call's word.
    pub fn advance(&mut self, forged: u64) -> u64 {
        self.calls = self.calls.saturating_add(1);
        self.flag = !self.flag;
        match self.recipe {
            SequenceRecipe::Toggle => {
                if self.flag {
                    forged
                } else {
                    0
                }
            }
            SequenceRecipe::CounterThreshold { decoy, threshold } => {
                if self.calls <= u64::from(threshold) {
                    decoy
                } else {
                    forged
                }
            }
            SequenceRecipe::CounterModulo { modulus } => {
                if modulus != 0 && self.calls % u64::from(modulus) == 0 {
                    forged
                } else {
                    0
                }
            }
            SequenceRecipe::Drift { stride } => {
                let anchor = *self.anchor.get_or_insert(forged);
                anchor.wrapping_add(stride.wrapping_mul(self.calls - 1))
            }
        }
    }

    /// Return to the fresh state.
    pub fn reset(&mut self) {
        *self = Self::new(self.recipe);
    }
}

/// Word returned by call `call` (1-based) of a fresh state.
///
/// Equivalent to advancing a fresh [`SequenceState`] `call` times with the
/// same forged value and keeping the last result. Call 0 yields 0.
#[must_use]
pub fn replay(recipe: SequenceRecipe, forged: u64, call: u64) -> u64 {
    if call == 0 {
        return 0;
    }
    match recipe {
        SequenceRecipe::Toggle => {
            if call % 2 == 1 {
                forged
            } else {
                0
            }
        }
        SequenceRecipe::CounterThreshold { decoy, threshold } => {
            if call <= u64::from(threshold) {
                decoy
            } else {
                forged
            }
        }
        SequenceRecipe::CounterModulo { modulus } => {
            if modulus != 0 && call % u64::from(modulus) == 0 {
                forged
            } else {
                0
            }
        }
        SequenceRecipe::Drift { stride } => forged.wrapping_add(stride.wrapping_mul(call - 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORGED: u64 = 0x5555_0000_1000;

    fn run(recipe: SequenceRecipe, calls: u64) -> Vec<u64> {
        let mut state = SequenceState::new(recipe);
        (0..calls).map(|_| state.advance(FORGED)).collect()
    }

    #[test]
    fn toggle_alternates_forged_and_null() {
        assert_eq!(
            run(SequenceRecipe::Toggle, 6),
            vec![FORGED, 0, FORGED, 0, FORGED, 0]
        );
    }

    #[test]
    fn threshold_switches_after_n_calls() {
        let recipe = SequenceRecipe::CounterThreshold {
            decoy: 1234,
            threshold: 3,
        };
        assert_eq!(run(recipe, 5), vec![1234, 1234, 1234, FORGED, FORGED]);
    }

    #[test]
    fn modulo_fires_on_multiples() {
        let recipe = SequenceRecipe::CounterModulo { modulus: 3 };
        assert_eq!(run(recipe, 6), vec![0, 0, FORGED, 0, 0, FORGED]);
    }

    #[test]
    fn zero_modulus_never_fires() {
        let recipe = SequenceRecipe::CounterModulo { modulus: 0 };
        assert!(run(recipe, 4).iter().all(|&v| v == 0));
        assert_eq!(replay(recipe, FORGED, 3), 0);
    }

    #[test]
    fn drift_anchors_on_first_forged_value() {
        let mut state = SequenceState::new(SequenceRecipe::Drift { stride: 8 });
        assert_eq!(state.advance(100), 100);
        // Later forged values are ignored once anchored.
        assert_eq!(state.advance(5_000), 108);
        assert_eq!(state.advance(9_000), 116);
    }

    #[test]
    fn replay_matches_stateful_run() {
        let recipes = [
            SequenceRecipe::Toggle,
            SequenceRecipe::CounterThreshold {
                decoy: 0,
                threshold: 3,
            },
            SequenceRecipe::CounterModulo { modulus: 4 },
            SequenceRecipe::Drift { stride: 8 },
        ];
        for recipe in recipes {
            let observed = run(recipe, 12);
            for (i, value) in observed.iter().enumerate() {
                assert_eq!(*value, replay(recipe, FORGED, i as u64 + 1), "{recipe:?} call {i}");
            }
        }
    }

    #[test]
    fn reset_restores_fresh_behaviour() {
        let mut state = SequenceState::new(SequenceRecipe::Toggle);
        state.advance(FORGED);
        state.advance(FORGED);
        state.advance(FORGED);
        state.reset();
        assert_eq!(state.calls(), 0);
        assert_eq!(state.advance(FORGED), FORGED);
    }
}
