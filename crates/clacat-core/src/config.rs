//! Generator configuration.
//!
//! Read from the environment with [`GeneratorConfig::from_env`]:
//! - `CLACAT_SEED`: decimal or `0x` hex. 0 (default) keeps canonical order;
//!   any other value permutes each class's enumeration deterministically.
//! - `CLACAT_COVERAGE`: `exhaustive` (default) or `smoke`. Smoke coverage
//!   keeps the first two variants of every class.

use serde::{Deserialize, Serialize};

pub const SEED_ENV: &str = "CLACAT_SEED";
pub const COVERAGE_ENV: &str = "CLACAT_COVERAGE";

/// Variants kept per class under [`CoverageMode::Smoke`].
pub const SMOKE_VARIANTS: usize = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// Every distinct variant of every class.
    #[default]
    Exhaustive,
    /// A couple of variants per class.
    Smoke,
}

impl CoverageMode {
    /// Parse a coverage mode. Unknown strings map to exhaustive.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "smoke" | "quick" | "fast" | "minimal" => Self::Smoke,
            _ => Self::Exhaustive,
        }
    }

    /// Number of variants kept from a class space of `available`.
    #[must_use]
    pub fn limit(self, available: usize) -> usize {
        match self {
            Self::Exhaustive => available,
            Self::Smoke => available.min(SMOKE_VARIANTS),
        }
    }
}

/// Parameters of catalog generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub coverage: CoverageMode,
    /// Decoy calls before a counter-threshold sequence turns hostile.
    pub threshold: u32,
    /// Period of a counter-modulo sequence.
    pub modulus: u32,
    /// Per-call step of a drift sequence.
    pub drift_stride: u64,
    /// Word returned during a counter-threshold sequence's decoy phase.
    pub decoy: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            coverage: CoverageMode::Exhaustive,
            threshold: 3,
            modulus: 3,
            drift_stride: 8,
            decoy: 0,
        }
    }
}

impl GeneratorConfig {
    /// Defaults overridden by `CLACAT_SEED` and `CLACAT_COVERAGE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(seed) = lookup(SEED_ENV).as_deref().and_then(parse_seed) {
            config.seed = seed;
        }
        if let Some(coverage) = lookup(COVERAGE_ENV) {
            config.coverage = CoverageMode::from_str_loose(&coverage);
        }
        config
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub const fn with_coverage(mut self, coverage: CoverageMode) -> Self {
        self.coverage = coverage;
        self
    }
}

/// Parse a seed written in decimal or `0x` hex; `_` separators are allowed.
#[must_use]
pub fn parse_seed(s: &str) -> Option<u64> {
    let s = s.trim().replace('_', "");
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coverage_modes() {
        assert_eq!(CoverageMode::from_str_loose("smoke"), CoverageMode::Smoke);
        assert_eq!(CoverageMode::from_str_loose("SMOKE"), CoverageMode::Smoke);
        assert_eq!(CoverageMode::from_str_loose("quick"), CoverageMode::Smoke);
        assert_eq!(
            CoverageMode::from_str_loose("exhaustive"),
            CoverageMode::Exhaustive
        );
        assert_eq!(CoverageMode::from_str_loose("bogus"), CoverageMode::Exhaustive);
    }

    #[test]
    fn smoke_limit_caps_at_two() {
        assert_eq!(CoverageMode::Smoke.limit(24), 2);
        assert_eq!(CoverageMode::Smoke.limit(1), 1);
        assert_eq!(CoverageMode::Exhaustive.limit(24), 24);
    }

    #[test]
    fn seeds_parse_decimal_and_hex() {
        assert_eq!(parse_seed("42"), Some(42));
        assert_eq!(parse_seed("0x2A"), Some(42));
        assert_eq!(parse_seed(" 0xdead_beef "), Some(0xDEAD_BEEF));
        assert_eq!(parse_seed("nope"), None);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = GeneratorConfig::from_lookup(|key| match key {
            SEED_ENV => Some("0x10".to_string()),
            COVERAGE_ENV => Some("smoke".to_string()),
            _ => None,
        });
        assert_eq!(config.seed, 16);
        assert_eq!(config.coverage, CoverageMode::Smoke);
        assert_eq!(config.threshold, 3);
    }

    #[test]
    fn unparsable_seed_keeps_default() {
        let config = GeneratorConfig::from_lookup(|key| {
            (key == SEED_ENV).then(|| "not-a-number".to_string())
        });
        assert_eq!(config, GeneratorConfig::default());
    }
}
