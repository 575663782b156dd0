//! Harness error type.

use clacat_core::{AttackClass, CatalogError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{id}: {class} entry produced `{observed}`, expected {expected}")]
    Inconsistent {
        id: String,
        class: AttackClass,
        observed: String,
        expected: &'static str,
    },
    #[error("{0} run(s) disagreed with their classification")]
    Disagreements(usize),
    #[error("log has {errors} schema violation(s) in {lines} line(s)")]
    LogSchema { lines: usize, errors: usize },
    #[error("no name is labelled in both {truth} and the predictions")]
    NoOverlap { truth: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
