//! Verification harness for the clacat catalog.
//!
//! This crate provides:
//! - Shadow host: executes primitives against simulated host-owned memory
//! - Catalog runner: checks every observed outcome against its classification
//! - Structured logging: JSONL emitter, diagnostic sink and schema validation

#![forbid(unsafe_code)]

pub mod error;
pub mod runner;
pub mod shadow;
pub mod structured_log;

pub use error::HarnessError;
pub use runner::{CatalogRunner, RunRecord, RunSummary};
pub use shadow::{ExecutionOutcome, FaultKind, ShadowHost};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, LogSink, SharedEmitter, Verdict};
