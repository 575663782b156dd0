//! Catalog execution engine.
//!
//! Drives every catalog entry through the [`ShadowHost`] and checks that what
//! the host observed agrees with the entry's classification.

use std::collections::BTreeMap;

use clacat_core::{
    AttackClass, CallbackSlot, Catalog, CatalogEntry, DiagnosticSink, ForgeSource, NullSink,
    RiskLevel,
};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::shadow::{ExecutionOutcome, FaultKind, ShadowHost};
use crate::structured_log::{LogEntry, LogLevel, LogSink, SharedEmitter, Verdict};

/// Calls made to each forged-capability slot.
pub const DEFAULT_CALLS: usize = 4;

/// One entry's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub class: AttackClass,
    pub risk: RiskLevel,
    pub outcome: ExecutionOutcome,
    /// The observed outcome matches the classification.
    pub consistent: bool,
}

impl RunRecord {
    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        if self.consistent {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// Turn a disagreement into an error.
    pub fn check(&self) -> Result<(), HarnessError> {
        if self.consistent {
            return Ok(());
        }
        Err(HarnessError::Inconsistent {
            id: self.id.clone(),
            class: self.class,
            observed: self.outcome.label(),
            expected: expectation(self.class),
        })
    }
}

/// Aggregate over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub consistent: usize,
    /// Count per outcome label.
    pub outcomes: BTreeMap<String, usize>,
}

impl RunSummary {
    #[must_use]
    pub fn from_records(records: &[RunRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            if record.consistent {
                summary.consistent += 1;
            }
            *summary.outcomes.entry(record.outcome.label()).or_insert(0) += 1;
        }
        summary
    }

    #[must_use]
    pub const fn disagreements(&self) -> usize {
        self.total - self.consistent
    }

    #[must_use]
    pub const fn all_consistent(&self) -> bool {
        self.disagreements() == 0
    }
}

/// What the host should observe for `class`.
#[must_use]
pub const fn expectation(class: AttackClass) -> &'static str {
    match class {
        AttackClass::Safe => "completed",
        AttackClass::ForeignOutOfBounds | AttackClass::LocalOutOfBounds => {
            "silent corruption or a wild access"
        }
        AttackClass::UseAfterRelease => "a release fault",
        AttackClass::RecordMetadata => "corrupted record metadata",
        AttackClass::ForgedCapability => "an unregistered returned word",
    }
}

/// True when `outcome` is what `class` predicts.
#[must_use]
pub fn outcome_agrees(class: AttackClass, outcome: &ExecutionOutcome) -> bool {
    match class {
        AttackClass::Safe => *outcome == ExecutionOutcome::Completed,
        AttackClass::ForeignOutOfBounds | AttackClass::LocalOutOfBounds => matches!(
            outcome,
            ExecutionOutcome::SilentCorruption { .. }
                | ExecutionOutcome::Fault {
                    kind: FaultKind::WildAccess,
                    ..
                }
        ),
        AttackClass::UseAfterRelease => matches!(
            outcome,
            ExecutionOutcome::Fault {
                kind: FaultKind::UseAfterRelease
                    | FaultKind::DoubleRelease
                    | FaultKind::InvalidRelease,
                ..
            }
        ),
        AttackClass::RecordMetadata => {
            matches!(outcome, ExecutionOutcome::MetadataCorrupted { .. })
        }
        AttackClass::ForgedCapability => {
            matches!(outcome, ExecutionOutcome::Returned { unvalidated, .. } if *unvalidated > 0)
        }
    }
}

/// Runs catalog entries against the shadow host.
#[derive(Debug, Clone)]
pub struct CatalogRunner {
    host: ShadowHost,
    calls: usize,
    emitter: Option<SharedEmitter>,
}

impl Default for CatalogRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogRunner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: ShadowHost::new(),
            calls: DEFAULT_CALLS,
            emitter: None,
        }
    }

    /// Calls per forged-capability slot (at least one).
    #[must_use]
    pub fn with_calls(mut self, calls: usize) -> Self {
        self.calls = calls.max(1);
        self
    }

    /// Log diagnostics and per-entry verdicts to `emitter`.
    #[must_use]
    pub fn with_emitter(mut self, emitter: SharedEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    #[must_use]
    pub fn host(&self) -> &ShadowHost {
        &self.host
    }

    /// Run a single entry. Returning primitives that touch no memory are
    /// invoked as callbacks; everything else is executed once.
    pub fn run_entry(&self, entry: &CatalogEntry, forge: &mut dyn ForgeSource) -> RunRecord {
        let log_sink = self.emitter.clone().map(LogSink::new);
        let sink: &dyn DiagnosticSink = match &log_sink {
            Some(sink) => sink,
            None => &NullSink,
        };
        let primitive = entry.primitive();
        let outcome = match CallbackSlot::new(primitive) {
            Some(mut slot) if primitive.operations().is_empty() => {
                self.host.invoke_callback(&mut slot, self.calls, forge, sink)
            }
            _ => self.host.execute(primitive, forge, sink),
        };
        let classification = entry.classification();
        RunRecord {
            id: entry.id().to_string(),
            class: classification.class,
            risk: classification.risk,
            consistent: outcome_agrees(classification.class, &outcome),
            outcome,
        }
    }

    /// Run every entry in catalog order.
    pub fn run(
        &self,
        catalog: &Catalog,
        forge: &mut dyn ForgeSource,
    ) -> Result<Vec<RunRecord>, HarnessError> {
        let mut records = Vec::with_capacity(catalog.len());
        for entry in catalog.iter() {
            let record = self.run_entry(entry, forge);
            self.log_record(entry, &record)?;
            records.push(record);
        }
        self.log_summary(&RunSummary::from_records(&records))?;
        Ok(records)
    }

    fn log_record(&self, entry: &CatalogEntry, record: &RunRecord) -> Result<(), HarnessError> {
        let Some(emitter) = &self.emitter else {
            return Ok(());
        };
        let level = if record.consistent {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        let log = LogEntry::new(String::new(), level, "primitive_run")
            .with_primitive(record.id.as_str())
            .with_classification(record.class, record.risk)
            .with_target_kind(entry.primitive().target_kind())
            .with_observed(record.outcome.label())
            .with_verdict(record.verdict())
            .with_details(serde_json::to_value(&record.outcome)?);
        emitter.lock().emit_entry(log)?;
        Ok(())
    }

    fn log_summary(&self, summary: &RunSummary) -> Result<(), HarnessError> {
        let Some(emitter) = &self.emitter else {
            return Ok(());
        };
        let (level, verdict) = if summary.all_consistent() {
            (LogLevel::Info, Verdict::Pass)
        } else {
            (LogLevel::Error, Verdict::Fail)
        };
        let log = LogEntry::new(String::new(), level, "run_summary")
            .with_verdict(verdict)
            .with_details(serde_json::to_value(summary)?);
        let mut emitter = emitter.lock();
        emitter.emit_entry(log)?;
        emitter.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clacat_core::{FixedForge, GeneratorConfig};

    #[test]
    fn canonical_catalog_agrees_with_the_host() {
        let catalog = Catalog::generate(GeneratorConfig::default()).expect("catalog");
        let records = CatalogRunner::new()
            .run(&catalog, &mut FixedForge::default())
            .expect("run");
        for record in &records {
            record.check().expect("consistent");
        }
        let summary = RunSummary::from_records(&records);
        assert_eq!(summary.total, catalog.len());
        assert!(summary.all_consistent());
    }

    #[test]
    fn mismatch_is_reported_with_expectation() {
        let record = RunRecord {
            id: "x".to_string(),
            class: AttackClass::RecordMetadata,
            risk: RiskLevel::High,
            outcome: ExecutionOutcome::Completed,
            consistent: false,
        };
        assert_eq!(record.verdict(), Verdict::Fail);
        let err = record.check().expect_err("inconsistent");
        assert!(err.to_string().contains("corrupted record metadata"));
    }

    #[test]
    fn registered_return_is_not_a_forged_capability() {
        let outcome = ExecutionOutcome::Returned {
            values: vec![0x4000_1000],
            unvalidated: 0,
        };
        assert!(!outcome_agrees(AttackClass::ForgedCapability, &outcome));
    }
}
