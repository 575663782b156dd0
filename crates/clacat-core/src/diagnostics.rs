//! Observational diagnostic sink.
//!
//! Sinks see what a primitive did (target address, computed offset,
//! resulting value). Nothing they record feeds back into classification or
//! generation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::primitive::PrimitiveId;

/// One observation reported while a primitive runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub primitive_id: PrimitiveId,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(primitive_id: PrimitiveId, event: impl Into<String>) -> Self {
        Self {
            primitive_id,
            event: event.into(),
            target_address: None,
            offset: None,
            value: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: u64) -> Self {
        self.target_address = Some(address);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }
}

pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Keeps every diagnostic in memory, in report order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove and return everything reported so far.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    fn report(&self, diagnostic: Diagnostic) {
        (**self).report(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_report_order() {
        let sink = MemorySink::new();
        let id = PrimitiveId::new("forged-cb-01");
        sink.report(Diagnostic::new(id.clone(), "call").with_value(1));
        sink.report(Diagnostic::new(id, "call").with_value(2));
        let values: Vec<_> = sink.entries().iter().filter_map(|d| d.value).collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn diagnostic_omits_unset_fields() {
        let d = Diagnostic::new(PrimitiveId::new("x"), "write").with_offset(-3);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["offset"], -3);
        assert!(json.get("value").is_none());
        assert!(json.get("target_address").is_none());
    }
}
