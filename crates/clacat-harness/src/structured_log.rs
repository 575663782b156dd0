//! Structured JSONL logging for catalog generation and shadow runs.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to a file, stdout, or a shared buffer.
//! - [`LogSink`]: adapts an emitter to the core [`DiagnosticSink`].
//! - [`validate_log_line`] / [`validate_log_file`]: schema checks.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clacat_core::{AttackClass, Diagnostic, DiagnosticSink, RiskLevel, TargetKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Verdict of a consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

const VERDICTS: [&str; 2] = ["pass", "fail"];

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primitive_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_class: Option<AttackClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_kind: Option<TargetKind>,
    /// Simulated address the primitive received or touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<u64>,
    /// Effective word offset, relative to the target base.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    /// Observed execution outcome label (e.g. `fault:use_after_release`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            primitive_id: None,
            attack_class: None,
            risk: None,
            target_kind: None,
            address: None,
            offset: None,
            value: None,
            observed: None,
            verdict: None,
            details: None,
        }
    }

    /// Set the primitive under test.
    #[must_use]
    pub fn with_primitive(mut self, id: impl Into<String>) -> Self {
        self.primitive_id = Some(id.into());
        self
    }

    /// Set the classification fields.
    #[must_use]
    pub fn with_classification(mut self, class: AttackClass, risk: RiskLevel) -> Self {
        self.attack_class = Some(class);
        self.risk = Some(risk);
        self
    }

    #[must_use]
    pub fn with_target_kind(mut self, kind: Option<TargetKind>) -> Self {
        self.target_kind = kind;
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: u64) -> Self {
        self.address = Some(address);
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

    #[must_use]
    pub fn with_observed(mut self, observed: impl Into<String>) -> Self {
        self.observed = Some(observed.into());
        self
    }

    #[must_use]
    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// In-memory JSONL buffer shared between an emitter and its reader.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as UTF-8 (lossy).
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Non-empty lines written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes structured JSONL log entries with `<run>::<scope>::<seq>` trace ids.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    run_id: String,
    scope: String,
}

impl std::fmt::Debug for LogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEmitter")
            .field("seq", &self.seq)
            .field("run_id", &self.run_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str, scope: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            std::io::BufWriter::new(file),
            run_id,
            scope,
        ))
    }

    /// Create an emitter that appends to `buffer`.
    #[must_use]
    pub fn to_buffer(buffer: SharedBuffer, run_id: &str, scope: &str) -> Self {
        Self::to_writer(buffer, run_id, scope)
    }

    fn to_writer(writer: impl Write + Send + 'static, run_id: &str, scope: &str) -> Self {
        Self {
            writer: Box::new(writer),
            seq: 0,
            run_id: run_id.to_string(),
            scope: scope.to_string(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Generate the next trace ID.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{}::{:03}", self.run_id, self.scope, self.seq)
    }

    /// Emit a log entry with auto-generated trace_id and run_id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = LogEntry::new(String::new(), level, event);
        self.emit_entry(entry)
    }

    /// Emit a populated entry, filling in trace_id and run_id when missing.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<LogEntry> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Emitter shared between a runner and diagnostic sinks.
pub type SharedEmitter = Arc<Mutex<LogEmitter>>;

/// Forwards core diagnostics to a [`LogEmitter`] at debug level.
#[derive(Debug, Clone)]
pub struct LogSink {
    emitter: SharedEmitter,
}

impl LogSink {
    #[must_use]
    pub fn new(emitter: SharedEmitter) -> Self {
        Self { emitter }
    }
}

impl DiagnosticSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        let mut entry = LogEntry::new(String::new(), LogLevel::Debug, diagnostic.event)
            .with_primitive(diagnostic.primitive_id.as_str());
        entry.address = diagnostic.target_address;
        entry.offset = diagnostic.offset;
        entry.value = diagnostic.value;
        // Diagnostics are observational; a failed write must not disturb the run.
        let _ = self.emitter.lock().emit_entry(entry);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();
    let err = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Err(vec![err("<json>", format!("invalid JSON: {e}"))]),
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![err("<root>", "expected JSON object".to_string())]);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(err(field, "required field missing".to_string()));
        }
    }

    let enums: [(&str, &[&str]); 4] = [
        ("level", &LEVELS),
        ("verdict", &VERDICTS),
        ("risk", &["low", "high"]),
        ("target_kind", &["foreign_handle", "local_buffer", "record_triple"]),
    ];
    for (field, allowed) in enums {
        if let Some(v) = obj.get(field).and_then(|v| v.as_str())
            && !allowed.contains(&v)
        {
            errors.push(err(field, format!("invalid {field}: '{v}'")));
        }
    }

    if let Some(class) = obj.get("attack_class").and_then(|v| v.as_str())
        && !AttackClass::ALL.iter().any(|c| c.as_str() == class)
    {
        errors.push(err("attack_class", format!("invalid attack_class: '{class}'")));
    }

    for field in ["address", "value"] {
        if let Some(v) = obj.get(field)
            && !v.is_u64()
        {
            errors.push(err(field, format!("{field} must be an unsigned 64-bit integer")));
        }
    }
    if let Some(v) = obj.get("offset")
        && !v.is_i64()
    {
        errors.push(err("offset", "offset must be a signed integer".to_string()));
    }

    // Classified entries carry both halves of the label.
    if obj.contains_key("attack_class") != obj.contains_key("risk") {
        errors.push(err(
            "risk",
            "attack_class and risk must be present together".to_string(),
        ));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && trace_id.split("::").count() != 3
    {
        errors.push(err(
            "trace_id",
            format!("trace_id should follow <run>::<scope>::<seq> format, got: '{trace_id}'"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value)
        .map_err(|e| vec![err("<deserialization>", format!("failed to deserialize: {e}"))])
}

/// Validate an entire JSONL file.
///
/// Returns the non-empty line count and any validation errors found.
pub fn validate_log_file(
    path: &Path,
) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(validate_log_text(&content))
}

/// Validate JSONL text already in memory.
#[must_use]
pub fn validate_log_text(content: &str) -> (usize, Vec<LogValidationError>) {
    let mut all_errors = Vec::new();
    let mut line_count = 0;
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }
    (line_count, all_errors)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new("run-1::verify::001", LogLevel::Info, "run_start");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "run-1::verify::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "run_start");
        // Optional fields should be absent
        assert!(parsed.get("primitive_id").is_none());
        assert!(parsed.get("attack_class").is_none());
        assert!(parsed.get("verdict").is_none());
    }

    #[test]
    fn civil_dates_are_exact() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(59), (1970, 3, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn emitter_generates_sequential_trace_ids() {
        let buffer = SharedBuffer::new();
        let mut emitter = LogEmitter::to_buffer(buffer.clone(), "run-42", "verify");
        let e1 = emitter.emit(LogLevel::Info, "start").unwrap();
        let e2 = emitter.emit(LogLevel::Info, "end").unwrap();
        assert_eq!(e1.trace_id, "run-42::verify::001");
        assert_eq!(e2.trace_id, "run-42::verify::002");
        assert_eq!(buffer.lines().len(), 2);
    }

    #[test]
    fn sink_forwards_diagnostics() {
        let buffer = SharedBuffer::new();
        let emitter = LogEmitter::to_buffer(buffer.clone(), "r", "diag");
        let sink = LogSink::new(Arc::new(Mutex::new(emitter)));
        sink.report(
            Diagnostic::new(clacat_core::PrimitiveId::new("foreign-oob-01"), "write")
                .with_address(0x1000)
                .with_offset(3)
                .with_value(7),
        );
        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        let entry = validate_log_line(&lines[0], 1).unwrap();
        assert_eq!(entry.primitive_id.as_deref(), Some("foreign-oob-01"));
        assert_eq!(entry.offset, Some(3));
        assert_eq!(entry.level, LogLevel::Debug);
    }

    #[test]
    fn validation_rejects_unknown_class_and_half_labels() {
        let line = r#"{"timestamp":"t","trace_id":"a::b::1","level":"info","event":"x","attack_class":"class9","risk":"high"}"#;
        let errs = validate_log_line(line, 1).unwrap_err();
        assert!(errs.iter().any(|e| e.field == "attack_class"));

        let line = r#"{"timestamp":"t","trace_id":"a::b::1","level":"info","event":"x","attack_class":"safe"}"#;
        let errs = validate_log_line(line, 1).unwrap_err();
        assert!(errs.iter().any(|e| e.field == "risk"));
    }

    #[test]
    fn verdicts_are_pass_or_fail() {
        for verdict in VERDICTS {
            let line = format!(
                r#"{{"timestamp":"t","trace_id":"a::b::1","level":"info","event":"x","verdict":"{verdict}"}}"#
            );
            assert!(validate_log_line(&line, 1).is_ok(), "{verdict}");
        }
        let line = r#"{"timestamp":"t","trace_id":"a::b::1","level":"info","event":"x","verdict":"skip"}"#;
        let errs = validate_log_line(line, 1).unwrap_err();
        assert!(errs.iter().any(|e| e.field == "verdict"));
    }
}
