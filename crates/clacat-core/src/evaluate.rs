//! Scoring of predicted class labels against ground truth.
//!
//! Label files are CSV with a header row. Recognised columns:
//! `function_name` (or `id`), `attack_type`, and an optional numeric
//! `label`; any other column (`language`, ...) is ignored. A valid `label`
//! wins over `attack_type`. `attack_type` goes through
//! [`AttackClass::from_str_loose`]; descriptive text that names no known
//! attack counts as safe.
//!
//! Only names present in both sets are scored.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::classify::AttackClass;
use crate::error::CatalogError;

const CLASSES: usize = AttackClass::ALL.len();

#[derive(Debug, Deserialize)]
struct LabelRow {
    #[serde(alias = "id")]
    function_name: String,
    #[serde(default)]
    attack_type: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

/// Parse one `attack_type` cell. Empty cells carry no label.
#[must_use]
pub fn parse_label(raw: &str) -> Option<AttackClass> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(AttackClass::from_str_loose(raw).unwrap_or(AttackClass::Safe))
}

/// Named class labels, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: BTreeMap<String, AttackClass>,
}

impl LabelSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels assigned by the classifier to every catalog entry, keyed by id.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        catalog
            .iter()
            .map(|entry| (entry.id().to_string(), entry.class()))
            .collect()
    }

    /// Read a CSV label file.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut set = Self::new();
        for (i, row) in csv.deserialize::<LabelRow>().enumerate() {
            let row = row?;
            let name = row.function_name.trim();
            if name.is_empty() {
                continue;
            }
            let numeric = row
                .label
                .as_deref()
                .and_then(|raw| raw.trim().parse::<u8>().ok())
                .and_then(AttackClass::from_code);
            let class = numeric
                .or_else(|| row.attack_type.as_deref().and_then(parse_label))
                .ok_or_else(|| CatalogError::InvalidLabel {
                    row: i + 1,
                    message: format!("{name} has neither a label nor an attack_type"),
                })?;
            set.insert(name, class);
        }
        Ok(set)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    pub fn insert(&mut self, name: impl Into<String>, class: AttackClass) {
        self.labels.insert(name.into(), class);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<AttackClass> {
        self.labels.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, AttackClass)> {
        self.labels.iter().map(|(name, class)| (name.as_str(), *class))
    }
}

impl<S: Into<String>> FromIterator<(S, AttackClass)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (S, AttackClass)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, class) in iter {
            set.insert(name, class);
        }
        set
    }
}

/// Counts indexed by (true class, predicted class).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: [[usize; CLASSES]; CLASSES],
}

impl ConfusionMatrix {
    pub fn record(&mut self, truth: AttackClass, predicted: AttackClass) {
        self.counts[usize::from(truth.code())][usize::from(predicted.code())] += 1;
    }

    #[must_use]
    pub fn get(&self, truth: AttackClass, predicted: AttackClass) -> usize {
        self.counts[usize::from(truth.code())][usize::from(predicted.code())]
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    #[must_use]
    pub fn correct(&self) -> usize {
        (0..CLASSES).map(|c| self.counts[c][c]).sum()
    }

    /// Plain-text table, rows are true classes and columns predictions.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("{:<10}", "true\\pred");
        for class in AttackClass::ALL {
            out.push_str(&format!("{:>8}", class.code()));
        }
        for truth in AttackClass::ALL {
            out.push('\n');
            out.push_str(&format!("{:<10}", truth.code()));
            for predicted in AttackClass::ALL {
                out.push_str(&format!("{:>8}", self.get(truth, predicted)));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: AttackClass,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassMetrics {
    fn from_confusion(class: AttackClass, confusion: &ConfusionMatrix) -> Self {
        let tp = confusion.get(class, class);
        let others = AttackClass::ALL.into_iter().filter(|c| *c != class);
        let fp = others.clone().map(|t| confusion.get(t, class)).sum::<usize>();
        let fn_ = others.map(|p| confusion.get(class, p)).sum::<usize>();
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            class,
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            precision,
            recall,
            f1,
        }
    }
}

/// A scored name whose prediction differs from the truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub name: String,
    pub truth: AttackClass,
    pub predicted: AttackClass,
}

/// Result of scoring one label set against another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Names present in both sets.
    pub evaluated: usize,
    /// Names with a truth label but no prediction.
    pub truth_only: Vec<String>,
    /// Names with a prediction but no truth label.
    pub predicted_only: Vec<String>,
    pub accuracy: f64,
    pub classes: Vec<ClassMetrics>,
    pub confusion: ConfusionMatrix,
    pub mismatches: Vec<Mismatch>,
}

impl Evaluation {
    #[must_use]
    pub fn metrics(&self, class: AttackClass) -> Option<&ClassMetrics> {
        self.classes.iter().find(|m| m.class == class)
    }
}

/// Score `predicted` against `truth` over the names both sets share.
#[must_use]
pub fn evaluate(truth: &LabelSet, predicted: &LabelSet) -> Evaluation {
    let mut confusion = ConfusionMatrix::default();
    let mut mismatches = Vec::new();
    let mut truth_only = Vec::new();
    for (name, expected) in truth.iter() {
        let Some(actual) = predicted.get(name) else {
            truth_only.push(name.to_string());
            continue;
        };
        confusion.record(expected, actual);
        if expected != actual {
            mismatches.push(Mismatch {
                name: name.to_string(),
                truth: expected,
                predicted: actual,
            });
        }
    }
    let predicted_only = predicted
        .iter()
        .filter(|(name, _)| truth.get(name).is_none())
        .map(|(name, _)| name.to_string())
        .collect();
    let classes = AttackClass::ALL
        .into_iter()
        .map(|class| ClassMetrics::from_confusion(class, &confusion))
        .collect();
    Evaluation {
        evaluated: confusion.total(),
        truth_only,
        predicted_only,
        accuracy: ratio(confusion.correct(), confusion.total()),
        classes,
        confusion,
        mismatches,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, AttackClass)]) -> LabelSet {
        pairs.iter().map(|(n, c)| (*n, *c)).collect()
    }

    #[test]
    fn per_class_metrics_follow_the_confusion_counts() {
        use AttackClass::{ForeignOutOfBounds as C1, Safe, UseAfterRelease as C2};
        let truth = set(&[("a", C1), ("b", C1), ("c", C2), ("d", Safe)]);
        let predicted = set(&[("a", C1), ("b", C2), ("c", C2), ("d", C1)]);
        let eval = evaluate(&truth, &predicted);
        assert_eq!(eval.evaluated, 4);
        assert!((eval.accuracy - 0.5).abs() < 1e-12);
        let c1 = eval.metrics(C1).expect("class 1");
        assert_eq!((c1.true_positives, c1.false_positives, c1.false_negatives), (1, 1, 1));
        assert!((c1.precision - 0.5).abs() < 1e-12);
        assert!((c1.f1 - 0.5).abs() < 1e-12);
        let safe = eval.metrics(Safe).expect("safe");
        assert_eq!(safe.recall, 0.0);
        assert_eq!(safe.f1, 0.0);
        assert_eq!(eval.confusion.get(Safe, C1), 1);
        assert_eq!(eval.mismatches.len(), 2);
    }

    #[test]
    fn only_shared_names_are_scored() {
        let truth = set(&[("a", AttackClass::Safe), ("b", AttackClass::Safe)]);
        let predicted = set(&[("b", AttackClass::Safe), ("c", AttackClass::RecordMetadata)]);
        let eval = evaluate(&truth, &predicted);
        assert_eq!(eval.evaluated, 1);
        assert_eq!(eval.truth_only, vec!["a".to_string()]);
        assert_eq!(eval.predicted_only, vec!["c".to_string()]);
        assert!((eval.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_overlap_scores_zero() {
        let eval = evaluate(&LabelSet::new(), &set(&[("x", AttackClass::Safe)]));
        assert_eq!(eval.evaluated, 0);
        assert_eq!(eval.accuracy, 0.0);
    }

    #[test]
    fn csv_prefers_numeric_label_and_ignores_extra_columns() {
        let text = "function_name,attack_type,language,label\n\
                    f1,use-after-free,rust,\n\
                    f2,callback poisoning,c,4\n\
                    f3,something benign-looking,c,\n\
                    ,orphan,c,1\n";
        let labels = LabelSet::from_csv_reader(text.as_bytes()).expect("parses");
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get("f1"), Some(AttackClass::UseAfterRelease));
        assert_eq!(labels.get("f2"), Some(AttackClass::RecordMetadata));
        assert_eq!(labels.get("f3"), Some(AttackClass::Safe));
    }

    #[test]
    fn csv_row_without_any_label_fails() {
        let text = "function_name,attack_type\nf1,\n";
        match LabelSet::from_csv_reader(text.as_bytes()) {
            Err(CatalogError::InvalidLabel { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected an invalid label, got {other:?}"),
        }
    }

    #[test]
    fn confusion_table_renders_every_class() {
        let mut m = ConfusionMatrix::default();
        m.record(AttackClass::LocalOutOfBounds, AttackClass::ForeignOutOfBounds);
        let table = m.render();
        assert_eq!(table.lines().count(), 1 + CLASSES);
        assert!(table.lines().nth(4).expect("class 3 row").contains('1'));
    }
}
