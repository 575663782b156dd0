//! Scoring the catalog's own labels against descriptive ground-truth CSVs.

use std::fmt::Write as _;

use clacat_core::{AttackClass, Catalog, GeneratorConfig, LabelSet, evaluate};

fn describe(class: AttackClass) -> &'static str {
    match class {
        AttackClass::Safe => "benign",
        AttackClass::ForeignOutOfBounds => "Rust Bounds Check Bypass",
        AttackClass::UseAfterRelease => "Rust Lifetime Bypass",
        AttackClass::LocalOutOfBounds => "Hardening Bypass via Stack Overflow",
        AttackClass::RecordMetadata => "Dynamic Bounds Corruption (Vec metadata)",
        AttackClass::ForgedCapability => "Intended Interaction Corruption",
    }
}

fn truth_csv(catalog: &Catalog, relabel: Option<(&str, AttackClass)>) -> String {
    let mut csv = String::from("function_name,language,attack_type\n");
    for entry in catalog.iter() {
        let id = entry.id().to_string();
        let class = match relabel {
            Some((target, class)) if target == id => class,
            _ => entry.class(),
        };
        writeln!(csv, "{id},c,\"{}\"", describe(class)).expect("write to string");
    }
    csv
}

#[test]
fn catalog_scores_perfectly_against_its_own_descriptions() {
    let catalog = Catalog::generate(GeneratorConfig::default()).expect("catalog");
    let truth = LabelSet::from_csv_reader(truth_csv(&catalog, None).as_bytes()).expect("csv");
    assert_eq!(truth.len(), catalog.len());

    let report = evaluate(&truth, &LabelSet::from_catalog(&catalog));
    assert_eq!(report.evaluated, catalog.len());
    assert!((report.accuracy - 1.0).abs() < f64::EPSILON);
    assert!(report.mismatches.is_empty());
    assert!(report.truth_only.is_empty() && report.predicted_only.is_empty());
    for (class, count) in catalog.class_counts() {
        assert_eq!(report.confusion.get(class, class), count);
    }
}

#[test]
fn one_disputed_label_shows_up_in_the_confusion_matrix() {
    let catalog = Catalog::generate(GeneratorConfig::default()).expect("catalog");
    let entry = catalog
        .iter()
        .find(|e| e.class() == AttackClass::RecordMetadata)
        .expect("metadata entry");
    let id = entry.id().to_string();
    let csv = truth_csv(&catalog, Some((&id, AttackClass::ForgedCapability)));
    let truth = LabelSet::from_csv_reader(csv.as_bytes()).expect("csv");

    let report = evaluate(&truth, &LabelSet::from_catalog(&catalog));
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].name, id);
    assert_eq!(report.mismatches[0].truth, AttackClass::ForgedCapability);
    assert_eq!(report.mismatches[0].predicted, AttackClass::RecordMetadata);
    assert_eq!(
        report
            .confusion
            .get(AttackClass::ForgedCapability, AttackClass::RecordMetadata),
        1
    );
    let forged = report.metrics(AttackClass::ForgedCapability).expect("metrics");
    assert_eq!(forged.false_negatives, 1);
    let metadata = report.metrics(AttackClass::RecordMetadata).expect("metrics");
    assert_eq!(metadata.false_positives, 1);
    assert!(metadata.precision < 1.0);
    assert!(report.accuracy < 1.0);
}
