//! Classifier scenarios and whole-catalog classification properties.

use clacat_core::{
    AttackClass, AttackPrimitive, Catalog, GeneratorConfig, Operation, RiskLevel,
    TargetDescriptor, ValueSource, classify,
};

fn catalog() -> Catalog {
    Catalog::generate(GeneratorConfig::default()).expect("canonical catalog generates")
}

#[test]
fn foreign_forged_write_at_three_is_class1_high() {
    let p = AttackPrimitive::new("s1", Some(TargetDescriptor::ForeignHandle))
        .with_op(Operation::write(3, ValueSource::Forged));
    let c = classify(&p);
    assert_eq!(c.class, AttackClass::ForeignOutOfBounds);
    assert_eq!(c.class.code(), 1);
    assert_eq!(c.risk, RiskLevel::High);
}

#[test]
fn release_write_release_is_class2_high() {
    let p = AttackPrimitive::new("s2", Some(TargetDescriptor::ForeignHandle))
        .with_op(Operation::release())
        .with_op(Operation::write(0, ValueSource::Fixed(0)))
        .with_op(Operation::release());
    let c = classify(&p);
    assert_eq!(c.class, AttackClass::UseAfterRelease);
    assert_eq!(c.risk, RiskLevel::High);
}

#[test]
fn record_length_blowup_is_class4_high() {
    let p = AttackPrimitive::new("s3", Some(TargetDescriptor::RecordTriple))
        .with_op(Operation::write(1, ValueSource::Fixed(10_000_000)));
    let c = classify(&p);
    assert_eq!(c.class, AttackClass::RecordMetadata);
    assert_eq!(c.risk, RiskLevel::High);
}

#[test]
fn local_forged_write_at_twenty_eight_is_class3_high() {
    let p = AttackPrimitive::new("s4", Some(TargetDescriptor::local(1)))
        .with_op(Operation::write(28, ValueSource::Forged));
    let c = classify(&p);
    assert_eq!(c.class, AttackClass::LocalOutOfBounds);
    assert_eq!(c.risk, RiskLevel::High);
}

#[test]
fn returned_constant_is_class5_high() {
    let p = AttackPrimitive::returning_only("s5", ValueSource::Fixed(42));
    assert!(p.operations().is_empty());
    let c = classify(&p);
    assert_eq!(c.class, AttackClass::ForgedCapability);
    assert_eq!(c.risk, RiskLevel::High);
}

#[test]
fn in_bounds_local_zero_is_safe_low() {
    let p = AttackPrimitive::new("s6", Some(TargetDescriptor::local(1)))
        .with_op(Operation::write(0, ValueSource::Fixed(0)));
    let c = classify(&p);
    assert_eq!(c.class, AttackClass::Safe);
    assert_eq!(c.risk, RiskLevel::Low);
}

#[test]
fn classification_is_deterministic_over_the_catalog() {
    let catalog = catalog();
    catalog.verify_determinism().expect("stable labels");
    for entry in catalog.iter() {
        assert_eq!(&classify(entry.primitive()), entry.classification());
    }
}

#[test]
fn safe_entries_carry_no_forged_store_and_no_release() {
    let catalog = catalog();
    for entry in catalog.by_class(AttackClass::Safe) {
        let p = entry.primitive();
        assert!(p.returns().is_none(), "{}", entry.id());
        for op in p.operations() {
            assert!(!matches!(op, Operation::Release { .. }), "{}", entry.id());
            if let (Some(value), Some(target)) = (op.value(), p.target()) {
                assert!(!value.is_tainted(), "{}", entry.id());
                assert!(target.contains(op.offset().effective()), "{}", entry.id());
            }
        }
        assert_eq!(entry.classification().risk, RiskLevel::Low);
    }
}

#[test]
fn generated_attacks_are_high_risk() {
    // Every generated overrun carries forged bits, so no attack entry is Low.
    let catalog = catalog();
    for entry in catalog.iter() {
        let c = entry.classification();
        let expected = if c.class == AttackClass::Safe {
            RiskLevel::Low
        } else {
            RiskLevel::High
        };
        assert_eq!(c.risk, expected, "{}", entry.id());
        assert!(!c.rationale.is_empty());
    }
}

#[test]
fn forged_capabilities_have_no_target() {
    let catalog = catalog();
    for entry in catalog.by_class(AttackClass::ForgedCapability) {
        assert!(entry.primitive().target().is_none());
        assert!(entry.primitive().returns().is_some());
    }
    assert_eq!(
        catalog.instantiate_callbacks().len(),
        catalog.by_class(AttackClass::ForgedCapability).count()
    );
}
