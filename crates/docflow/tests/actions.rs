//! Action dispatch: skippable bursts, transient edits and follow-up tasks.

mod common;

use common::{num, numbers, TestDocument};
use docflow::ledger::DeltaKind;
use docflow::{
    ActionEffect, ActionError, ActionOutcome, ActionRequest, ComponentSpec, ComponentType,
    Definition, EngineConfig, InverseInstruction, StateVariable, Value,
};

fn point() -> ComponentSpec {
    ComponentSpec::new("point").named("P").attribute("x", 0).attribute("y", 0)
}

fn drag(t: &mut TestDocument, steps: usize) -> Vec<ActionOutcome> {
    let p = t.id("P");
    (1..=steps)
        .map(|i| {
            let request = ActionRequest::new(p, "movePoint")
                .arg("x", i as f64)
                .arg("y", -(i as f64))
                .skippable();
            t.doc_mut().request_action(request).unwrap()
        })
        .collect()
}

#[test]
fn skippable_burst_applies_first_and_last() {
    let mut t = TestDocument::new([point()]);
    let outcomes = drag(&mut t, 100);

    assert_eq!(outcomes[0], ActionOutcome::Applied);
    assert!(outcomes[1..].iter().all(|o| *o == ActionOutcome::Deferred));
    assert_eq!(t.doc().action_stats().applied, 1);

    // Observing flushes the deferred action.
    t.assert_value("P", "xs", numbers(&[100.0, -100.0]));
    let stats = t.doc().action_stats();
    assert_eq!(stats.applied, 2);
    assert_eq!(stats.coalesced, 98);
}

#[test]
fn burst_ends_at_another_target() {
    let mut t = TestDocument::new([point(), ComponentSpec::new("booleanInput").named("b")]);
    drag(&mut t, 3);
    t.action("b", "updateBoolean", &[("boolean", Value::Bool(true))]);

    // The deferred move was applied before the toggle.
    let stats = t.doc().action_stats();
    assert_eq!(stats.applied, 3);
    assert_eq!(stats.coalesced, 1);
    t.assert_value("P", "xs", numbers(&[3.0, -3.0]));
    t.assert_value("b", "value", true);
}

#[test]
fn coalescing_can_be_disabled() {
    let config = EngineConfig::from_toml_str("coalesce_skippable = false").unwrap();
    let mut t = TestDocument::with_config([point()], config);
    let outcomes = drag(&mut t, 10);
    assert!(outcomes.iter().all(ActionOutcome::applied));
    assert_eq!(t.doc().action_stats().applied, 10);
    assert_eq!(t.doc().action_stats().coalesced, 0);
}

#[test]
fn coalesced_actions_are_recorded() {
    let config = EngineConfig {
        record_ledger: true,
        ..EngineConfig::default()
    };
    let mut t = TestDocument::with_config([point()], config);
    drag(&mut t, 5);
    t.assert_value("P", "x1", num(5.0));

    let entries = t.doc().ledger().entries();
    let coalesced = entries
        .iter()
        .filter(|entry| matches!(entry.kind, DeltaKind::ActionCoalesced { .. }))
        .count();
    let applied = entries
        .iter()
        .filter(|entry| matches!(entry.kind, DeltaKind::ActionApplied { .. }))
        .count();
    assert_eq!(coalesced, 3);
    assert_eq!(applied, 2);
}

#[test]
fn transient_edits_are_confirmed_by_a_commit() {
    let mut t = TestDocument::new([ComponentSpec::new("textInput").named("ti")]);
    let ti = t.id("ti");
    for text in ["h", "hi", "hi!"] {
        let request = ActionRequest::new(ti, "updateImmediateValue")
            .arg("text", text)
            .transient();
        t.doc_mut().request_action(request).unwrap();
    }
    t.assert_value("ti", "immediateValue", "hi!");
    t.assert_value("ti", "value", "");
    assert!(t.doc_mut().take_commits().is_empty());

    t.action("ti", "updateValue", &[]);
    t.assert_value("ti", "value", "hi!");
    let commits = t.doc_mut().take_commits();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].confirmed_transient);
    assert_eq!(commits[0].target.component(), ti);

    // A plain action afterwards confirms nothing.
    t.action("ti", "updateImmediateValue", &[("text", Value::text("x"))]);
    let commits = t.doc_mut().take_commits();
    assert_eq!(commits.len(), 1);
    assert!(!commits[0].confirmed_transient);
}

#[test]
fn rejected_actions_change_nothing() {
    let mut t = TestDocument::new([point()]);
    let p = t.id("P");

    let err = t
        .doc_mut()
        .request_action(ActionRequest::new(p, "movePoint"))
        .unwrap_err();
    assert!(matches!(err, ActionError::MissingArgument { .. }));

    let err = t
        .doc_mut()
        .request_action(ActionRequest::new(p, "explode"))
        .unwrap_err();
    assert!(matches!(err, ActionError::UnknownAction { .. }));

    t.assert_value("P", "xs", numbers(&[0.0, 0.0]));
    assert!(t.doc_mut().take_commits().is_empty());
}

#[test]
fn bad_arguments_are_rejected() {
    let mut t = TestDocument::new([ComponentSpec::new("booleanInput").named("b")]);
    let b = t.id("b");
    let err = t
        .doc_mut()
        .request_action(ActionRequest::new(b, "updateBoolean").arg("boolean", "maybe"))
        .unwrap_err();
    assert!(matches!(err, ActionError::InvalidDesired { .. }));
    t.assert_value("b", "value", false);
}

fn timer() -> ComponentType {
    ComponentType::new("timer")
        .state_variable(
            "count",
            StateVariable::scalar()
                .for_renderer()
                .essential(0)
                .definition(|_| Ok(Definition::essential()))
                .inverse(|request| Ok(vec![InverseInstruction::essential(request.desired.clone())])),
        )
        .action("start", |_| Ok(vec![ActionEffect::schedule("bump", 2)]))
        .action("bump", |context| {
            let count = context.value("count")?.as_number().unwrap_or(0.0);
            Ok(vec![ActionEffect::update("count", Value::from(count + 1.0))])
        })
}

#[test]
fn scheduled_actions_run_when_due() {
    let mut t = TestDocument::with_types([timer()], [ComponentSpec::new("timer").named("clock")]);
    t.action("clock", "start", &[]);
    t.action("clock", "start", &[]);
    t.assert_value("clock", "count", num(0.0));

    assert_eq!(t.doc_mut().tick(), 0);
    t.assert_value("clock", "count", num(0.0));
    assert_eq!(t.doc_mut().tick(), 2);
    t.assert_value("clock", "count", num(2.0));
    assert_eq!(t.doc_mut().tick(), 0);
}
