//! Lazy evaluation, invalidation and inversion through the dependency graph.

mod common;

use common::{num, number, TestDocument};
use docflow::{
    CellKey, ComponentSpec, ComponentType, Definition, Dependencies, Dependency, DiagnosticKind,
    EngineConfig, StateVariable, Value, ValueError,
};

fn sum_of_two() -> TestDocument {
    TestDocument::new([
        ComponentSpec::new("sum")
            .named("s")
            .child(number("1").named("a"))
            .child(number("2").named("b")),
        ComponentSpec::new("number")
            .named("c")
            .child(ComponentSpec::copy_prop("s", "value")),
    ])
}

#[test]
fn reads_are_memoized() {
    let mut t = sum_of_two();
    let s = t.id("s");
    t.assert_value("s", "value", num(3.0));
    let evaluated = t.doc().evaluations(s, "value");
    assert_eq!(evaluated, 1);

    for _ in 0..5 {
        t.assert_value("s", "value", num(3.0));
    }
    assert_eq!(t.doc().evaluations(s, "value"), evaluated);
}

#[test]
fn changes_propagate_to_dependents() {
    let mut t = sum_of_two();
    t.assert_value("c", "value", num(3.0));

    assert!(t.set("a", "value", num(10.0)).applied());
    t.assert_value("a", "value", num(10.0));
    t.assert_value("s", "value", num(12.0));
    t.assert_value("c", "value", num(12.0));
}

#[test]
fn unchanged_intermediate_stops_recomputation() {
    let mut t = TestDocument::new([
        number("1.2").named("n").attribute("displayDecimals", 0),
        ComponentSpec::new("text")
            .named("t")
            .child(ComponentSpec::copy_prop("n", "text")),
    ]);
    let text = t.id("t");
    t.assert_value("t", "value", "1");
    let before = t.doc().evaluations(text, "value");

    t.set("n", "value", num(1.3));
    t.assert_value("n", "value", num(1.3));
    t.assert_value("t", "value", "1");
    assert_eq!(t.doc().evaluations(text, "value"), before);

    t.set("n", "value", num(2.6));
    t.assert_value("t", "value", "3");
    assert_eq!(t.doc().evaluations(text, "value"), before + 1);
}

#[test]
fn inverse_walks_through_mirrors() {
    let mut t = TestDocument::new([
        number("4").named("n"),
        ComponentSpec::new("text")
            .named("t")
            .child(ComponentSpec::copy_prop("n", "text")),
    ]);
    t.assert_value("t", "value", "4");

    t.set("t", "value", Value::text("7"));
    t.assert_value("n", "value", num(7.0));
    t.assert_value("t", "value", "7");
}

#[test]
fn sum_inverse_adjusts_last_term() {
    let mut t = sum_of_two();
    t.set("c", "value", num(20.0));
    t.assert_value("a", "value", num(1.0));
    t.assert_value("b", "value", num(19.0));
    t.assert_value("s", "value", num(20.0));
}

#[test]
fn unsupported_inverse_leaves_state_untouched() {
    let mut t = TestDocument::new([ComponentSpec::new("text")
        .named("t")
        .text("a")
        .child(ComponentSpec::new("text").text("b"))]);
    t.assert_value("t", "value", "ab");

    let t_id = t.id("t");
    let err = t
        .doc_mut()
        .dispatch(CellKey::new(t_id, "value"), Value::text("zz"), Default::default())
        .unwrap_err();
    assert!(err.is_inversion_unsupported());
    t.assert_value("t", "value", "ab");
    assert_eq!(t.doc().action_stats().rejected, 1);
}

fn echo(from: &str) -> StateVariable {
    StateVariable::scalar()
        .depends_on(Dependencies::new().with("input", Dependency::own(from)))
        .definition(|values| Ok(Definition::value(values.value("input").clone())))
}

#[test]
fn definition_cycles_are_reported() {
    let cyclic = ComponentType::new("loop")
        .state_variable("x", echo("y"))
        .state_variable("y", echo("x"))
        .state_variable("z", echo("x"));
    let mut t = TestDocument::with_types([cyclic], [ComponentSpec::new("loop").named("l")]);
    let l = t.id("l");

    let err = t.doc_mut().get_value(l, "x").unwrap_err();
    assert_eq!(
        err,
        ValueError::DefinitionCycle {
            cell: CellKey::new(l, "x")
        }
    );
    // Cells downstream of a cycle degrade instead of failing.
    assert_eq!(t.doc_mut().get_value(l, "z"), Ok(Value::Invalid));

    let diagnostics = t.doc_mut().take_diagnostics();
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::DefinitionCycle && d.cell == Some(CellKey::new(l, "x"))));
}

#[test]
fn undefined_variables_are_errors() {
    let mut t = sum_of_two();
    let s = t.id("s");
    assert!(matches!(
        t.doc_mut().get_value(s, "nope"),
        Err(ValueError::Undefined { .. })
    ));
}

#[test]
fn why_did_change_names_the_changed_input() {
    let mut t = sum_of_two();
    t.doc_mut().enable_change_tracking();
    t.assert_value("s", "value", num(3.0));

    t.set("a", "value", num(5.0));
    t.assert_value("s", "value", num(7.0));

    let (a, s) = (t.id("a"), t.id("s"));
    let reason = t
        .doc()
        .why_did_change(&CellKey::new(s, "value"))
        .expect("sum changed during the last action");
    assert!(reason.triggered_by.contains(&CellKey::new(a, "value")));

    let b = t.id("b");
    assert!(t.doc().why_did_change(&CellKey::new(b, "value")).is_none());
}

#[test]
fn oversized_display_decimals_are_invalid() {
    let mut t = TestDocument::new([number("1").named("n").attribute("displayDecimals", 200_000_000)]);
    t.assert_value("n", "text", Value::Invalid);
    t.assert_value("n", "value", num(1.0));
    assert!(t
        .doc_mut()
        .take_diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::NumericOrDomain));
}

fn mirror_chain(length: usize) -> Vec<ComponentSpec> {
    let mut children = vec![number("7").named("n0")];
    for i in 1..length {
        children.push(
            ComponentSpec::new("number")
                .named(format!("n{i}"))
                .child(ComponentSpec::copy(format!("n{}", i - 1))),
        );
    }
    children
}

#[test]
fn long_mirror_chains_stop_at_the_resolve_depth() {
    let config = EngineConfig {
        max_resolve_depth: 4,
        ..EngineConfig::default()
    };
    let mut shallow = TestDocument::with_config(mirror_chain(10), config);
    shallow.assert_value("n9", "value", Value::Invalid);

    let mut t = TestDocument::new(mirror_chain(10));
    t.assert_value("n9", "value", num(7.0));
}
