//! Name lookup, indexing through composites and namespaces.

mod common;

use common::{num, number, TestDocument};
use docflow::{ComponentSpec, ExpansionError, ExpansionStatus, PathError, Value};

fn letter(text: &str) -> ComponentSpec {
    ComponentSpec::new("text").text(text)
}

#[test]
fn indexing_sees_through_wrappers() {
    let mut t = TestDocument::new([ComponentSpec::new("group")
        .named("g")
        .child(ComponentSpec::new("group").child(letter("A")).text("  ").child(letter("B")))
        .text("\n")
        .child(letter("C"))]);

    t.assert_value("g[1]", "value", "A");
    t.assert_value("g[2]", "value", "B");
    t.assert_value("g[3]", "value", "C");
    assert!(t.try_id("g[4]").is_none());
}

#[test]
fn map_items_flatten_in_order() {
    let inner = |a: &str, b: &str| ComponentSpec::new("group").child(letter(a)).child(letter(b));
    let mut t = TestDocument::new([ComponentSpec::new("map")
        .named("rows")
        .attribute("alias", "r")
        .child(ComponentSpec::new("template").child(inner("x", "y")))
        .child(number("1"))
        .child(number("2"))]);

    // Each item contributes the flattened content of its inner group.
    t.assert_value("rows[1]", "value", "x");
    t.assert_value("rows[2]", "value", "y");
    t.assert_value("rows[3]", "value", "x");
    t.assert_value("rows[4]", "value", "y");
    assert!(t.try_id("rows[5]").is_none());
}

#[test]
fn names_resolve_from_nested_origins() {
    let mut t = TestDocument::new([
        ComponentSpec::new("section")
            .named("sec")
            .child(ComponentSpec::new("p").child(number("5").named("deep"))),
        ComponentSpec::new("number")
            .named("mirror")
            .child(ComponentSpec::copy("deep")),
    ]);
    t.assert_value("deep", "value", num(5.0));
    t.assert_value("mirror", "value", num(5.0));
    t.assert_value("/sec", "text", "5");
}

#[test]
fn property_suffix_is_left_over() {
    let mut t = TestDocument::new([ComponentSpec::new("point").named("P").attribute("x", 3)]);
    let root = t.doc().root();
    let p = t.id("P");

    let resolution = t.doc_mut().resolve_path(root, "P.x1").unwrap();
    assert_eq!(resolution.component, p);
    assert_eq!(resolution.property().map(|name| &**name), Some("x1"));
    assert!(t.try_id("P.x1").is_none());
}

#[test]
fn copy_reads_a_property_from_the_path() {
    let mut t = TestDocument::new([
        ComponentSpec::new("point").named("P").attribute("x", 3).attribute("y", 4),
        ComponentSpec::new("number")
            .named("second")
            .child(ComponentSpec::copy("P.x2")),
    ]);
    t.assert_value("second", "value", num(4.0));
}

#[test]
fn map_items_get_their_own_namespace() {
    let template = ComponentSpec::new("template").child(
        ComponentSpec::new("number")
            .named("item")
            .child(ComponentSpec::copy("v")),
    );
    let mut t = TestDocument::new([ComponentSpec::new("map")
        .named("m")
        .attribute("alias", "v")
        .child(template)
        .child(number("7"))
        .child(number("8"))]);

    let first = t.id("m[1]");
    let second = t.id("m[2]");
    assert_ne!(first, second);
    // Inside its namespace each copy of `item` finds itself.
    assert_eq!(t.doc_mut().resolve_path_to_id("item", first), Some(first));
    assert_eq!(t.doc_mut().resolve_path_to_id("item", second), Some(second));
    assert_eq!(t.doc_mut().get_value(second, "value"), Ok(Value::Number(8.0)));
}

#[test]
fn unknown_names_and_bad_syntax_are_errors() {
    let mut t = TestDocument::new([number("1").named("a")]);
    let root = t.doc().root();
    assert!(matches!(
        t.doc_mut().resolve_path(root, "missing"),
        Err(PathError::Unresolved { .. })
    ));
    assert!(matches!(
        t.doc_mut().resolve_path(root, "a[["),
        Err(PathError::Syntax { .. })
    ));
    assert!(t.try_id("a[1]").is_none());
}

#[test]
fn id_anchors_address_components_directly() {
    let mut t = TestDocument::new([number("1").named("a")]);
    let a = t.id("a");
    assert_eq!(t.try_id(&a.to_string()), Some(a));
}

#[test]
fn search_blocked_by_the_expanding_copy_is_self_referential() {
    let mut t = TestDocument::new([ComponentSpec::copy("nowhere").named("c")]);
    let c = t.id("c");
    let status = t.doc_mut().ensure_expanded(c).unwrap();
    assert!(matches!(
        status,
        ExpansionStatus::Degraded(ExpansionError::Path(PathError::SelfReferential { .. }))
    ));
    assert!(t.doc().replacements(c).is_empty());
}
