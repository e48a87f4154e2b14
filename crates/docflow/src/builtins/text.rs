//! Leaf value types: raw strings, text, numbers and booleans.
//!
//! `text`, `number` and `boolean` take their value from their children
//! when they have any and from an essential value otherwise. Inverses
//! write back to a single child or to the essential value; several
//! children cannot be inverted.

use super::{
    concat, desired_boolean, desired_number, desired_value, hidden,
    invert_to_source, number_of, parse_boolean, parse_number, text_of, text_value, BOOLEAN,
    NUMBER, STRING, TEXT,
};
use crate::definition::{Definition, Dependencies, Dependency, InverseInstruction};
use crate::error::{DefinitionError, InverseError};
use crate::registry::{ComponentRegistry, ComponentType, StateVariable};
use crate::value::Value;

/// Largest `displayDecimals` a number renders with.
pub const MAX_DISPLAY_DECIMALS: usize = 100;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(string());
    registry.register(text());
    registry.register(number());
    registry.register(boolean());
}

fn children() -> Dependencies {
    Dependencies::new().with("children", Dependency::children(&[], &["value", "text"]))
}

fn string() -> ComponentType {
    ComponentType::new(STRING)
        .not_rendered()
        .state_variable(
            "value",
            StateVariable::scalar()
                .essential("")
                .inverse(|request| {
                    Ok(vec![InverseInstruction::essential(text_value(
                        desired_value(request)?,
                    ))])
                }),
        )
        .state_variable("text", text_of("value").inverse(invert_to_source))
}

fn text() -> ComponentType {
    ComponentType::new(TEXT)
        .state_variable("hidden", hidden())
        .state_variable(
            "value",
            StateVariable::scalar()
                .for_renderer()
                .essential("")
                .depends_on(children())
                .definition(|values| match values.children("children") {
                    [] => Ok(Definition::essential()),
                    children => Ok(Definition::value(concat(children, "text"))),
                })
                .inverse(|request| {
                    let desired = text_value(desired_value(request)?);
                    match request.values.children("children").len() {
                        0 => Ok(vec![InverseInstruction::essential(desired)]),
                        1 => Ok(vec![InverseInstruction::child("children", 0, "text", desired)]),
                        _ => Err(InverseError::Unsupported),
                    }
                }),
        )
        .state_variable("text", text_of("value").inverse(invert_to_source))
}

fn number() -> ComponentType {
    ComponentType::new(NUMBER)
        .state_variable("hidden", hidden())
        .state_variable(
            "value",
            StateVariable::scalar()
                .for_renderer()
                .essential(Value::Invalid)
                .depends_on(children())
                .definition(|values| match values.children("children") {
                    [] => Ok(Definition::essential()),
                    [only] if only.value("value").as_number().is_some() => {
                        Ok(Definition::value(only.value("value").clone()))
                    }
                    children => {
                        let text = concat(children, "text");
                        Ok(Definition::value(Value::number(parse_number(&text)?)))
                    }
                })
                .inverse(|request| {
                    let desired = desired_number(request)?;
                    match request.values.children("children") {
                        [] => Ok(vec![InverseInstruction::essential(desired)]),
                        [only] if &*only.component_type == STRING => Ok(vec![
                            InverseInstruction::child("children", 0, "value", text_value(&desired)),
                        ]),
                        [_] => Ok(vec![InverseInstruction::child("children", 0, "value", desired)]),
                        _ => Err(InverseError::Unsupported),
                    }
                }),
        )
        .state_variable(
            "text",
            StateVariable::scalar()
                .depends_on(
                    Dependencies::new()
                        .with("source", Dependency::own("value"))
                        .with("decimals", Dependency::attribute("displayDecimals", "value")),
                )
                .definition(|values| {
                    let value = values.value("source");
                    let decimals = number_of(values.value("decimals"))
                        .filter(|d| d.is_finite() && *d >= 0.0);
                    let text = match (value, decimals) {
                        (Value::Number(_), Some(decimals)) if decimals > MAX_DISPLAY_DECIMALS as f64 => {
                            return Err(DefinitionError::Domain(format!(
                                "displayDecimals {decimals} exceeds {MAX_DISPLAY_DECIMALS}"
                            )));
                        }
                        (Value::Number(n), Some(decimals)) if n.is_finite() => {
                            format!("{:.*}", decimals as usize, n)
                        }
                        _ => value.to_text(),
                    };
                    Ok(Definition::value(text))
                })
                .inverse(|request| {
                    let desired = desired_number(request)?;
                    Ok(vec![InverseInstruction::dependency("source", desired)])
                }),
        )
}

fn boolean() -> ComponentType {
    ComponentType::new(BOOLEAN)
        .state_variable("hidden", hidden())
        .state_variable(
            "value",
            StateVariable::scalar()
                .for_renderer()
                .essential(false)
                .depends_on(children())
                .definition(|values| match values.children("children") {
                    [] => Ok(Definition::essential()),
                    [only] if only.value("value").as_bool().is_some() => {
                        Ok(Definition::value(only.value("value").clone()))
                    }
                    children => {
                        let text = concat(children, "text");
                        Ok(Definition::value(parse_boolean(&text)?))
                    }
                })
                .inverse(|request| {
                    let desired = desired_boolean(request)?;
                    match request.values.children("children") {
                        [] => Ok(vec![InverseInstruction::essential(Value::Bool(desired))]),
                        [only] if &*only.component_type == STRING => Ok(vec![
                            InverseInstruction::child("children", 0, "value", Value::text(desired.to_string())),
                        ]),
                        [_] => Ok(vec![InverseInstruction::child(
                            "children",
                            0,
                            "value",
                            Value::Bool(desired),
                        )]),
                        _ => Err(InverseError::Unsupported),
                    }
                }),
        )
        .state_variable("text", text_of("value").inverse(invert_to_source))
}

#[cfg(test)]
mod tests {
    use crate::{ComponentRegistry, ComponentSpec, Document, Value};

    fn document(child: ComponentSpec) -> (Document, crate::ComponentId) {
        let spec = ComponentSpec::new("document").child(child.named("x"));
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let id = doc.resolve_path_to_id("x", doc.root()).unwrap();
        (doc, id)
    }

    #[test]
    fn number_parses_its_text_children() {
        let (mut doc, x) = document(ComponentSpec::new("number").text(" 4.5 "));
        assert_eq!(doc.get_value(x, "value"), Ok(Value::Number(4.5)));
        assert_eq!(doc.get_value(x, "text"), Ok(Value::text("4.5")));
    }

    #[test]
    fn unparsable_number_is_invalid() {
        let (mut doc, x) = document(ComponentSpec::new("number").text("four"));
        assert_eq!(doc.get_value(x, "value"), Ok(Value::Invalid));
        assert!(!doc.diagnostics().entries().is_empty());
    }

    #[test]
    fn display_decimals_round_the_text() {
        let (mut doc, x) = document(
            ComponentSpec::new("number")
                .attribute("displayDecimals", 2)
                .text("3.14159"),
        );
        assert_eq!(doc.get_value(x, "text"), Ok(Value::text("3.14")));
    }

    #[test]
    fn huge_display_decimals_are_invalid() {
        let (mut doc, x) = document(
            ComponentSpec::new("number")
                .attribute("displayDecimals", 200_000_000)
                .text("1"),
        );
        assert_eq!(doc.get_value(x, "text"), Ok(Value::Invalid));
        assert_eq!(doc.get_value(x, "value"), Ok(Value::Number(1.0)));
    }

    #[test]
    fn text_concatenates_children() {
        let (mut doc, x) = document(
            ComponentSpec::new("text")
                .text("a = ")
                .child(ComponentSpec::new("number").text("2")),
        );
        assert_eq!(doc.get_value(x, "value"), Ok(Value::text("a = 2")));
    }

    #[test]
    fn boolean_without_children_defaults_to_false() {
        let (mut doc, x) = document(ComponentSpec::new("boolean"));
        assert_eq!(doc.get_value(x, "value"), Ok(Value::Bool(false)));
        let (mut doc, y) = document(ComponentSpec::new("boolean").text("TRUE"));
        assert_eq!(doc.get_value(y, "value"), Ok(Value::Bool(true)));
    }
}
