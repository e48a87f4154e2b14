//! Form inputs.
//!
//! A `textInput` keeps two values: `immediateValue` tracks every keystroke
//! (usually sent as transient actions) and `value` changes when the edit is
//! committed. Both inputs can bind their value to another component through
//! a `bindValueTo` attribute component.

use super::{bindable_value, desired_value, hidden, text_of, text_value, BOOLEAN_INPUT, TEXT_INPUT};
use crate::action::ActionEffect;
use crate::address::CellKey;
use crate::definition::{Definition, Dependencies, Dependency, InverseInstruction};
use crate::error::{ActionError, InverseError};
use crate::registry::{ComponentRegistry, ComponentType, StateVariable};
use crate::value::Value;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(text_input());
    registry.register(boolean_input());
}

fn as_text(value: &Value) -> Result<Value, InverseError> {
    Ok(text_value(value))
}

fn as_boolean(value: &Value) -> Result<Value, InverseError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Text(text) => super::parse_boolean(text)
            .map(Value::Bool)
            .map_err(|err| InverseError::InvalidDesired(err.to_string())),
        other => Err(InverseError::InvalidDesired(format!("`{other}` is not a boolean"))),
    }
}

fn text_input() -> ComponentType {
    ComponentType::new(TEXT_INPUT)
        .state_variable("hidden", hidden())
        .state_variable(
            "value",
            bindable_value(Value::text(""), as_text, Some("immediateValue")),
        )
        .state_variable(
            "immediateValue",
            StateVariable::scalar()
                .for_renderer()
                .essential("")
                .depends_on(Dependencies::new().with("value", Dependency::own("value")))
                .definition(|values| Ok(Definition::essential_or(values.value("value").clone())))
                .inverse(|request| {
                    Ok(vec![InverseInstruction::essential(text_value(
                        desired_value(request)?,
                    ))])
                }),
        )
        .state_variable("text", text_of("value"))
        .action("updateImmediateValue", |context| {
            let text = text_value(context.require_arg("text")?);
            Ok(vec![ActionEffect::update("immediateValue", text)])
        })
        .action("updateValue", |context| {
            let immediate = context.value("immediateValue")?;
            if context.value("value")? == immediate {
                return Ok(Vec::new());
            }
            Ok(vec![ActionEffect::update("value", immediate)])
        })
}

fn boolean_input() -> ComponentType {
    ComponentType::new(BOOLEAN_INPUT)
        .state_variable("hidden", hidden())
        .state_variable("value", bindable_value(Value::Bool(false), as_boolean, None))
        .state_variable("text", text_of("value"))
        .action("updateBoolean", |context| {
            let value = as_boolean(context.require_arg("boolean")?).map_err(|err| {
                ActionError::InvalidDesired {
                    cell: CellKey::new(context.component(), "value"),
                    reason: err.to_string(),
                }
            })?;
            Ok(vec![ActionEffect::update("value", value)])
        })
}

#[cfg(test)]
mod tests {
    use crate::{ActionRequest, ComponentRegistry, ComponentSpec, Document, Value};

    #[test]
    fn immediate_value_follows_value_until_edited() {
        let spec = ComponentSpec::new("document")
            .child(ComponentSpec::new("textInput").named("ti").attribute("bindValueTo", "hello"));
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let ti = doc.resolve_path_to_id("ti", doc.root()).unwrap();
        assert_eq!(doc.get_value(ti, "immediateValue"), Ok(Value::text("hello")));

        doc.request_action(
            ActionRequest::new(ti, "updateImmediateValue")
                .arg("text", "hel")
                .transient(),
        )
        .unwrap();
        assert_eq!(doc.get_value(ti, "immediateValue"), Ok(Value::text("hel")));
        assert_eq!(doc.get_value(ti, "value"), Ok(Value::text("hello")));

        doc.request_action(ActionRequest::new(ti, "updateValue")).unwrap();
        assert_eq!(doc.get_value(ti, "value"), Ok(Value::text("hel")));
    }

    #[test]
    fn bound_value_writes_to_its_source() {
        let spec = ComponentSpec::new("document")
            .child(ComponentSpec::new("text").named("t").text("abc"))
            .child(
                ComponentSpec::new("textInput")
                    .named("ti")
                    .attribute("bindValueTo", ComponentSpec::copy("t")),
            );
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let t = doc.resolve_path_to_id("t", doc.root()).unwrap();
        let ti = doc.resolve_path_to_id("ti", doc.root()).unwrap();
        assert_eq!(doc.get_value(ti, "value"), Ok(Value::text("abc")));

        doc.request_action(ActionRequest::new(ti, "updateImmediateValue").arg("text", "xyz"))
            .unwrap();
        doc.request_action(ActionRequest::new(ti, "updateValue")).unwrap();
        assert_eq!(doc.get_value(t, "value"), Ok(Value::text("xyz")));
        assert_eq!(doc.get_value(ti, "value"), Ok(Value::text("xyz")));
    }

    #[test]
    fn boolean_input_toggles() {
        let spec = ComponentSpec::new("document").child(ComponentSpec::new("booleanInput").named("b"));
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let b = doc.resolve_path_to_id("b", doc.root()).unwrap();
        assert_eq!(doc.get_value(b, "value"), Ok(Value::Bool(false)));
        doc.request_action(ActionRequest::new(b, "updateBoolean").arg("boolean", true))
            .unwrap();
        assert_eq!(doc.get_value(b, "value"), Ok(Value::Bool(true)));
    }
}
