//! Built-in component types.
//!
//! Each submodule registers a family of types. The helpers here build the
//! state variables several families share: the inherited `hidden` flag,
//! `text` renderings, and numeric attributes that may be literal or bound
//! to an attribute component.

mod composites;
mod containers;
mod inputs;
mod math;
mod point;
mod text;

use crate::definition::{
    ChildValues, Definition, Dependencies, Dependency, InverseInstruction, InverseRequest,
};
use crate::error::{DefinitionError, InverseError};
use crate::registry::{ComponentRegistry, StateVariable};
use crate::value::Value;

/// Raw text children are instantiated as this type.
pub const STRING: &str = "string";
pub const DOCUMENT: &str = "document";
pub const SECTION: &str = "section";
pub const P: &str = "p";
pub const TEXT: &str = "text";
pub const NUMBER: &str = "number";
pub const BOOLEAN: &str = "boolean";
pub const SUM: &str = "sum";
pub const QUOTIENT: &str = "quotient";
pub const POINT: &str = "point";
pub const TEXT_INPUT: &str = "textInput";
pub const BOOLEAN_INPUT: &str = "booleanInput";
pub const TEMPLATE: &str = "template";
pub const CASE: &str = "case";
pub const ELSE: &str = "else";
pub const COPY: &str = "copy";
pub const GROUP: &str = "group";
pub const MAP: &str = "map";
pub const SEQUENCE: &str = "sequence";
pub const CONDITIONAL_CONTENT: &str = "conditionalContent";

/// Register every built-in type.
pub fn register_all(registry: &mut ComponentRegistry) {
    text::register(registry);
    math::register(registry);
    point::register(registry);
    inputs::register(registry);
    containers::register(registry);
    composites::register(registry);
}

/// Loose truth test used for `hide`, `condition` and boolean parsing.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn parse_number(text: &str) -> Result<f64, DefinitionError> {
    let trimmed = text.trim();
    match trimmed {
        "∞" | "inf" | "Infinity" => Ok(f64::INFINITY),
        "-∞" | "-inf" | "-Infinity" => Ok(f64::NEG_INFINITY),
        _ => trimmed
            .parse::<f64>()
            .map_err(|_| DefinitionError::NotANumber(trimmed.to_string())),
    }
}

/// Numeric view of a value; text is parsed.
pub(crate) fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Text(text) => parse_number(text).ok(),
        _ => None,
    }
}

/// Coerce to a number value, keeping `Null` and `Invalid` as they are.
pub(crate) fn coerce_number(value: &Value) -> Result<Value, DefinitionError> {
    match value {
        Value::Number(_) | Value::Null | Value::Invalid => Ok(value.clone()),
        Value::Text(text) => parse_number(text).map(Value::number),
        other => Err(DefinitionError::NotANumber(other.to_text())),
    }
}

pub(crate) fn parse_boolean(text: &str) -> Result<bool, DefinitionError> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(DefinitionError::NotABoolean(trimmed.to_string()))
    }
}

/// Text value of anything; `Null` becomes the empty string.
pub(crate) fn text_value(value: &Value) -> Value {
    match value {
        Value::Text(_) => value.clone(),
        other => Value::text(other.to_text()),
    }
}

/// Concatenated `variable` of every child.
pub(crate) fn concat(children: &[ChildValues], variable: &str) -> String {
    children
        .iter()
        .map(|child| child.value(variable).to_text())
        .collect()
}

/// The desired scalar of an inverse request.
pub(crate) fn desired_value<'a>(request: &'a InverseRequest<'_>) -> Result<&'a Value, InverseError> {
    request
        .desired
        .as_value()
        .ok_or_else(|| InverseError::InvalidDesired("per-key values for a scalar".into()))
}

pub(crate) fn desired_number(request: &InverseRequest<'_>) -> Result<Value, InverseError> {
    coerce_number(desired_value(request)?).map_err(|err| InverseError::InvalidDesired(err.to_string()))
}

pub(crate) fn desired_boolean(request: &InverseRequest<'_>) -> Result<bool, InverseError> {
    match desired_value(request)? {
        Value::Bool(b) => Ok(*b),
        Value::Text(text) => {
            parse_boolean(text).map_err(|err| InverseError::InvalidDesired(err.to_string()))
        }
        other => Err(InverseError::InvalidDesired(format!(
            "`{other}` is not a boolean"
        ))),
    }
}

/// Inherited visibility: the component's own `hide` attribute or any hidden
/// ancestor.
pub(crate) fn hidden() -> StateVariable {
    StateVariable::scalar()
        .for_renderer()
        .not_shadowed()
        .depends_on(
            Dependencies::new()
                .with("hide", Dependency::attribute("hide", "value"))
                .with("parentHidden", Dependency::ancestor("hidden")),
        )
        .definition(|values| {
            let hidden = truthy(values.value("hide")) || truthy(values.value("parentHidden"));
            Ok(Definition::value(hidden))
        })
}

/// Text rendering of one of the component's own variables.
pub(crate) fn text_of(variable: &str) -> StateVariable {
    StateVariable::scalar()
        .depends_on(Dependencies::new().with("source", Dependency::own(variable)))
        .definition(|values| Ok(Definition::value(values.value("source").to_text())))
}

/// Passes a desired value on to the `source` dependency of [`text_of`].
pub(crate) fn invert_to_source(
    request: &InverseRequest<'_>,
) -> Result<Vec<InverseInstruction>, InverseError> {
    Ok(vec![InverseInstruction::dependency(
        "source",
        request.desired.clone(),
    )])
}

/// Concatenated `text` of the effective children.
pub(crate) fn children_text() -> StateVariable {
    StateVariable::scalar()
        .depends_on(Dependencies::new().with("children", Dependency::children(&[], &["text"])))
        .definition(|values| Ok(Definition::value(concat(values.children("children"), "text"))))
}

/// A numeric variable set by a literal attribute, bound to an attribute
/// component, or held as an essential value when the attribute is absent.
/// Literals are only initial values; bound attributes are followed and
/// written through.
pub(crate) fn number_attribute(attribute: &'static str, default: impl Into<Value>) -> StateVariable {
    StateVariable::scalar()
        .essential(default)
        .dependencies(move |query| {
            let key = if query.attribute_literal(attribute).is_some() {
                "literal"
            } else if query.has_attribute(attribute) {
                "bound"
            } else {
                return Dependencies::new();
            };
            Dependencies::new().with(key, Dependency::attribute(attribute, "value"))
        })
        .definition(|values| {
            if !values.is_missing("bound") {
                return Ok(Definition::value(coerce_number(values.value("bound"))?));
            }
            if !values.is_missing("literal") {
                return Ok(Definition::essential_or(coerce_number(values.value("literal"))?));
            }
            Ok(Definition::essential())
        })
        .inverse(|request| {
            let desired = desired_number(request)?;
            if request.values.is_missing("bound") {
                Ok(vec![InverseInstruction::essential(desired)])
            } else {
                Ok(vec![InverseInstruction::dependency("bound", desired)])
            }
        })
}

/// Input value that follows a `bindValueTo` attribute component when there
/// is one. Writes also set the essential `companion`, when given.
pub(crate) fn bindable_value(
    default: Value,
    coerce: fn(&Value) -> Result<Value, InverseError>,
    companion: Option<&'static str>,
) -> StateVariable {
    StateVariable::scalar()
        .for_renderer()
        .essential(default)
        .dependencies(|query| {
            let key = if query.attribute_literal("bindValueTo").is_some() {
                "literal"
            } else if query.has_attribute("bindValueTo") {
                "bound"
            } else {
                return Dependencies::new();
            };
            Dependencies::new().with(key, Dependency::attribute("bindValueTo", "value"))
        })
        .definition(|values| {
            if !values.is_missing("bound") {
                return Ok(Definition::value(values.value("bound").clone()));
            }
            if !values.is_missing("literal") {
                return Ok(Definition::essential_or(values.value("literal").clone()));
            }
            Ok(Definition::essential())
        })
        .inverse(move |request| {
            let desired = coerce(desired_value(request)?)?;
            let mut writes = Vec::with_capacity(2);
            if let Some(companion) = companion {
                writes.push(InverseInstruction::essential_of(companion, desired.clone()));
            }
            writes.push(if request.values.is_missing("bound") {
                InverseInstruction::essential(desired)
            } else {
                InverseInstruction::dependency("bound", desired)
            });
            Ok(writes)
        })
}
