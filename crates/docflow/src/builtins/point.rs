//! Points: an array of coordinates addressable as `x1`, `x2`, ...
//!
//! Coordinates come from the `x`, `y` and `z` attributes. Literal
//! attributes are initial values that moves overwrite. Once any coordinate
//! is bound to an attribute component the point follows its attributes:
//! bound coordinates are written through, literal ones cannot move.

use super::{coerce_number, hidden, number_of, text_of, POINT};
use crate::action::ActionEffect;
use crate::definition::{Definition, Dependencies, Dependency, InverseInstruction};
use crate::error::{ActionError, DefinitionError, InverseError};
use crate::registry::{ComponentRegistry, ComponentType, StateVariable};
use crate::value::{Desired, Value};
use indexmap::IndexMap;

const DIMENSIONS: [&str; 3] = ["x", "y", "z"];

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(point());
}

fn bound_key(dimension: &str) -> String {
    format!("bound:{dimension}")
}

fn literal_key(dimension: &str) -> String {
    format!("literal:{dimension}")
}

fn coordinates() -> StateVariable {
    StateVariable::array()
        .entry_prefix("x")
        .for_renderer()
        .essential(0)
        .size(
            Dependencies::new()
                .with("numDimensions", Dependency::attribute("numDimensions", "value"))
                .with("z", Dependency::attribute("z", "value")),
            |values| match number_of(values.value("numDimensions")) {
                Some(n) if n >= 1.0 && n <= DIMENSIONS.len() as f64 => Ok(n as usize),
                Some(n) => Err(DefinitionError::Domain(format!(
                    "a point has 1 to {} dimensions, not {n}",
                    DIMENSIONS.len()
                ))),
                None if !values.is_missing("z") => Ok(3),
                None => Ok(2),
            },
        )
        .dependencies(|query| {
            let mut dependencies = Dependencies::new();
            for dimension in DIMENSIONS {
                let key = if query.attribute_literal(dimension).is_some() {
                    literal_key(dimension)
                } else if query.has_attribute(dimension) {
                    bound_key(dimension)
                } else {
                    continue;
                };
                dependencies.insert(&key, Dependency::attribute(dimension, "value"));
            }
            dependencies
        })
        .definition(|values| {
            let size = values.array_size();
            let mut bound = false;
            let mut entries = IndexMap::new();
            for (index, dimension) in DIMENSIONS.iter().enumerate().take(size) {
                let bound_key = bound_key(dimension);
                let literal_key = literal_key(dimension);
                if !values.is_missing(&bound_key) {
                    bound = true;
                    entries.insert(index, coerce_number(values.value(&bound_key))?);
                } else if !values.is_missing(&literal_key) {
                    entries.insert(index, coerce_number(values.value(&literal_key))?);
                }
            }
            if bound {
                return Ok(Definition::entries(entries));
            }
            let initial = (0..size).map(|index| entries.get(&index).cloned().unwrap_or(Value::Null));
            Ok(Definition::essential_or(Value::array(initial)))
        })
        .inverse(|request| {
            let desired = request.desired.to_entries().ok_or_else(|| {
                InverseError::InvalidDesired("coordinates need per-key values".into())
            })?;
            let size = request.values.array_size();
            let any_bound = DIMENSIONS
                .iter()
                .any(|dimension| !request.values.is_missing(&bound_key(dimension)));

            let mut instructions = Vec::new();
            let mut essential = IndexMap::new();
            for (index, value) in desired {
                if index >= size {
                    return Err(InverseError::InvalidDesired(format!(
                        "coordinate {} of a {size}-dimensional point",
                        index + 1
                    )));
                }
                let value = coerce_number(&value)
                    .map_err(|err| InverseError::InvalidDesired(err.to_string()))?;
                let dimension = DIMENSIONS[index];
                if !request.values.is_missing(&bound_key(dimension)) {
                    instructions.push(InverseInstruction::dependency(&bound_key(dimension), value));
                } else if any_bound && !request.values.is_missing(&literal_key(dimension)) {
                    return Err(InverseError::Unsupported);
                } else {
                    essential.insert(index, value);
                }
            }
            if !essential.is_empty() {
                instructions.push(InverseInstruction::essential(Desired::Entries(essential)));
            }
            Ok(instructions)
        })
}

fn point() -> ComponentType {
    ComponentType::new(POINT)
        .state_variable("hidden", hidden())
        .state_variable("xs", coordinates())
        .state_variable("text", text_of("xs"))
        .action("movePoint", |context| {
            let mut entries = IndexMap::new();
            for (index, dimension) in DIMENSIONS.iter().enumerate() {
                if let Some(value) = context.arg(dimension) {
                    entries.insert(index, value.clone());
                }
            }
            if entries.is_empty() {
                return Err(ActionError::MissingArgument {
                    action: "movePoint".into(),
                    argument: "x".into(),
                });
            }
            Ok(vec![ActionEffect::update("xs", Desired::Entries(entries))])
        })
}

#[cfg(test)]
mod tests {
    use crate::{ActionRequest, ComponentRegistry, ComponentSpec, Document, Value};

    fn point_document(point: ComponentSpec) -> (Document, crate::ComponentId) {
        let spec = ComponentSpec::new("document").child(point.named("P"));
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let p = doc.resolve_path_to_id("P", doc.root()).unwrap();
        (doc, p)
    }

    #[test]
    fn literal_coordinates_are_initial_values() {
        let (mut doc, p) = point_document(
            ComponentSpec::new("point").attribute("x", 1).attribute("y", "2"),
        );
        assert_eq!(doc.get_value(p, "x1"), Ok(Value::Number(1.0)));
        assert_eq!(doc.get_value(p, "x2"), Ok(Value::Number(2.0)));

        let moved = doc
            .request_action(ActionRequest::new(p, "movePoint").arg("x", 5).arg("y", -1))
            .unwrap();
        assert!(moved.applied());
        assert_eq!(
            doc.get_value(p, "xs"),
            Ok(Value::array([Value::Number(5.0), Value::Number(-1.0)]))
        );
    }

    #[test]
    fn missing_coordinates_default_to_zero() {
        let (mut doc, p) = point_document(ComponentSpec::new("point").attribute("numDimensions", 3));
        assert_eq!(
            doc.get_value(p, "xs"),
            Ok(Value::array([Value::Number(0.0), Value::Number(0.0), Value::Number(0.0)]))
        );
    }

    #[test]
    fn bound_coordinate_writes_through() {
        let (mut doc, p) = point_document(
            ComponentSpec::new("point")
                .attribute("x", ComponentSpec::new("number").named("bx").text("3"))
                .attribute("y", 4),
        );
        let bx = doc.resolve_path_to_id("bx", doc.root()).unwrap();
        assert_eq!(doc.get_value(p, "x1"), Ok(Value::Number(3.0)));

        let moved = doc
            .request_action(ActionRequest::new(p, "movePoint").arg("x", 7))
            .unwrap();
        assert!(moved.applied());
        assert_eq!(doc.get_value(bx, "value"), Ok(Value::Number(7.0)));
        assert_eq!(doc.get_value(p, "x1"), Ok(Value::Number(7.0)));

        // y is a literal while x is bound.
        let err = doc
            .request_action(ActionRequest::new(p, "movePoint").arg("y", 1))
            .unwrap_err();
        assert!(err.is_inversion_unsupported());
        assert_eq!(doc.get_value(p, "x2"), Ok(Value::Number(4.0)));
    }
}
