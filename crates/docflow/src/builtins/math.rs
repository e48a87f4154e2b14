//! Arithmetic over numeric children.

use super::{desired_number, hidden, text_of, NUMBER, QUOTIENT, SUM};
use crate::definition::{ChildValues, Definition, Dependencies, Dependency, InverseInstruction};
use crate::error::{DefinitionError, InverseError};
use crate::registry::{ComponentRegistry, ComponentType, StateVariable};
use crate::value::Value;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(sum());
    registry.register(quotient());
}

fn terms() -> Dependencies {
    Dependencies::new().with(
        "terms",
        Dependency::children(&[NUMBER, SUM, QUOTIENT], &["value"]),
    )
}

/// Numeric value of every term. `None` when one of them is already
/// invalid, so the failure is not reported twice.
fn term_values(terms: &[ChildValues]) -> Result<Option<Vec<f64>>, DefinitionError> {
    let mut numbers = Vec::with_capacity(terms.len());
    for term in terms {
        match term.value("value") {
            Value::Number(n) => numbers.push(*n),
            Value::Invalid => return Ok(None),
            other => return Err(DefinitionError::NotANumber(other.to_text())),
        }
    }
    Ok(Some(numbers))
}

fn sum() -> ComponentType {
    ComponentType::new(SUM)
        .state_variable("hidden", hidden())
        .state_variable(
            "value",
            StateVariable::scalar()
                .for_renderer()
                .depends_on(terms())
                .definition(|values| {
                    let total = match term_values(values.children("terms"))? {
                        Some(numbers) => Value::number(numbers.iter().sum()),
                        None => Value::Invalid,
                    };
                    Ok(Definition::value(total))
                })
                // The last term absorbs the difference.
                .inverse(|request| {
                    let desired = desired_number(request)?
                        .as_number()
                        .ok_or_else(|| InverseError::InvalidDesired("sum needs a number".into()))?;
                    let terms = request.values.children("terms");
                    let Some((last, rest)) = terms.split_last() else {
                        return Err(InverseError::Unsupported);
                    };
                    let others: f64 = rest
                        .iter()
                        .map(|term| term.value("value").as_number())
                        .sum::<Option<f64>>()
                        .ok_or(InverseError::Unsupported)?;
                    if !others.is_finite() || last.value("value").as_number().is_none() {
                        return Err(InverseError::Unsupported);
                    }
                    Ok(vec![InverseInstruction::child(
                        "terms",
                        rest.len(),
                        "value",
                        Value::number(desired - others),
                    )])
                }),
        )
        .state_variable("text", text_of("value"))
}

fn quotient() -> ComponentType {
    ComponentType::new(QUOTIENT)
        .state_variable("hidden", hidden())
        .state_variable(
            "value",
            StateVariable::scalar()
                .for_renderer()
                .depends_on(terms())
                .definition(|values| {
                    let Some(numbers) = term_values(values.children("terms"))? else {
                        return Ok(Definition::value(Value::Invalid));
                    };
                    match numbers.as_slice() {
                        [_, divisor] if *divisor == 0.0 => Err(DefinitionError::DivisionByZero),
                        [dividend, divisor] => Ok(Definition::value(dividend / divisor)),
                        other => Err(DefinitionError::Domain(format!(
                            "quotient needs two terms, got {}",
                            other.len()
                        ))),
                    }
                }),
        )
        .state_variable("text", text_of("value"))
}

#[cfg(test)]
mod tests {
    use crate::diagnostics::DiagnosticKind;
    use crate::{ActionFlags, CellKey, ComponentRegistry, ComponentSpec, Document, Value};

    fn number(text: &str) -> ComponentSpec {
        ComponentSpec::new("number").text(text)
    }

    #[test]
    fn sum_adds_numeric_children_and_skips_text() {
        let spec = ComponentSpec::new("document").child(
            ComponentSpec::new("sum")
                .named("s")
                .child(number("1"))
                .text(" + ")
                .child(number("2.5")),
        );
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let s = doc.resolve_path_to_id("s", doc.root()).unwrap();
        assert_eq!(doc.get_value(s, "value"), Ok(Value::Number(3.5)));
    }

    #[test]
    fn sum_inverse_adjusts_the_last_term() {
        let spec = ComponentSpec::new("document").child(
            ComponentSpec::new("sum")
                .named("s")
                .child(number("1"))
                .child(number("2").named("b")),
        );
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let s = doc.resolve_path_to_id("s", doc.root()).unwrap();
        let b = doc.resolve_path_to_id("b", doc.root()).unwrap();
        let outcome = doc
            .dispatch(CellKey::new(s, "value"), Value::from(10), ActionFlags::default())
            .unwrap();
        assert!(outcome.applied());
        assert_eq!(doc.get_value(s, "value"), Ok(Value::Number(10.0)));
        assert_eq!(doc.get_value(b, "value"), Ok(Value::Number(9.0)));
    }

    #[test]
    fn division_by_zero_is_invalid_and_reported() {
        let spec = ComponentSpec::new("document").child(
            ComponentSpec::new("quotient")
                .named("q")
                .child(number("1"))
                .child(number("0")),
        );
        let mut doc = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap();
        let q = doc.resolve_path_to_id("q", doc.root()).unwrap();
        assert_eq!(doc.get_value(q, "value"), Ok(Value::Invalid));
        assert!(doc
            .diagnostics()
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::NumericOrDomain));
    }
}
