//! Composite types and their expansion rules.
//!
//! Rules only read through the [`ExpansionContext`], so everything they look
//! at governs the expansion: a `sequence` is rebuilt when its count
//! changes, not when its first value does.

use super::{
    number_attribute, truthy, BOOLEAN, CASE, CONDITIONAL_CONTENT, COPY, ELSE, GROUP, MAP,
    NUMBER, SEQUENCE, STRING, TEMPLATE, TEXT,
};
use crate::address::{CellKey, ComponentId};
use crate::definition::{Definition, Dependencies, Dependency, DependencyValues};
use crate::error::{DefinitionError, ExpansionError, PathError};
use crate::expand::{ExpansionContext, Replacement};
use crate::registry::{ComponentRegistry, ComponentType, StateVariable};
use crate::tree::{AttributeSpec, ChildSpec, ComponentSpec};
use crate::value::{Value, ValueKind, ValueShape};

/// Hard ceiling on sequence counts, independent of the session limit on
/// expansion, so that reading `values` stays bounded.
const SEQUENCE_CEILING: usize = 1 << 20;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(ComponentType::new(COPY).composite(copy_rule));
    registry.register(ComponentType::new(GROUP).serialize_children().composite(group_rule));
    registry.register(ComponentType::new(MAP).composite(map_rule));
    registry.register(sequence());
    registry.register(conditional_content());
}

fn child_replacement(child: ChildSpec) -> Replacement {
    match child {
        ChildSpec::Component(spec) => Replacement::Component(spec),
        ChildSpec::Text(text) => {
            Replacement::Component(ComponentSpec::new(STRING).essential("value", text))
        }
    }
}

fn missing(composite: ComponentId, attribute: &str) -> ExpansionError {
    ExpansionError::MissingAttribute {
        composite,
        attribute: attribute.to_string(),
    }
}

/// Type of the component that mirrors a scalar of the given kind.
fn mirror_type(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Number | ValueKind::Invalid => NUMBER,
        ValueKind::Bool => BOOLEAN,
        _ => TEXT,
    }
}

/// `copy`: a mirror of the component at `source`, or of one of its state
/// variables when a `prop` is given or the path ends in a property name.
fn copy_rule(context: &mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError> {
    let composite = context.composite();
    let source = context
        .attribute_text("source")
        .ok_or_else(|| missing(composite, "source"))?;
    let resolution = context.resolve_path(&source)?;
    let mut target = resolution.component;
    if context.is_ancestor_or_self(target, composite) {
        return Err(ExpansionError::SelfReference { composite, target });
    }

    let unresolved = |segment: String| -> ExpansionError {
        PathError::Unresolved {
            path: source.clone(),
            segment,
        }
        .into()
    };
    let prop = match (context.attribute_text("prop"), resolution.is_complete()) {
        (prop, true) => prop,
        (None, false) => match resolution.property() {
            Some(property) => Some(property.to_string()),
            None => return Err(unresolved(resolution.remaining[0].to_string())),
        },
        (Some(_), false) => return Err(unresolved(resolution.remaining[0].to_string())),
    };
    let Some(prop) = prop else {
        return Ok(vec![Replacement::Shadow { source: target }]);
    };

    if !context.has_variable(target, &prop) {
        // A composite standing in for a single component.
        let replacements = match context.replacements_of(target) {
            Ok(replacements) => replacements,
            Err(ExpansionError::NotComposite(_)) => Vec::new(),
            Err(err) => return Err(err),
        };
        match replacements.as_slice() {
            [only] if context.has_variable(*only, &prop) => target = *only,
            _ => return Err(unresolved(prop)),
        }
    }

    let cell = CellKey::new(target, prop.as_str());
    let replacements = match context.shape_of(cell.clone())? {
        ValueShape::Array(len) => (0..len)
            .map(|index| Replacement::ShadowVariable {
                component_type: NUMBER.into(),
                variable: "value".into(),
                source: cell.clone(),
                entry: Some(index),
            })
            .collect(),
        ValueShape::Scalar(kind) => vec![Replacement::ShadowVariable {
            component_type: mirror_type(kind).into(),
            variable: "value".into(),
            source: cell,
            entry: None,
        }],
    };
    Ok(replacements)
}

/// `group`: its children, instantiated in place.
fn group_rule(context: &mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError> {
    Ok(context
        .serialized_children()
        .into_iter()
        .map(child_replacement)
        .collect())
}

/// `map`: one namespaced copy of the template per item. Copies of the
/// `alias` name point at the item; copies of `indexAlias` become its
/// 1-based position.
fn map_rule(context: &mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError> {
    let composite = context.composite();
    let alias = context.attribute_text("alias");
    let index_alias = context.attribute_text("indexAlias");
    let children = context.effective_children();
    let template = children
        .iter()
        .copied()
        .find(|&id| context.component_type(id).as_deref() == Some(TEMPLATE))
        .ok_or_else(|| missing(composite, TEMPLATE))?;
    let body = context.serialized_children_of(template);

    let mut replacements = Vec::new();
    let mut position = 0;
    for item in children {
        if item == template || context.is_blank(item) {
            continue;
        }
        position += 1;
        let mut instance = ComponentSpec::new(GROUP)
            .new_namespace()
            .children(body.iter().cloned());
        instance.visit_mut(&mut |spec| {
            substitute(spec, item, position, alias.as_deref(), index_alias.as_deref())
        });
        replacements.push(Replacement::Component(instance));
    }
    log::trace!("map {composite} over {position} items");
    Ok(replacements)
}

fn substitute(
    spec: &mut ComponentSpec,
    item: ComponentId,
    position: usize,
    alias: Option<&str>,
    index_alias: Option<&str>,
) {
    if spec.component_type != COPY {
        return;
    }
    let Some(source) = spec
        .literal_attribute("source")
        .and_then(Value::as_text)
        .map(str::to_owned)
    else {
        return;
    };
    if index_alias == Some(source.as_str()) {
        let mut index = ComponentSpec::new(NUMBER).essential("value", position as f64);
        index.name = spec.name.take();
        *spec = index;
        return;
    }
    let Some(rest) = alias.and_then(|alias| source.strip_prefix(alias)) else {
        return;
    };
    if rest.is_empty() || rest.starts_with(['.', '[']) {
        spec.attributes.insert(
            "source".into(),
            AttributeSpec::Literal(Value::text(format!("{item}{rest}"))),
        );
    }
}

fn sequence_count(values: &DependencyValues) -> Result<Definition, DefinitionError> {
    let number = |key: &str| {
        values
            .number(key)
            .ok_or_else(|| DefinitionError::NotANumber(values.value(key).to_text()))
    };
    let from = number("from")?;
    let step = number("step")?;
    let count = if let Some(length) = values.value("length").as_count() {
        length
    } else if let Some(to) = values.number("to") {
        if step == 0.0 {
            return Err(DefinitionError::Domain("sequence step is zero".into()));
        }
        let span = ((to - from) / step + 1e-9).floor();
        if span < 0.0 {
            0
        } else {
            (span as usize).saturating_add(1)
        }
    } else {
        return Err(DefinitionError::Domain(
            "sequence needs `to` or `length`".into(),
        ));
    };
    if count > SEQUENCE_CEILING {
        return Err(DefinitionError::LimitExceeded {
            limit: SEQUENCE_CEILING,
            requested: count,
        });
    }
    Ok(Definition::value(count as f64))
}

fn sequence() -> ComponentType {
    let terms = Dependencies::new()
        .with("from", Dependency::own("from"))
        .with("step", Dependency::own("step"));
    ComponentType::new(SEQUENCE)
        .state_variable("from", number_attribute("from", 1))
        .state_variable("to", number_attribute("to", Value::Null))
        .state_variable("step", number_attribute("step", 1))
        .state_variable("length", number_attribute("length", Value::Null))
        .state_variable(
            "count",
            StateVariable::scalar()
                .depends_on(
                    terms
                        .clone()
                        .with("to", Dependency::own("to"))
                        .with("length", Dependency::own("length")),
                )
                .definition(sequence_count),
        )
        .state_variable(
            "values",
            StateVariable::array()
                .size(
                    Dependencies::new().with("count", Dependency::own("count")),
                    |values| Ok(values.value("count").as_count().unwrap_or(0)),
                )
                .depends_on(terms)
                .definition(|values| {
                    let from = values.number("from").unwrap_or(f64::NAN);
                    let step = values.number("step").unwrap_or(f64::NAN);
                    let items = (0..values.array_size()).map(|i| Value::number(from + i as f64 * step));
                    Ok(Definition::value(Value::array(items)))
                }),
        )
        .composite(sequence_rule)
}

/// `sequence`: one number per entry of `values`, each mirroring its entry.
fn sequence_rule(context: &mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError> {
    let composite = context.composite();
    let Some(count) = context.value("count")?.as_count() else {
        return Ok(Vec::new());
    };
    let limit = context.max_sequence_length();
    if count > limit {
        return Err(ExpansionError::LimitExceeded {
            composite,
            limit,
            requested: count,
        });
    }
    let values = CellKey::new(composite, "values");
    Ok((0..count)
        .map(|index| Replacement::ShadowVariable {
            component_type: NUMBER.into(),
            variable: "value".into(),
            source: values.clone(),
            entry: Some(index),
        })
        .collect())
}

fn conditional_content() -> ComponentType {
    ComponentType::new(CONDITIONAL_CONTENT)
        .state_variable(
            "selectedCase",
            StateVariable::scalar()
                .depends_on(Dependencies::new().with(
                    "branches",
                    Dependency::children(&[CASE, ELSE], &["conditionSatisfied"]),
                ))
                .definition(|values| {
                    let selected = values
                        .children("branches")
                        .iter()
                        .position(|branch| truthy(branch.value("conditionSatisfied")));
                    Ok(Definition::value(match selected {
                        Some(index) => Value::from(index as f64 + 1.0),
                        None => Value::Null,
                    }))
                }),
        )
        .composite(conditional_rule)
}

/// `conditionalContent`: the content of the first satisfied branch.
fn conditional_rule(context: &mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError> {
    let Some(position) = context.value("selectedCase")?.as_count() else {
        return Ok(Vec::new());
    };
    let branches: Vec<ComponentId> = context
        .effective_children()
        .into_iter()
        .filter(|&id| matches!(context.component_type(id).as_deref(), Some(CASE | ELSE)))
        .collect();
    let Some(&branch) = position.checked_sub(1).and_then(|i| branches.get(i)) else {
        return Ok(Vec::new());
    };
    Ok(context
        .serialized_children_of(branch)
        .into_iter()
        .map(child_replacement)
        .collect())
}
