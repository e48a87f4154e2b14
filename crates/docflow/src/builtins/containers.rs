//! Block containers and the holders of uninstantiated content.

use super::{children_text, hidden, truthy, CASE, DOCUMENT, ELSE, P, SECTION, TEMPLATE};
use crate::definition::{Definition, Dependencies, Dependency};
use crate::registry::{ComponentRegistry, ComponentType, StateVariable};

pub(super) fn register(registry: &mut ComponentRegistry) {
    for name in [DOCUMENT, SECTION, P] {
        registry.register(
            ComponentType::new(name)
                .state_variable("hidden", hidden())
                .state_variable("text", children_text()),
        );
    }

    // Children stay serialized until a composite instantiates them.
    registry.register(ComponentType::new(TEMPLATE).serialize_children().not_rendered());
    registry.register(
        ComponentType::new(CASE)
            .serialize_children()
            .not_rendered()
            .state_variable(
                "conditionSatisfied",
                StateVariable::scalar()
                    .depends_on(
                        Dependencies::new().with("condition", Dependency::attribute("condition", "value")),
                    )
                    .definition(|values| Ok(Definition::value(truthy(values.value("condition"))))),
            ),
    );
    registry.register(
        ComponentType::new(ELSE)
            .serialize_children()
            .not_rendered()
            .state_variable(
                "conditionSatisfied",
                StateVariable::scalar().definition(|_| Ok(Definition::value(true))),
            ),
    );
}
