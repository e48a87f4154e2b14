//! Component-type descriptors.
//!
//! A [`ComponentType`] lists the state variables a type provides (their
//! dependency declarations, forward and inverse definitions), its named
//! actions and, for composites, its expansion rule. Descriptors are
//! registered once in a [`ComponentRegistry`] and shared by every
//! document built from it.

use crate::action::{ActionContext, ActionEffect};
use crate::address::VarName;
use crate::definition::{
    Definition, Dependencies, DependencyValues, InverseInstruction, InverseRequest,
};
use crate::error::{ActionError, DefinitionError, ExpansionError, InverseError};
use crate::expand::{ExpansionContext, Replacement};
use crate::graph::DependencyQuery;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub type DependenciesFn = Rc<dyn Fn(&mut DependencyQuery<'_>) -> Dependencies>;
pub type DefinitionFn = Rc<dyn Fn(&DependencyValues) -> Result<Definition, DefinitionError>>;
pub type InverseFn =
    Rc<dyn Fn(&InverseRequest<'_>) -> Result<Vec<InverseInstruction>, InverseError>>;
pub type SizeFn = Rc<dyn Fn(&DependencyValues) -> Result<usize, DefinitionError>>;
pub type DefaultByKeyFn = Rc<dyn Fn(usize) -> Value>;
pub type ActionFn = Rc<dyn Fn(&mut ActionContext<'_>) -> Result<Vec<ActionEffect>, ActionError>>;
pub type ExpansionFn =
    Rc<dyn Fn(&mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError>>;

/// Array part of a state variable.
#[derive(Clone)]
pub struct ArraySpec {
    /// `x` makes `x1`, `x2`, ... address entries 1, 2, ...
    pub(crate) entry_prefix: Option<VarName>,
    pub(crate) size_dependencies: DependenciesFn,
    pub(crate) size: SizeFn,
    pub(crate) default_by_key: Option<DefaultByKeyFn>,
}

/// Descriptor of one state variable.
#[derive(Clone)]
pub struct StateVariable {
    pub(crate) array: Option<ArraySpec>,
    pub(crate) for_renderer: bool,
    /// Default of the essential value; `Some` makes the variable essential.
    pub(crate) essential: Option<Value>,
    pub(crate) shadowable: bool,
    pub(crate) additional: Vec<VarName>,
    pub(crate) dependencies: DependenciesFn,
    pub(crate) definition: DefinitionFn,
    pub(crate) inverse: Option<InverseFn>,
}

impl StateVariable {
    /// A scalar variable that uses its essential value until given a
    /// definition.
    pub fn scalar() -> Self {
        Self {
            array: None,
            for_renderer: false,
            essential: None,
            shadowable: true,
            additional: Vec::new(),
            dependencies: Rc::new(|_: &mut DependencyQuery<'_>| Dependencies::new()),
            definition: Rc::new(|_: &DependencyValues| Ok(Definition::essential())),
            inverse: None,
        }
    }

    /// An array variable of size 0 until given a size.
    pub fn array() -> Self {
        let mut variable = Self::scalar();
        variable.array = Some(ArraySpec {
            entry_prefix: None,
            size_dependencies: Rc::new(|_: &mut DependencyQuery<'_>| Dependencies::new()),
            size: Rc::new(|_: &DependencyValues| Ok(0)),
            default_by_key: None,
        });
        variable
    }

    pub fn for_renderer(mut self) -> Self {
        self.for_renderer = true;
        self
    }

    pub fn essential(mut self, default: impl Into<Value>) -> Self {
        self.essential = Some(default.into());
        self
    }

    /// Computed from the shadowing component's own dependencies instead of
    /// mirroring the shadow source.
    pub fn not_shadowed(mut self) -> Self {
        self.shadowable = false;
        self
    }

    /// Auxiliary outputs reported through [`Definition::additional`].
    pub fn additional(mut self, variables: &[&str]) -> Self {
        self.additional = variables.iter().map(|v| VarName::from(*v)).collect();
        self
    }

    pub fn dependencies(
        mut self,
        dependencies: impl Fn(&mut DependencyQuery<'_>) -> Dependencies + 'static,
    ) -> Self {
        self.dependencies = Rc::new(dependencies);
        self
    }

    /// Fixed dependency declaration.
    pub fn depends_on(self, dependencies: Dependencies) -> Self {
        self.dependencies(move |_| dependencies.clone())
    }

    pub fn definition(
        mut self,
        definition: impl Fn(&DependencyValues) -> Result<Definition, DefinitionError> + 'static,
    ) -> Self {
        self.definition = Rc::new(definition);
        self
    }

    pub fn inverse(
        mut self,
        inverse: impl Fn(&InverseRequest<'_>) -> Result<Vec<InverseInstruction>, InverseError>
            + 'static,
    ) -> Self {
        self.inverse = Some(Rc::new(inverse));
        self
    }

    pub fn entry_prefix(mut self, prefix: &str) -> Self {
        if let Some(array) = &mut self.array {
            array.entry_prefix = Some(prefix.into());
        }
        self
    }

    pub fn size(
        mut self,
        dependencies: Dependencies,
        size: impl Fn(&DependencyValues) -> Result<usize, DefinitionError> + 'static,
    ) -> Self {
        if let Some(array) = &mut self.array {
            array.size_dependencies =
                Rc::new(move |_: &mut DependencyQuery<'_>| dependencies.clone());
            array.size = Rc::new(size);
        }
        self
    }

    pub fn default_by_key(mut self, default: impl Fn(usize) -> Value + 'static) -> Self {
        if let Some(array) = &mut self.array {
            array.default_by_key = Some(Rc::new(default));
        }
        self
    }

    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    pub fn is_essential(&self) -> bool {
        self.essential.is_some()
    }

    pub fn is_for_renderer(&self) -> bool {
        self.for_renderer
    }

    pub fn has_inverse(&self) -> bool {
        self.inverse.is_some()
    }
}

impl fmt::Debug for StateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateVariable")
            .field("array", &self.array.is_some())
            .field("for_renderer", &self.for_renderer)
            .field("essential", &self.essential)
            .field("shadowable", &self.shadowable)
            .field("additional", &self.additional)
            .field("inverse", &self.inverse.is_some())
            .finish()
    }
}

/// How a variable name maps onto a type's declared variables.
#[derive(Debug)]
pub(crate) enum VariableLookup<'a> {
    Declared(&'a StateVariable),
    /// `x2` of an array declared with entry prefix `x`.
    Entry { array: VarName, index: usize },
    /// Auxiliary output of `primary`.
    Follower { primary: VarName },
}

/// Descriptor of a component type.
#[derive(Clone)]
pub struct ComponentType {
    pub(crate) name: Arc<str>,
    pub(crate) state_variables: IndexMap<VarName, StateVariable>,
    pub(crate) followers: IndexMap<VarName, VarName>,
    pub(crate) actions: IndexMap<VarName, ActionFn>,
    pub(crate) expansion: Option<ExpansionFn>,
    pub(crate) serialize_children: bool,
    pub(crate) rendered: bool,
}

impl ComponentType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            state_variables: IndexMap::new(),
            followers: IndexMap::new(),
            actions: IndexMap::new(),
            expansion: None,
            serialize_children: false,
            rendered: true,
        }
    }

    pub fn state_variable(mut self, name: &str, variable: StateVariable) -> Self {
        for follower in &variable.additional {
            self.followers.insert(follower.clone(), name.into());
        }
        self.state_variables.insert(name.into(), variable);
        self
    }

    pub fn action(
        mut self,
        name: &str,
        action: impl Fn(&mut ActionContext<'_>) -> Result<Vec<ActionEffect>, ActionError> + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Rc::new(action));
        self
    }

    /// Make this type a composite expanded by `rule`.
    pub fn composite(
        mut self,
        rule: impl Fn(&mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError>
            + 'static,
    ) -> Self {
        self.expansion = Some(Rc::new(rule));
        self.rendered = false;
        self
    }

    /// Keep children as specs instead of instantiating them.
    pub fn serialize_children(mut self) -> Self {
        self.serialize_children = true;
        self
    }

    pub fn not_rendered(mut self) -> Self {
        self.rendered = false;
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn is_composite(&self) -> bool {
        self.expansion.is_some()
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.get(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &VarName> + '_ {
        self.state_variables.keys().chain(self.followers.keys())
    }

    pub fn renderer_variables(&self) -> impl Iterator<Item = &VarName> + '_ {
        self.state_variables
            .iter()
            .filter(|(_, variable)| variable.for_renderer)
            .map(|(name, _)| name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &VarName> + '_ {
        self.actions.keys()
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<VariableLookup<'_>> {
        if let Some(variable) = self.state_variables.get(name) {
            return Some(VariableLookup::Declared(variable));
        }
        if let Some(primary) = self.followers.get(name) {
            return Some(VariableLookup::Follower {
                primary: primary.clone(),
            });
        }
        self.state_variables.iter().find_map(|(array_name, variable)| {
            let prefix = variable.array.as_ref()?.entry_prefix.as_ref()?;
            let digits = name.strip_prefix(prefix.as_ref())?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let position: usize = digits.parse().ok()?;
            let index = position.checked_sub(1)?;
            Some(VariableLookup::Entry {
                array: array_name.clone(),
                index,
            })
        })
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("state_variables", &self.state_variables)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("composite", &self.expansion.is_some())
            .finish()
    }
}

/// Registered component types.
#[derive(Clone, Default, Debug)]
pub struct ComponentRegistry {
    types: IndexMap<Arc<str>, Rc<ComponentType>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_all(&mut registry);
        registry
    }

    /// Register or replace a type.
    pub fn register(&mut self, component_type: ComponentType) -> &mut Self {
        self.types
            .insert(component_type.name.clone(), Rc::new(component_type));
        self
    }

    pub fn get(&self, name: &str) -> Option<Rc<ComponentType>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &Arc<str>> + '_ {
        self.types.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_like() -> ComponentType {
        ComponentType::new("pointLike")
            .state_variable(
                "xs",
                StateVariable::array()
                    .entry_prefix("x")
                    .size(Dependencies::new(), |_| Ok(2)),
            )
            .state_variable(
                "value",
                StateVariable::scalar().additional(&["valueSquared"]),
            )
    }

    #[test]
    fn entry_aliases_resolve_to_zero_based_index() {
        let ty = point_like();
        match ty.lookup("x2") {
            Some(VariableLookup::Entry { array, index }) => {
                assert_eq!(&*array, "xs");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected lookup {other:?}"),
        }
        assert!(ty.lookup("x0").is_none());
        assert!(ty.lookup("xa").is_none());
        assert!(matches!(ty.lookup("xs"), Some(VariableLookup::Declared(_))));
    }

    #[test]
    fn followers_point_at_their_primary() {
        let ty = point_like();
        match ty.lookup("valueSquared") {
            Some(VariableLookup::Follower { primary }) => assert_eq!(&*primary, "value"),
            other => panic!("unexpected lookup {other:?}"),
        }
        assert!(ty.has_variable("valueSquared"));
        assert!(!ty.has_variable("missing"));
    }
}
