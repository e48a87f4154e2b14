//! What a state variable declares: the dependencies it reads, the value
//! its definition produces, and the writes its inverse requests.

use crate::address::{CellKey, ComponentId, VarName};
use crate::value::{Desired, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// Component a state-variable dependency points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentRef {
    This,
    Parent,
    Id(ComponentId),
    /// Name/index path resolved from the declaring component.
    Path(Arc<str>),
}

/// One declared dependency.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    /// A fixed value; no edge.
    Constant(Value),
    StateVariable {
        component: ComponentRef,
        variable: VarName,
    },
    /// `variable` of the attribute component, or the attribute literal.
    Attribute {
        attribute: VarName,
        variable: VarName,
    },
    /// Effective children (composites flattened), optionally filtered by
    /// type, with the listed variables of each.
    Children {
        types: Vec<Arc<str>>,
        variables: Vec<VarName>,
    },
    /// `variable` of the nearest ancestor that declares it.
    Ancestor {
        types: Vec<Arc<str>>,
        variable: VarName,
    },
    /// Size of one of the component's own array variables.
    ArraySize { variable: VarName },
}

impl Dependency {
    pub fn constant(value: impl Into<Value>) -> Self {
        Dependency::Constant(value.into())
    }

    pub fn own(variable: &str) -> Self {
        Dependency::StateVariable {
            component: ComponentRef::This,
            variable: variable.into(),
        }
    }

    pub fn parent(variable: &str) -> Self {
        Dependency::StateVariable {
            component: ComponentRef::Parent,
            variable: variable.into(),
        }
    }

    pub fn of(component: ComponentId, variable: &str) -> Self {
        Dependency::StateVariable {
            component: ComponentRef::Id(component),
            variable: variable.into(),
        }
    }

    pub fn at_path(path: &str, variable: &str) -> Self {
        Dependency::StateVariable {
            component: ComponentRef::Path(path.into()),
            variable: variable.into(),
        }
    }

    pub fn attribute(attribute: &str, variable: &str) -> Self {
        Dependency::Attribute {
            attribute: attribute.into(),
            variable: variable.into(),
        }
    }

    pub fn children(types: &[&str], variables: &[&str]) -> Self {
        Dependency::Children {
            types: types.iter().map(|t| Arc::from(*t)).collect(),
            variables: variables.iter().map(|v| VarName::from(*v)).collect(),
        }
    }

    pub fn ancestor(variable: &str) -> Self {
        Dependency::Ancestor {
            types: Vec::new(),
            variable: variable.into(),
        }
    }

    pub fn array_size(variable: &str) -> Self {
        Dependency::ArraySize {
            variable: variable.into(),
        }
    }
}

/// Dependencies declared for one evaluation, by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies {
    pub(crate) entries: IndexMap<VarName, Dependency>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, dependency: Dependency) -> Self {
        self.entries.insert(key.into(), dependency);
        self
    }

    pub fn insert(&mut self, key: &str, dependency: Dependency) {
        self.entries.insert(key.into(), dependency);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Values of one child, as requested by a children dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildValues {
    pub id: ComponentId,
    pub component_type: Arc<str>,
    pub values: IndexMap<VarName, Value>,
}

impl ChildValues {
    pub fn value(&self, variable: &str) -> &Value {
        self.values.get(variable).unwrap_or(&NULL)
    }
}

/// Resolved value of one dependency.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyValue {
    Value(Value),
    Children(Vec<ChildValues>),
    /// Nothing to depend on (absent attribute, no such ancestor).
    Missing,
}

static NULL: Value = Value::Null;

/// Dependency values handed to definitions and inverses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyValues {
    pub(crate) entries: IndexMap<VarName, DependencyValue>,
    pub(crate) array_size: Option<usize>,
}

impl DependencyValues {
    pub fn get(&self, key: &str) -> Option<&DependencyValue> {
        self.entries.get(key)
    }

    /// Value of a scalar dependency; `Null` when missing or not scalar.
    pub fn value(&self, key: &str) -> &Value {
        match self.entries.get(key) {
            Some(DependencyValue::Value(v)) => v,
            _ => &NULL,
        }
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.value(key).as_number()
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.value(key).as_bool()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key).as_text()
    }

    pub fn children(&self, key: &str) -> &[ChildValues] {
        match self.entries.get(key) {
            Some(DependencyValue::Children(children)) => children,
            _ => &[],
        }
    }

    pub fn is_missing(&self, key: &str) -> bool {
        matches!(self.entries.get(key), None | Some(DependencyValue::Missing))
    }

    /// Size of the array being defined; 0 for scalars.
    pub fn array_size(&self) -> usize {
        self.array_size.unwrap_or(0)
    }

    pub(crate) fn insert(&mut self, key: VarName, value: DependencyValue) {
        self.entries.insert(key, value);
    }
}

/// Primary result of a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Defined {
    Value(Value),
    /// Use the essential value, or the declared default when none was set.
    UseEssentialOrDefault,
    /// Use the essential value, or this dependency-derived default.
    EssentialOr(Value),
    /// Per-key values of an array; missing keys fall back to essential
    /// overrides and then to the default-by-key function.
    Entries(IndexMap<usize, Value>),
}

/// Result of a definition: the primary value plus auxiliary outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub primary: Defined,
    pub additional: IndexMap<VarName, Value>,
}

impl Definition {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            primary: Defined::Value(value.into()),
            additional: IndexMap::new(),
        }
    }

    pub fn essential() -> Self {
        Self {
            primary: Defined::UseEssentialOrDefault,
            additional: IndexMap::new(),
        }
    }

    pub fn essential_or(default: impl Into<Value>) -> Self {
        Self {
            primary: Defined::EssentialOr(default.into()),
            additional: IndexMap::new(),
        }
    }

    pub fn entries(entries: IndexMap<usize, Value>) -> Self {
        Self {
            primary: Defined::Entries(entries),
            additional: IndexMap::new(),
        }
    }

    pub fn with_additional(mut self, variable: &str, value: impl Into<Value>) -> Self {
        self.additional.insert(variable.into(), value.into());
        self
    }
}

/// Write requested by an inverse definition.
#[derive(Debug, Clone, PartialEq)]
pub enum InverseInstruction {
    /// Invert the dependency `dependency` toward `desired`. For children
    /// dependencies `child` picks the child and `variable` the variable
    /// (defaults: first child, first requested variable).
    SetDependency {
        dependency: VarName,
        child: Option<usize>,
        variable: Option<VarName>,
        desired: Desired,
    },
    /// Write the essential value of this variable, or of a sibling
    /// essential variable of the same component.
    SetEssential {
        variable: Option<VarName>,
        desired: Desired,
    },
}

impl InverseInstruction {
    pub fn dependency(dependency: &str, desired: impl Into<Desired>) -> Self {
        InverseInstruction::SetDependency {
            dependency: dependency.into(),
            child: None,
            variable: None,
            desired: desired.into(),
        }
    }

    pub fn child(dependency: &str, child: usize, variable: &str, desired: impl Into<Desired>) -> Self {
        InverseInstruction::SetDependency {
            dependency: dependency.into(),
            child: Some(child),
            variable: Some(variable.into()),
            desired: desired.into(),
        }
    }

    pub fn essential(desired: impl Into<Desired>) -> Self {
        InverseInstruction::SetEssential {
            variable: None,
            desired: desired.into(),
        }
    }

    pub fn essential_of(variable: &str, desired: impl Into<Desired>) -> Self {
        InverseInstruction::SetEssential {
            variable: Some(variable.into()),
            desired: desired.into(),
        }
    }
}

/// Input of an inverse definition.
#[derive(Debug)]
pub struct InverseRequest<'a> {
    pub desired: &'a Desired,
    /// Dependency values of the last forward evaluation.
    pub values: &'a DependencyValues,
    pub current: &'a Value,
}

/// Where a dependency was resolved to, kept for inversion.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DependencyTarget {
    Cell(CellKey),
    Children {
        ids: Vec<ComponentId>,
        variables: Vec<VarName>,
    },
    Fixed,
}
