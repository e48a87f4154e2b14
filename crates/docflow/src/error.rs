//! Error types of the engine.
//!
//! Recoverable failures stay local: cell errors become values, path
//! failures are typed results, expansion failures degrade the composite
//! and action failures reject the action without touching state.

use crate::address::{CellKey, ComponentId, VarName};
use thiserror::Error;

/// Failure to produce a cell value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("definition cycle through {cell}")]
    DefinitionCycle { cell: CellKey },

    #[error("{component} has no state variable `{variable}`")]
    Undefined {
        component: ComponentId,
        variable: VarName,
    },

    #[error("component {0} does not exist or was retired")]
    Retired(ComponentId),

    #[error("resolving {cell} exceeded the depth limit of {limit}")]
    DepthExceeded { cell: CellKey, limit: usize },
}

/// Failure reported by a definition function. Caught at the cell boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("`{0}` is not a number")]
    NotANumber(String),

    #[error("`{0}` is not a boolean")]
    NotABoolean(String),

    #[error("domain error: {0}")]
    Domain(String),

    #[error("limit of {limit} exceeded ({requested} requested)")]
    LimitExceeded { limit: usize, requested: usize },
}

/// Failure reported by an inverse definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InverseError {
    #[error("no inverse for the current dependencies")]
    Unsupported,

    #[error("desired value rejected: {0}")]
    InvalidDesired(String),
}

/// Failure to build the initial tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("unknown component type `{0}`")]
    UnknownComponentType(String),

    #[error("component {0} does not exist or was retired")]
    Retired(ComponentId),
}

/// Failure to resolve a name/index path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("invalid path `{path}`: {message}")]
    Syntax { path: String, message: String },

    #[error("`{segment}` not found while resolving `{path}`")]
    Unresolved { path: String, segment: String },

    #[error("path `{path}` refers to itself")]
    SelfReferential { path: String },

    #[error("component {0} does not exist or was retired")]
    Retired(ComponentId),
}

/// Failure to expand a composite.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpansionError {
    #[error("{0} is not a composite")]
    NotComposite(ComponentId),

    #[error("component {0} does not exist or was retired")]
    Retired(ComponentId),

    #[error("expansion of {composite} requires its own expansion")]
    Cycle { composite: ComponentId },

    #[error("expansion nesting exceeded the depth limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("{composite} is missing attribute `{attribute}`")]
    MissingAttribute {
        composite: ComponentId,
        attribute: String,
    },

    #[error("{composite} cannot copy its own ancestor {target}")]
    SelfReference {
        composite: ComponentId,
        target: ComponentId,
    },

    #[error("{composite} would produce {requested} replacements, limit is {limit}")]
    LimitExceeded {
        composite: ComponentId,
        limit: usize,
        requested: usize,
    },

    #[error("unknown component type `{0}` in replacement")]
    UnknownComponentType(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Value(#[from] ValueError),
}

impl From<BuildError> for ExpansionError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::UnknownComponentType(ty) => ExpansionError::UnknownComponentType(ty),
            BuildError::Retired(id) => ExpansionError::Retired(id),
        }
    }
}

/// Reason an action or dispatch was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("component {0} does not exist or was retired")]
    Retired(ComponentId),

    #[error("{component} has no action `{action}`")]
    UnknownAction {
        component: ComponentId,
        action: VarName,
    },

    #[error("action `{action}` is missing argument `{argument}`")]
    MissingArgument { action: VarName, argument: String },

    #[error("{cell} has no inverse definition")]
    InversionUnsupported { cell: CellKey },

    #[error("{cell} is not backed by an essential value")]
    NotEssential { cell: CellKey },

    #[error("desired value for {cell} rejected: {reason}")]
    InvalidDesired { cell: CellKey, reason: String },

    #[error("inversion exceeded the depth limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error(transparent)]
    Value(#[from] ValueError),
}

impl ActionError {
    /// True when the failure is the target's lack of an inverse.
    pub fn is_inversion_unsupported(&self) -> bool {
        matches!(self, ActionError::InversionUnsupported { .. })
    }
}

/// Failure to produce a render state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("component {0} does not exist or was retired")]
    Retired(ComponentId),
}

/// Failure to load an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Toml(#[from] toml::de::Error),
}
