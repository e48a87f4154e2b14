//! Reactive state-variable engine for interactive markup documents.
//!
//! A [`Document`] holds a tree of components. Each component type declares
//! named state variables whose values are pure functions of other state
//! variables; cells are computed lazily, memoized, and invalidated along
//! recorded dependency edges. Composites (copy, map, conditional content)
//! expand into replacement components on demand. Actions push desired
//! values back through inverse definitions to essential values.

pub mod action;
pub mod address;
pub mod builtins;
pub mod component;
pub mod config;
pub mod definition;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod expand;
pub mod graph;
pub mod ledger;
pub mod path;
pub mod registry;
pub mod render;
pub mod schedule;
pub mod snapshot;
pub mod tick;
pub mod tree;
pub mod value;

pub use action::{ActionContext, ActionEffect, ActionFlags, ActionOutcome, ActionRequest, CommitRecord};
pub use address::{CellKey, CellPart, ComponentId, VarName};
pub use config::EngineConfig;
pub use definition::{
    Defined, Definition, Dependencies, Dependency, DependencyValues, InverseInstruction,
    InverseRequest,
};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use document::Document;
pub use error::{
    ActionError, BuildError, ConfigError, DefinitionError, ExpansionError, InverseError,
    PathError, RenderError, ValueError,
};
pub use expand::{ExpansionContext, ExpansionStatus, Replacement};
pub use path::PathResolution;
pub use registry::{ComponentRegistry, ComponentType, StateVariable};
pub use render::{ChildInstruction, RenderState, RenderUpdate};
pub use snapshot::{ComponentStateSnapshot, DocumentSnapshot};
pub use tree::{AttributeSpec, ChildSpec, ComponentSpec};
pub use value::{Desired, Value};
