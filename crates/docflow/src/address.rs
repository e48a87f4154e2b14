//! Identifiers for components and their cells.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// State variable name.
pub type VarName = Arc<str>;

/// Stable arena index of a component. Never reused within a document.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which part of a state variable a cell holds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CellPart {
    Value,
    /// Size of an array-valued variable, resolved before its entries.
    ArraySize,
}

/// Address of a single value cell.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct CellKey {
    pub component: ComponentId,
    pub variable: VarName,
    pub part: CellPart,
}

impl CellKey {
    pub fn new(component: ComponentId, variable: impl Into<VarName>) -> Self {
        Self {
            component,
            variable: variable.into(),
            part: CellPart::Value,
        }
    }

    pub fn array_size(component: ComponentId, variable: impl Into<VarName>) -> Self {
        Self {
            component,
            variable: variable.into(),
            part: CellPart::ArraySize,
        }
    }

    pub fn with_part(&self, part: CellPart) -> Self {
        Self {
            component: self.component,
            variable: self.variable.clone(),
            part,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part {
            CellPart::Value => write!(f, "{}.{}", self.component, self.variable),
            CellPart::ArraySize => write!(f, "{}.{}[size]", self.component, self.variable),
        }
    }
}
