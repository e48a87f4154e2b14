use super::EdgeKind;
use crate::address::{CellKey, ComponentId};
use crate::component::Attribute;
use crate::document::Document;
use crate::value::Value;

/// Handed to dependency declarations so they can depend on the
/// component's current shape and on its own determining variables.
pub struct DependencyQuery<'a> {
    document: &'a mut Document,
    component: ComponentId,
}

impl<'a> DependencyQuery<'a> {
    pub(crate) fn new(document: &'a mut Document, component: ComponentId) -> Self {
        Self {
            document,
            component,
        }
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.document
            .arena
            .get(self.component)
            .is_some_and(|c| c.attributes.contains_key(name))
    }

    /// Literal value of an attribute, if it is a literal.
    pub fn attribute_literal(&self, name: &str) -> Option<Value> {
        match self.document.arena.get(self.component)?.attributes.get(name)? {
            Attribute::Literal(value) => Some(value.clone()),
            Attribute::Component(_) => None,
        }
    }

    pub fn authored_child_count(&self) -> usize {
        self.document
            .arena
            .get(self.component)
            .map_or(0, |c| c.children.len())
    }

    /// Read one of the component's own variables. The read becomes an input
    /// of the cell being declared, so the declaration is redone when it
    /// changes.
    pub fn value(&mut self, variable: &str) -> Value {
        let key = CellKey::new(self.component, variable);
        self.document
            .read_cell(&key, EdgeKind::Value)
            .unwrap_or(Value::Invalid)
    }
}
