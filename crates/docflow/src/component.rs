//! Component instances and the arena that owns them.
//!
//! Components live in a flat arena indexed by [`ComponentId`]. Retired
//! slots stay empty; ids are never handed out twice, so a stale id held by
//! a renderer or a pending action resolves to "retired" instead of to an
//! unrelated component.

use crate::address::{CellKey, ComponentId, VarName};
use crate::expand::ExpansionRecord;
use crate::tree::ChildSpec;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// Attribute of a component instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Literal(Value),
    /// Owned attribute component; its cells are read by attribute dependencies.
    Component(ComponentId),
}

/// Mirroring relation used by references and copies.
#[derive(Debug, Clone, PartialEq)]
pub enum Shadow {
    /// Every shadowable variable mirrors the same variable of `source`.
    Component { source: ComponentId },
    /// Only `variable` mirrors `source`, or one entry of it.
    Variable {
        variable: VarName,
        source: CellKey,
        entry: Option<usize>,
    },
}

/// Essential data backing one state variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EssentialValue {
    pub value: Option<Value>,
    /// Per-key overrides of an array variable.
    pub entries: IndexMap<usize, Value>,
}

/// An instance of a component type.
#[derive(Debug, Clone)]
pub struct Component {
    pub id: ComponentId,
    pub component_type: Arc<str>,
    pub name: Option<Arc<str>>,
    pub parent: Option<ComponentId>,
    /// Authored children; composites among them are flattened on read.
    pub children: Vec<ComponentId>,
    pub attributes: IndexMap<Arc<str>, Attribute>,
    /// Children kept uninstantiated for types that serialize their children.
    pub serialized_children: Vec<ChildSpec>,
    pub essential: IndexMap<VarName, EssentialValue>,
    pub shadow: Option<Shadow>,
    pub new_namespace: bool,
    /// Set on replacements: the composite that owns this component.
    pub replacement_of: Option<ComponentId>,
    /// Set on attribute components: the component owning the attribute.
    pub attribute_of: Option<ComponentId>,
    pub expansion: Option<ExpansionRecord>,
}

impl Component {
    pub fn new(id: ComponentId, component_type: Arc<str>) -> Self {
        Self {
            id,
            component_type,
            name: None,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            serialized_children: Vec::new(),
            essential: IndexMap::new(),
            shadow: None,
            new_namespace: false,
            replacement_of: None,
            attribute_of: None,
            expansion: None,
        }
    }

    pub fn essential_value(&self, variable: &str) -> Option<&Value> {
        self.essential.get(variable)?.value.as_ref()
    }

    pub fn essential_entry(&self, variable: &str, index: usize) -> Option<&Value> {
        self.essential.get(variable)?.entries.get(&index)
    }

    /// Ids of everything this component owns: children, attribute
    /// components and current replacements.
    pub fn owned(&self) -> Vec<ComponentId> {
        let mut owned = self.children.clone();
        owned.extend(self.attributes.values().filter_map(|attribute| match attribute {
            Attribute::Component(id) => Some(*id),
            Attribute::Literal(_) => None,
        }));
        if let Some(expansion) = &self.expansion {
            owned.extend(expansion.replacements.iter().copied());
        }
        owned
    }
}

/// Arena that holds every component of a document.
#[derive(Debug, Default)]
pub struct Arena {
    components: Vec<Option<Component>>,
    live: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and store the component built for it.
    pub fn alloc(&mut self, build: impl FnOnce(ComponentId) -> Component) -> ComponentId {
        let id = ComponentId(self.components.len() as u32);
        self.components.push(Some(build(id)));
        self.live += 1;
        id
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id.index())?.as_mut()
    }

    pub fn is_live(&self, id: ComponentId) -> bool {
        self.get(id).is_some()
    }

    /// Remove a component; its id stays unused.
    pub fn retire(&mut self, id: ComponentId) -> Option<Component> {
        let component = self.components.get_mut(id.index())?.take()?;
        self.live -= 1;
        Some(component)
    }

    pub fn component_type(&self, id: ComponentId) -> Option<&Arc<str>> {
        self.get(id).map(|c| &c.component_type)
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.get(id)?.parent
    }

    /// Live components in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components.iter().filter_map(Option::as_ref)
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        self.iter().map(|c| c.id).collect()
    }

    /// Number of live components.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of ids handed out so far, retired ones included.
    pub fn allocated(&self) -> usize {
        self.components.len()
    }

    /// True when `ancestor` is `id` or one of its parents.
    pub fn is_ancestor_or_self(&self, ancestor: ComponentId, id: ComponentId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    /// The non-mirror component at the end of `id`'s shadow chain.
    pub fn shadow_origin(&self, id: ComponentId) -> ComponentId {
        let mut current = id;
        while let Some(Shadow::Component { source }) = self.get(current).and_then(|c| c.shadow.as_ref()) {
            current = *source;
        }
        current
    }

    /// Whether the original of `source` contains `id`, climbing through
    /// composites and the originals of mirrors. Mirroring such a source
    /// would place a copy of `id` inside itself.
    pub fn mirror_encloses(&self, source: ComponentId, id: ComponentId) -> bool {
        let origin = self.shadow_origin(source);
        let mut current = Some(id);
        while let Some(c) = current {
            if c == origin || self.shadow_origin(c) == origin {
                return true;
            }
            current = self.get(c).and_then(|component| component.replacement_of.or(component.parent));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_not_reused_after_retire() {
        let mut arena = Arena::new();
        let a = arena.alloc(|id| Component::new(id, "p".into()));
        let b = arena.alloc(|id| Component::new(id, "p".into()));
        assert!(arena.retire(a).is_some());
        let c = arena.alloc(|id| Component::new(id, "p".into()));
        assert_ne!(c, a);
        assert!(!arena.is_live(a));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.allocated(), 3);
        assert_eq!(arena.ids(), vec![b, c]);
    }

    #[test]
    fn ancestor_walk_follows_parents() {
        let mut arena = Arena::new();
        let root = arena.alloc(|id| Component::new(id, "document".into()));
        let child = arena.alloc(|id| {
            let mut c = Component::new(id, "p".into());
            c.parent = Some(root);
            c
        });
        assert!(arena.is_ancestor_or_self(root, child));
        assert!(arena.is_ancestor_or_self(child, child));
        assert!(!arena.is_ancestor_or_self(child, root));
    }

    #[test]
    fn mirrors_of_enclosing_originals_are_detected() {
        let mut arena = Arena::new();
        let root = arena.alloc(|id| Component::new(id, "document".into()));
        let copy = arena.alloc(|id| {
            let mut c = Component::new(id, "copy".into());
            c.parent = Some(root);
            c
        });
        let other = arena.alloc(|id| {
            let mut c = Component::new(id, "p".into());
            c.parent = Some(root);
            c
        });
        let mirror = arena.alloc(|id| {
            let mut c = Component::new(id, "copy".into());
            c.parent = Some(root);
            c.replacement_of = Some(other);
            c.shadow = Some(Shadow::Component { source: copy });
            c
        });

        assert_eq!(arena.shadow_origin(mirror), copy);
        assert!(arena.mirror_encloses(mirror, copy));
        assert!(arena.mirror_encloses(copy, mirror));
        assert!(arena.mirror_encloses(root, mirror));
        assert!(!arena.mirror_encloses(other, copy));
    }
}
