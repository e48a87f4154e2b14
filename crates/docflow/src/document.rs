//! The document: component arena plus the engine state around it.
//!
//! Everything runs on `&mut self` and to completion. Cells are computed
//! lazily on read; composites expand when something needs their
//! replacements.

use crate::action::ActionQueue;
use crate::address::{CellKey, ComponentId, VarName};
use crate::builtins;
use crate::component::{Arena, Attribute, Component, EssentialValue, Shadow};
use crate::config::EngineConfig;
use crate::diagnostics::{self, ChangeReason, Diagnostic, Diagnostics};
use crate::error::{BuildError, ValueError};
use crate::expand::ExpansionRecord;
use crate::graph::{DependencyGraph, Source};
use crate::ledger::{DeltaKind, Ledger};
use crate::registry::{ComponentRegistry, ComponentType, StateVariable};
use crate::render::RenderTracker;
use crate::schedule::Scheduler;
use crate::tick::TickCounter;
use crate::tree::{AttributeSpec, ChildSpec, ComponentSpec};
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;
use std::sync::Arc;
use ulid::Ulid;

/// A live document session.
pub struct Document {
    pub(crate) session: Ulid,
    pub(crate) config: EngineConfig,
    pub(crate) registry: ComponentRegistry,
    pub(crate) arena: Arena,
    pub(crate) root: ComponentId,
    pub(crate) graph: DependencyGraph,
    pub(crate) ticks: TickCounter,
    /// Composites whose rule is running, innermost last.
    pub(crate) expanding: Vec<ComponentId>,
    /// Paths being resolved, innermost last.
    pub(crate) resolving_paths: Vec<(ComponentId, Arc<str>)>,
    pub(crate) actions: ActionQueue,
    pub(crate) scheduler: Scheduler,
    pub(crate) render: RenderTracker,
    pub(crate) ledger: Ledger,
    pub(crate) diagnostics: Diagnostics,
}

impl Document {
    pub fn new(registry: ComponentRegistry, root: &ComponentSpec) -> Result<Self, BuildError> {
        Self::with_config(registry, root, EngineConfig::default())
    }

    pub fn with_config(
        registry: ComponentRegistry,
        root: &ComponentSpec,
        config: EngineConfig,
    ) -> Result<Self, BuildError> {
        let mut ledger = Ledger::new();
        if config.record_ledger {
            ledger.enable();
        }
        let mut document = Self {
            session: Ulid::new(),
            config,
            registry,
            arena: Arena::new(),
            root: ComponentId(0),
            graph: DependencyGraph::new(),
            ticks: TickCounter::new(),
            expanding: Vec::new(),
            resolving_paths: Vec::new(),
            actions: ActionQueue::new(),
            scheduler: Scheduler::new(),
            render: RenderTracker::new(),
            ledger,
            diagnostics: Diagnostics::new(),
        };
        document.root = document.instantiate(root, None)?;
        log::debug!(
            "document {} built with {} components",
            document.session,
            document.arena.len()
        );
        Ok(document)
    }

    pub fn session(&self) -> Ulid {
        self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn root(&self) -> ComponentId {
        self.root
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.arena.get(id)
    }

    pub fn is_live(&self, id: ComponentId) -> bool {
        self.arena.is_live(id)
    }

    pub fn component_count(&self) -> usize {
        self.arena.len()
    }

    pub fn component_type(&self, id: ComponentId) -> Option<&Arc<str>> {
        self.arena.component_type(id)
    }

    pub fn name(&self, id: ComponentId) -> Option<&str> {
        self.arena.get(id)?.name.as_deref()
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.arena.parent(id)
    }

    /// Authored children, composites not flattened.
    pub fn children(&self, id: ComponentId) -> &[ComponentId] {
        self.arena
            .get(id)
            .map(|component| component.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Current value of a state variable. Applies any deferred action first.
    pub fn get_value(&mut self, component: ComponentId, variable: &str) -> Result<Value, ValueError> {
        self.flush();
        if !self.arena.is_live(component) {
            return Err(ValueError::Retired(component));
        }
        if !self.has_variable(component, variable) {
            return Err(ValueError::Undefined {
                component,
                variable: variable.into(),
            });
        }
        self.cell_value(&CellKey::new(component, variable))
    }

    /// How many times the definition of a cell has run.
    pub fn evaluations(&self, component: ComponentId, variable: &str) -> u64 {
        self.graph
            .get(&CellKey::new(component, variable))
            .map_or(0, |entry| entry.evaluations)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    /// Record every value change for [`Document::why_did_change`].
    pub fn enable_change_tracking(&mut self) {
        self.diagnostics.enable();
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Why `cell` changed during the latest action.
    pub fn why_did_change(&self, cell: &CellKey) -> Option<ChangeReason> {
        diagnostics::why_did_change(&self.graph, cell, self.ticks.current_tick())
    }

    pub fn change_chain(&self, cell: &CellKey) -> Vec<ChangeReason> {
        diagnostics::change_chain(&self.graph, cell, self.ticks.current_tick())
    }

    pub(crate) fn component_type_of(&self, id: ComponentId) -> Option<Rc<ComponentType>> {
        self.registry.get(self.arena.component_type(id)?)
    }

    /// Instantiate `spec` and its subtree under `parent`.
    pub(crate) fn instantiate(
        &mut self,
        spec: &ComponentSpec,
        parent: Option<ComponentId>,
    ) -> Result<ComponentId, BuildError> {
        let ty = self
            .registry
            .get(&spec.component_type)
            .ok_or_else(|| BuildError::UnknownComponentType(spec.component_type.clone()))?;

        let essential: IndexMap<VarName, EssentialValue> = spec
            .essential
            .iter()
            .map(|(name, value)| {
                let mut essential = EssentialValue::default();
                match value {
                    Value::Array(items) if ty.variable(name).is_some_and(StateVariable::is_array) => {
                        essential.entries = items.iter().cloned().enumerate().collect();
                    }
                    _ => essential.value = Some(value.clone()),
                }
                (VarName::from(name.as_str()), essential)
            })
            .collect();

        let id = self.arena.alloc(|id| {
            let mut component = Component::new(id, ty.name().clone());
            component.name = spec.name.as_deref().map(Arc::from);
            component.parent = parent;
            component.new_namespace = spec.new_namespace;
            component.essential = essential;
            if ty.serialize_children {
                component.serialized_children = spec.children.clone();
            }
            if ty.is_composite() {
                component.expansion = Some(ExpansionRecord::default());
            }
            component
        });

        if let Err(err) = self.instantiate_parts(id, spec, ty.serialize_children) {
            self.retire(id);
            return Err(err);
        }
        Ok(id)
    }

    fn instantiate_parts(
        &mut self,
        id: ComponentId,
        spec: &ComponentSpec,
        serialize_children: bool,
    ) -> Result<(), BuildError> {
        for (name, attribute) in &spec.attributes {
            let attribute = match attribute {
                AttributeSpec::Literal(value) => Attribute::Literal(value.clone()),
                AttributeSpec::Component(inner) => {
                    let owned = self.instantiate(inner, Some(id))?;
                    if let Some(component) = self.arena.get_mut(owned) {
                        component.attribute_of = Some(id);
                    }
                    Attribute::Component(owned)
                }
            };
            self.arena
                .get_mut(id)
                .ok_or(BuildError::Retired(id))?
                .attributes
                .insert(Arc::from(name.as_str()), attribute);
        }
        if serialize_children {
            return Ok(());
        }
        for child in &spec.children {
            let child = match child {
                ChildSpec::Text(text) => self.instantiate_text(text, id)?,
                ChildSpec::Component(inner) => self.instantiate(inner, Some(id))?,
            };
            self.arena
                .get_mut(id)
                .ok_or(BuildError::Retired(id))?
                .children
                .push(child);
        }
        Ok(())
    }

    fn instantiate_text(&mut self, text: &str, parent: ComponentId) -> Result<ComponentId, BuildError> {
        let spec = ComponentSpec::new(builtins::STRING).essential("value", text);
        self.instantiate(&spec, Some(parent))
    }

    /// Mirror of `source` and its subtree under `parent`.
    pub(crate) fn instantiate_shadow(
        &mut self,
        source: ComponentId,
        parent: Option<ComponentId>,
    ) -> Result<ComponentId, BuildError> {
        let original = self.arena.get(source).ok_or(BuildError::Retired(source))?;
        let component_type = original.component_type.clone();
        let source_children = original.children.clone();
        let serialized_children = original.serialized_children.clone();
        let new_namespace = original.new_namespace;
        let is_composite = original.expansion.is_some();
        let literals: IndexMap<Arc<str>, Attribute> = original
            .attributes
            .iter()
            .filter(|(_, attribute)| matches!(attribute, Attribute::Literal(_)))
            .map(|(name, attribute)| (name.clone(), attribute.clone()))
            .collect();

        let id = self.arena.alloc(|id| {
            let mut component = Component::new(id, component_type);
            component.parent = parent;
            component.new_namespace = new_namespace;
            component.attributes = literals;
            component.serialized_children = serialized_children;
            component.shadow = Some(Shadow::Component { source });
            if is_composite {
                component.expansion = Some(ExpansionRecord::default());
            }
            component
        });

        for child in source_children {
            match self.instantiate_shadow(child, Some(id)) {
                Ok(shadow) => {
                    if let Some(component) = self.arena.get_mut(id) {
                        component.children.push(shadow);
                    }
                }
                Err(err) => {
                    self.retire(id);
                    return Err(err);
                }
            }
        }
        Ok(id)
    }

    /// A `component_type` whose `variable` mirrors `source`.
    pub(crate) fn instantiate_shadow_variable(
        &mut self,
        component_type: &str,
        variable: VarName,
        source: CellKey,
        entry: Option<usize>,
        parent: Option<ComponentId>,
    ) -> Result<ComponentId, BuildError> {
        let ty = self
            .registry
            .get(component_type)
            .ok_or_else(|| BuildError::UnknownComponentType(component_type.to_string()))?;
        Ok(self.arena.alloc(|id| {
            let mut component = Component::new(id, ty.name().clone());
            component.parent = parent;
            component.shadow = Some(Shadow::Variable {
                variable,
                source,
                entry,
            });
            if ty.is_composite() {
                component.expansion = Some(ExpansionRecord::default());
            }
            component
        }))
    }

    /// Remove a component and everything it owns. Readers of its cells go
    /// stale; its follow-up tasks and render cache are dropped.
    pub(crate) fn retire(&mut self, id: ComponentId) {
        let Some(component) = self.arena.retire(id) else {
            return;
        };
        for key in self.graph.keys_of(id) {
            self.invalidate(Source::Cell(key));
        }
        self.invalidate(Source::Children(id));
        self.graph.remove_component(id);
        let cancelled = self.scheduler.cancel_component(id);
        if cancelled > 0 {
            log::debug!("cancelled {cancelled} follow-up tasks of retired {id}");
        }
        self.actions.forget_component(id);
        self.render.forget(id);
        let tick = self.ticks.current_tick();
        self.ledger.record(tick, DeltaKind::Retired { component: id });
        log::trace!("retired {id} ({})", component.component_type);

        for owned in component.owned() {
            self.retire(owned);
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("session", &self.session)
            .field("root", &self.root)
            .field("components", &self.arena.len())
            .field("cells", &self.graph.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(spec: ComponentSpec) -> Document {
        Document::new(ComponentRegistry::with_builtins(), &spec).unwrap()
    }

    #[test]
    fn text_children_become_string_components() {
        let doc = document(ComponentSpec::new("p").text("hello").text(" "));
        let children = doc.children(doc.root()).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(
            doc.component_type(children[0]).map(|t| &**t),
            Some(builtins::STRING)
        );
        assert_eq!(
            doc.component(children[0]).and_then(|c| c.essential_value("value")),
            Some(&Value::text("hello"))
        );
    }

    #[test]
    fn unknown_type_fails_the_build() {
        let spec = ComponentSpec::new("document").child(ComponentSpec::new("nope"));
        let err = Document::new(ComponentRegistry::with_builtins(), &spec).unwrap_err();
        assert_eq!(err, BuildError::UnknownComponentType("nope".into()));
    }

    #[test]
    fn attribute_components_hang_off_their_owner() {
        let spec = ComponentSpec::new("document").child(
            ComponentSpec::new("text")
                .named("t")
                .attribute("hide", ComponentSpec::new("boolean").text("true")),
        );
        let mut doc = document(spec);
        let text = doc.resolve_path_to_id("t", doc.root()).unwrap();
        let Some(Attribute::Component(hide)) = doc.component(text).unwrap().attributes.get("hide").cloned() else {
            panic!("hide should be a component attribute");
        };
        assert_eq!(doc.parent(hide), Some(text));
        assert_eq!(doc.component(hide).unwrap().attribute_of, Some(text));
    }

    #[test]
    fn retire_removes_owned_subtree() {
        let mut doc = document(
            ComponentSpec::new("document").child(ComponentSpec::new("p").named("p1").text("x")),
        );
        let p = doc.resolve_path_to_id("p1", doc.root()).unwrap();
        let text = doc.children(p)[0];
        doc.retire(p);
        assert!(!doc.is_live(p));
        assert!(!doc.is_live(text));
    }
}
