//! Pull-based evaluation of cells and staleness propagation.

use super::{CellState, Dependent, EdgeKind, Mirror, Source};
use crate::address::{CellKey, CellPart, ComponentId, VarName};
use crate::component::{Attribute, Shadow};
use crate::definition::{
    ChildValues, ComponentRef, Defined, Dependencies, Dependency, DependencyTarget,
    DependencyValue, DependencyValues,
};
use crate::diagnostics::Diagnostic;
use crate::document::Document;
use crate::error::{DefinitionError, ValueError};
use crate::graph::DependencyQuery;
use crate::registry::{StateVariable, VariableLookup};
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

/// Output of one cell computation.
#[derive(Debug, Clone, Default)]
pub(crate) struct Evaluated {
    pub value: Value,
    pub additional: IndexMap<VarName, Value>,
    pub values: Rc<DependencyValues>,
    pub targets: Rc<IndexMap<VarName, DependencyTarget>>,
    pub mirror: Option<Mirror>,
}

impl Evaluated {
    pub fn of(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }
}

enum Evaluation {
    /// Inputs unchanged since the last verification.
    Reused,
    Computed(Evaluated),
}

type Resolved = (DependencyValues, IndexMap<VarName, DependencyTarget>);

impl Document {
    pub(crate) fn cell_value(&mut self, key: &CellKey) -> Result<Value, ValueError> {
        self.cell_value_as(key, EdgeKind::Value)
    }

    /// Value of `key`, recording the read as an edge of the innermost
    /// evaluation.
    pub(crate) fn cell_value_as(&mut self, key: &CellKey, kind: EdgeKind) -> Result<Value, ValueError> {
        if !self.arena.is_live(key.component) {
            return Err(ValueError::Retired(key.component));
        }
        self.graph.record(Source::Cell(key.clone()), kind);

        let prior = self.graph.state(key);
        match &prior {
            CellState::Fresh => return Ok(self.graph.cached(key)),
            CellState::Failed(err) => return Err(err.clone()),
            CellState::Resolving => {
                log::debug!("cycle: {key} re-entered while resolving");
                return Err(ValueError::DefinitionCycle { cell: key.clone() });
            }
            CellState::Unresolved | CellState::Stale => {}
        }
        if self.graph.frames.len() >= self.config.max_resolve_depth {
            return Err(ValueError::DepthExceeded {
                cell: key.clone(),
                limit: self.config.max_resolve_depth,
            });
        }

        self.graph.begin(Dependent::Cell(key.clone()));
        let outcome = self.evaluate(key, &prior);
        let edges = self.graph.end();

        if !self.arena.is_live(key.component) {
            // Retired by a re-expansion triggered while computing.
            self.graph.discard(key);
            return Err(ValueError::Retired(key.component));
        }

        match outcome {
            Ok(Evaluation::Reused) => {
                let verified = self.ticks.current();
                Ok(self.graph.mark_verified(key, verified))
            }
            Ok(Evaluation::Computed(evaluated)) => {
                self.graph.set_edges(Dependent::Cell(key.clone()), edges);
                let changed = self.ticks.next();
                let verified = self.ticks.current();
                let previous = self.graph.get(key).map(|entry| entry.value.clone());
                let value = self.graph.store(key, evaluated, changed, verified);
                if self.diagnostics.enabled && previous.as_ref() != Some(&value) {
                    let tick = self.ticks.current_tick();
                    self.diagnostics
                        .record_change(tick, key.clone(), previous, value.clone());
                }
                log::trace!("{key} = {value}");
                Ok(value)
            }
            Err(err) => {
                self.graph.set_edges(Dependent::Cell(key.clone()), edges);
                let changed = self.ticks.next();
                self.graph.fail(key, err.clone(), changed);
                if let ValueError::DefinitionCycle { cell } = &err {
                    if cell == key {
                        log::warn!("definition cycle through {key}");
                        self.diagnostics.push(Diagnostic::cycle(key.clone()));
                    }
                }
                Err(err)
            }
        }
    }

    fn evaluate(&mut self, key: &CellKey, prior: &CellState) -> Result<Evaluation, ValueError> {
        if *prior == CellState::Stale && self.inputs_unchanged(key) {
            return Ok(Evaluation::Reused);
        }
        self.graph.clear_frame();
        self.compute(key).map(Evaluation::Computed)
    }

    /// Brings every recorded input up to date and reports whether any of
    /// them changed after this cell was last verified.
    fn inputs_unchanged(&mut self, key: &CellKey) -> bool {
        let Some(entry) = self.graph.get(key) else {
            return false;
        };
        if entry.forced {
            return false;
        }
        let verified = entry.verified_at;
        let edges = self.graph.edges_of(&Dependent::Cell(key.clone())).to_vec();
        for (source, kind) in edges {
            match source {
                Source::Cell(input) => {
                    // Errors are compared through the input's change stamp.
                    let _ = self.cell_value_as(&input, kind);
                    match self.graph.get(&input) {
                        Some(entry) if entry.changed_at < verified => {}
                        _ => return false,
                    }
                }
                Source::Children(parent) => {
                    if !self.arena.is_live(parent) {
                        return false;
                    }
                    self.effective_children(parent);
                    if self.graph.structure_changed_at(parent) >= verified {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn compute(&mut self, key: &CellKey) -> Result<Evaluated, ValueError> {
        let (component_type, shadow) = match self.arena.get(key.component) {
            Some(component) => (component.component_type.clone(), component.shadow.clone()),
            None => return Err(ValueError::Retired(key.component)),
        };
        let undefined = || ValueError::Undefined {
            component: key.component,
            variable: key.variable.clone(),
        };
        let ty = self.registry.get(&component_type).ok_or_else(undefined)?;

        match ty.lookup(&key.variable).ok_or_else(undefined)? {
            VariableLookup::Entry { array, index } => {
                let target = CellKey::new(key.component, array);
                self.compute_mirror(target, Some(index))
            }
            VariableLookup::Follower { primary } => self.compute_follower(key, primary),
            VariableLookup::Declared(variable) => {
                match &shadow {
                    Some(Shadow::Component { source }) if variable.shadowable => {
                        let target = CellKey {
                            component: *source,
                            variable: key.variable.clone(),
                            part: key.part,
                        };
                        return self.compute_mirror(target, None);
                    }
                    Some(Shadow::Variable {
                        variable: mirrored,
                        source,
                        entry,
                    }) if *mirrored == key.variable && key.part == CellPart::Value => {
                        return self.compute_mirror(source.clone(), *entry);
                    }
                    _ => {}
                }
                match key.part {
                    CellPart::ArraySize => self.compute_array_size(key, variable),
                    CellPart::Value => self.compute_defined(key, variable),
                }
            }
        }
    }

    fn compute_mirror(&mut self, target: CellKey, entry: Option<usize>) -> Result<Evaluated, ValueError> {
        let value = self.read_cell(&target, EdgeKind::Value)?;
        let value = match entry {
            Some(index) => value
                .as_array()
                .and_then(|items| items.get(index))
                .cloned()
                .unwrap_or(Value::Null),
            None => value,
        };
        Ok(Evaluated {
            value,
            mirror: Some(Mirror { target, entry }),
            ..Evaluated::default()
        })
    }

    fn compute_follower(&mut self, key: &CellKey, primary: VarName) -> Result<Evaluated, ValueError> {
        let primary = CellKey::new(key.component, primary);
        self.read_cell(&primary, EdgeKind::Value)?;
        let value = match self.graph.get(&primary) {
            Some(entry) if matches!(entry.state, CellState::Failed(_)) => Value::Invalid,
            Some(entry) => entry
                .additional
                .get(&key.variable)
                .cloned()
                .unwrap_or_default(),
            None => Value::Invalid,
        };
        Ok(Evaluated::of(value))
    }

    fn compute_array_size(&mut self, key: &CellKey, variable: &StateVariable) -> Result<Evaluated, ValueError> {
        let Some(array) = &variable.array else {
            return Err(ValueError::Undefined {
                component: key.component,
                variable: key.variable.clone(),
            });
        };
        let declare = array.size_dependencies.clone();
        let dependencies = declare(&mut DependencyQuery::new(self, key.component));
        let (values, targets) = self.resolve_dependencies(key.component, &dependencies)?;
        let size = match (array.size)(&values) {
            Ok(size) => size,
            Err(err) => {
                self.report_definition_error(key, &err);
                0
            }
        };
        Ok(Evaluated {
            value: Value::Number(size as f64),
            values: Rc::new(values),
            targets: Rc::new(targets),
            ..Evaluated::default()
        })
    }

    fn compute_defined(&mut self, key: &CellKey, variable: &StateVariable) -> Result<Evaluated, ValueError> {
        let declare = variable.dependencies.clone();
        let dependencies = declare(&mut DependencyQuery::new(self, key.component));

        let size = if variable.array.is_some() {
            let size = self.read_cell(&key.with_part(CellPart::ArraySize), EdgeKind::ArraySize)?;
            Some(size.as_count().unwrap_or(0))
        } else {
            None
        };

        let (mut values, targets) = self.resolve_dependencies(key.component, &dependencies)?;
        values.array_size = size;

        let (value, additional) = match (variable.definition)(&values) {
            Ok(definition) => (
                self.settle(key, variable, definition.primary, size),
                definition.additional,
            ),
            Err(err) => {
                self.report_definition_error(key, &err);
                (Value::Invalid, IndexMap::new())
            }
        };
        Ok(Evaluated {
            value,
            additional,
            values: Rc::new(values),
            targets: Rc::new(targets),
            mirror: None,
        })
    }

    /// Turn a definition result into the cell value, consulting essential
    /// data and per-key defaults.
    fn settle(&mut self, key: &CellKey, variable: &StateVariable, defined: Defined, size: Option<usize>) -> Value {
        let essential = self
            .arena
            .get(key.component)
            .and_then(|component| component.essential.get(&key.variable))
            .cloned()
            .unwrap_or_default();
        let default = variable.essential.clone().unwrap_or_default();

        let Some(size) = size else {
            return match defined {
                Defined::Value(value) => value,
                Defined::UseEssentialOrDefault => essential.value.unwrap_or(default),
                Defined::EssentialOr(fallback) => essential.value.unwrap_or(fallback),
                Defined::Entries(_) => {
                    let err = DefinitionError::Domain("per-key entries for a scalar".into());
                    self.report_definition_error(key, &err);
                    Value::Invalid
                }
            };
        };

        // Definition entries win over essential overrides; `EssentialOr`
        // entries only fill keys nobody wrote.
        let (explicit, fallback): (IndexMap<usize, Value>, IndexMap<usize, Value>) = match defined {
            Defined::Entries(entries) => (entries, IndexMap::new()),
            Defined::Value(Value::Array(items)) => {
                (items.iter().cloned().enumerate().collect(), IndexMap::new())
            }
            Defined::EssentialOr(Value::Array(items)) => (
                IndexMap::new(),
                items
                    .iter()
                    .cloned()
                    .enumerate()
                    .filter(|(_, item)| *item != Value::Null)
                    .collect(),
            ),
            Defined::Value(_) | Defined::EssentialOr(_) | Defined::UseEssentialOrDefault => {
                (IndexMap::new(), IndexMap::new())
            }
        };
        let default_by_key = variable.array.as_ref().and_then(|a| a.default_by_key.clone());
        let items = (0..size).map(|index| {
            if let Some(value) = explicit.get(&index) {
                return value.clone();
            }
            if let Some(value) = essential.entries.get(&index) {
                return value.clone();
            }
            if let Some(value) = fallback.get(&index) {
                return value.clone();
            }
            match &default_by_key {
                Some(default_by_key) => default_by_key(index),
                None => default.clone(),
            }
        });
        Value::array(items.collect::<Vec<_>>())
    }

    pub(crate) fn resolve_dependencies(
        &mut self,
        component: ComponentId,
        dependencies: &Dependencies,
    ) -> Result<Resolved, ValueError> {
        let mut values = DependencyValues::default();
        let mut targets = IndexMap::new();
        for (name, dependency) in &dependencies.entries {
            let (value, target) = self.resolve_dependency(component, dependency)?;
            values.insert(name.clone(), value);
            targets.insert(name.clone(), target);
        }
        Ok((values, targets))
    }

    fn resolve_dependency(
        &mut self,
        component: ComponentId,
        dependency: &Dependency,
    ) -> Result<(DependencyValue, DependencyTarget), ValueError> {
        let missing = (DependencyValue::Missing, DependencyTarget::Fixed);
        match dependency {
            Dependency::Constant(value) => {
                Ok((DependencyValue::Value(value.clone()), DependencyTarget::Fixed))
            }
            Dependency::StateVariable {
                component: reference,
                variable,
            } => {
                let target = match reference {
                    ComponentRef::This => Some(component),
                    ComponentRef::Parent => self.arena.parent(component),
                    ComponentRef::Id(id) => Some(*id),
                    ComponentRef::Path(path) => self.resolve_reference(component, path),
                };
                let target = target.map(|target| self.stand_in(target, variable));
                match target {
                    Some(target) if self.has_variable(target, variable) => {
                        self.read_target(CellKey::new(target, variable.clone()))
                    }
                    Some(target) if !self.arena.is_live(target) => Ok((
                        DependencyValue::Value(Value::Invalid),
                        DependencyTarget::Fixed,
                    )),
                    _ => Ok(missing),
                }
            }
            Dependency::Attribute {
                attribute,
                variable,
            } => {
                let attribute = self
                    .arena
                    .get(component)
                    .and_then(|c| c.attributes.get(attribute))
                    .cloned();
                match attribute {
                    Some(Attribute::Literal(value)) => {
                        Ok((DependencyValue::Value(value), DependencyTarget::Fixed))
                    }
                    Some(Attribute::Component(id)) => {
                        let id = self.stand_in(id, variable);
                        if self.has_variable(id, variable) {
                            self.read_target(CellKey::new(id, variable.clone()))
                        } else {
                            Ok(missing)
                        }
                    }
                    _ => Ok(missing),
                }
            }
            Dependency::Children { types, variables } => {
                let mut children = Vec::new();
                let mut ids = Vec::new();
                for child in self.effective_children(component) {
                    let Some(child_type) = self.arena.component_type(child).cloned() else {
                        continue;
                    };
                    if !types.is_empty() && !types.contains(&child_type) {
                        continue;
                    }
                    let mut values = IndexMap::new();
                    for variable in variables {
                        let value = if self.has_variable(child, variable) {
                            self.read_cell(&CellKey::new(child, variable.clone()), EdgeKind::Value)?
                        } else {
                            Value::Null
                        };
                        values.insert(variable.clone(), value);
                    }
                    ids.push(child);
                    children.push(ChildValues {
                        id: child,
                        component_type: child_type,
                        values,
                    });
                }
                Ok((
                    DependencyValue::Children(children),
                    DependencyTarget::Children {
                        ids,
                        variables: variables.clone(),
                    },
                ))
            }
            Dependency::Ancestor { types, variable } => {
                let mut current = self.arena.parent(component);
                while let Some(ancestor) = current {
                    let matches_type = types.is_empty()
                        || self
                            .arena
                            .component_type(ancestor)
                            .is_some_and(|ty| types.contains(ty));
                    if matches_type && self.has_variable(ancestor, variable) {
                        return self.read_target(CellKey::new(ancestor, variable.clone()));
                    }
                    current = self.arena.parent(ancestor);
                }
                Ok(missing)
            }
            Dependency::ArraySize { variable } => {
                let key = CellKey::array_size(component, variable.clone());
                let size = self.read_cell(&key, EdgeKind::ArraySize)?;
                Ok((DependencyValue::Value(size), DependencyTarget::Fixed))
            }
        }
    }

    fn read_target(&mut self, key: CellKey) -> Result<(DependencyValue, DependencyTarget), ValueError> {
        let value = self.read_cell(&key, EdgeKind::Value)?;
        Ok((DependencyValue::Value(value), DependencyTarget::Cell(key)))
    }

    /// Read a cell on behalf of another cell: failures become `Invalid`
    /// except a cycle whose root is still resolving, which unwinds to it.
    pub(crate) fn read_cell(&mut self, key: &CellKey, kind: EdgeKind) -> Result<Value, ValueError> {
        match self.cell_value_as(key, kind) {
            Ok(value) => Ok(value),
            Err(ValueError::DefinitionCycle { cell }) if self.graph.is_resolving(&cell) => {
                Err(ValueError::DefinitionCycle { cell })
            }
            Err(err) => {
                log::debug!("{key} unavailable: {err}");
                Ok(Value::Invalid)
            }
        }
    }

    fn resolve_reference(&mut self, origin: ComponentId, path: &str) -> Option<ComponentId> {
        match self.resolve_path_from(origin, path) {
            Ok(resolution) if resolution.remaining.is_empty() => Some(resolution.component),
            Ok(resolution) => {
                log::debug!(
                    "reference `{path}` from {origin} stopped at {} with {} segments left",
                    resolution.component,
                    resolution.remaining.len()
                );
                None
            }
            Err(err) => {
                log::debug!("reference `{path}` from {origin}: {err}");
                None
            }
        }
    }

    /// A composite without `variable` stands for its only replacement.
    fn stand_in(&mut self, id: ComponentId, variable: &str) -> ComponentId {
        if !self.is_composite(id) || self.has_variable(id, variable) {
            return id;
        }
        match self.meaningful_replacements(id).as_deref() {
            Ok([only]) => *only,
            Ok(_) | Err(_) => id,
        }
    }

    pub(crate) fn has_variable(&self, component: ComponentId, variable: &str) -> bool {
        self.arena
            .component_type(component)
            .and_then(|ty| self.registry.get(ty))
            .is_some_and(|ty| ty.has_variable(variable))
    }

    fn report_definition_error(&mut self, key: &CellKey, err: &DefinitionError) {
        log::warn!("{key} resolves to invalid: {err}");
        self.diagnostics.push(Diagnostic::numeric(key.clone(), err));
    }

    /// Mark everything reachable from `source` along recorded edges stale.
    pub(crate) fn invalidate(&mut self, source: Source) {
        let mut work = vec![source];
        while let Some(source) = work.pop() {
            match &source {
                Source::Cell(key) => self.render.mark_dirty(key.component),
                Source::Children(parent) => self.render.mark_dirty(*parent),
            }
            for dependent in self.graph.dependents_of(&source) {
                match dependent {
                    Dependent::Cell(key) => {
                        if self.graph.mark_stale(&key) {
                            work.push(Source::Cell(key));
                        }
                    }
                    Dependent::Expansion(composite) => {
                        if self.mark_expansion_stale(composite) {
                            if let Some(parent) = self.arena.parent(composite) {
                                work.push(Source::Children(parent));
                            }
                        }
                    }
                }
            }
        }
    }
}
