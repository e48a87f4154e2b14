//! Composite expansion.
//!
//! A composite owns an [`ExpansionRecord`]: its current replacements plus
//! the observations its expansion rule made while producing them. When a
//! read governing the expansion goes stale the record goes stale with it;
//! the next [`Document::ensure_expanded`] re-checks the observations and
//! only rebuilds when one of them actually differs. A rebuild retires every
//! old replacement and instantiates the new list from scratch.

use crate::address::{CellKey, ComponentId, VarName};
use crate::component::{Attribute, Shadow};
use crate::diagnostics::Diagnostic;
use crate::document::Document;
use crate::error::{ExpansionError, PathError};
use crate::graph::{Dependent, EdgeKind, Source};
use crate::ledger::DeltaKind;
use crate::path::PathResolution;
use crate::registry::ExpansionFn;
use crate::tree::{ChildSpec, ComponentSpec};
use crate::value::{Value, ValueShape};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionState {
    #[default]
    Unexpanded,
    /// The rule is running; re-entry is a cycle.
    Expanding,
    Expanded,
    /// A governing read changed; observations need re-checking.
    Stale,
}

/// Something an expansion rule looked at, with what it saw.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Observation {
    Value {
        cell: CellKey,
        value: Value,
    },
    Shape {
        cell: CellKey,
        shape: ValueShape,
    },
    Children {
        parent: ComponentId,
        ids: Vec<ComponentId>,
    },
    Replacements {
        composite: ComponentId,
        ids: Vec<ComponentId>,
    },
    Path {
        origin: ComponentId,
        path: Arc<str>,
        result: Result<PathResolution, PathError>,
    },
}

/// Expansion state owned by a composite component.
#[derive(Debug, Clone, Default)]
pub struct ExpansionRecord {
    pub state: ExpansionState,
    pub replacements: Vec<ComponentId>,
    pub(crate) observations: Vec<Observation>,
    /// Why the last expansion produced no replacements.
    pub failure: Option<ExpansionError>,
    pub rebuilds: u32,
}

/// Outcome of [`Document::ensure_expanded`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionStatus {
    /// Replacements kept their identities.
    Unchanged,
    Rebuilt,
    /// The rule failed; the composite has no replacements.
    Degraded(ExpansionError),
}

/// Output of an expansion rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    Component(ComponentSpec),
    /// A mirror of an existing component subtree.
    Shadow { source: ComponentId },
    /// A component of `component_type` whose `variable` mirrors `source`
    /// (or one entry of it).
    ShadowVariable {
        component_type: Arc<str>,
        variable: VarName,
        source: CellKey,
        entry: Option<usize>,
    },
}

/// What an expansion rule can see. Every read is recorded as an
/// observation that governs the expansion.
pub struct ExpansionContext<'a> {
    document: &'a mut Document,
    composite: ComponentId,
    observations: Vec<Observation>,
}

impl<'a> ExpansionContext<'a> {
    pub fn composite(&self) -> ComponentId {
        self.composite
    }

    pub fn attribute_literal(&self, name: &str) -> Option<Value> {
        match self.document.arena.get(self.composite)?.attributes.get(name)? {
            Attribute::Literal(value) => Some(value.clone()),
            Attribute::Component(_) => None,
        }
    }

    /// Literal attribute as text; numbers and booleans are formatted.
    pub fn attribute_text(&self, name: &str) -> Option<String> {
        match self.attribute_literal(name)? {
            Value::Null => None,
            value => Some(value.to_text()),
        }
    }

    pub fn serialized_children(&self) -> Vec<ChildSpec> {
        self.serialized_children_of(self.composite)
    }

    pub fn serialized_children_of(&self, id: ComponentId) -> Vec<ChildSpec> {
        self.document
            .arena
            .get(id)
            .map(|c| c.serialized_children.clone())
            .unwrap_or_default()
    }

    pub fn component_type(&self, id: ComponentId) -> Option<Arc<str>> {
        self.document.arena.component_type(id).cloned()
    }

    pub fn has_variable(&self, id: ComponentId, variable: &str) -> bool {
        self.document.has_variable(id, variable)
    }

    pub fn is_ancestor_or_self(&self, ancestor: ComponentId, id: ComponentId) -> bool {
        self.document.arena.is_ancestor_or_self(ancestor, id)
    }

    /// Value of one of the composite's own variables.
    pub fn value(&mut self, variable: &str) -> Result<Value, ExpansionError> {
        self.value_of(CellKey::new(self.composite, variable))
    }

    pub fn value_of(&mut self, cell: CellKey) -> Result<Value, ExpansionError> {
        let value = self.document.read_cell(&cell, EdgeKind::Expansion)?;
        self.observations.push(Observation::Value {
            cell,
            value: value.clone(),
        });
        Ok(value)
    }

    /// Shape of a cell; the expansion only reruns when kind or length change.
    pub fn shape_of(&mut self, cell: CellKey) -> Result<ValueShape, ExpansionError> {
        let shape = self.document.read_cell(&cell, EdgeKind::Expansion)?.shape();
        self.observations.push(Observation::Shape { cell, shape });
        Ok(shape)
    }

    /// Effective children of the composite itself.
    pub fn effective_children(&mut self) -> Vec<ComponentId> {
        let ids = self
            .document
            .effective_children_as(self.composite, EdgeKind::Expansion);
        self.observations.push(Observation::Children {
            parent: self.composite,
            ids: ids.clone(),
        });
        ids
    }

    /// Direct replacements of another composite, expanding it first.
    pub fn replacements_of(&mut self, composite: ComponentId) -> Result<Vec<ComponentId>, ExpansionError> {
        let ids = self.document.current_replacements(composite, EdgeKind::Expansion)?;
        self.observations.push(Observation::Replacements {
            composite,
            ids: ids.clone(),
        });
        Ok(ids)
    }

    pub fn resolve_path(&mut self, path: &str) -> Result<PathResolution, ExpansionError> {
        let result = self.document.resolve_path_from(self.composite, path);
        self.observations.push(Observation::Path {
            origin: self.composite,
            path: path.into(),
            result: result.clone(),
        });
        Ok(result?)
    }

    /// Whitespace-only raw text, which composites skip when counting items.
    pub fn is_blank(&mut self, id: ComponentId) -> bool {
        self.document.is_blank(id)
    }

    pub fn max_sequence_length(&self) -> usize {
        self.document.config.max_sequence_length
    }

    /// Source of a shadowing composite.
    pub fn shadow_source(&self) -> Option<ComponentId> {
        match self.document.arena.get(self.composite)?.shadow.as_ref()? {
            Shadow::Component { source } => Some(*source),
            Shadow::Variable { .. } => None,
        }
    }
}

/// Rule of a composite that shadows another composite: mirror each of the
/// source's replacements.
fn shadow_rule(context: &mut ExpansionContext<'_>) -> Result<Vec<Replacement>, ExpansionError> {
    let source = context
        .shadow_source()
        .ok_or(ExpansionError::NotComposite(context.composite()))?;
    Ok(context
        .replacements_of(source)?
        .into_iter()
        .map(|source| Replacement::Shadow { source })
        .collect())
}

impl Document {
    /// Make sure `composite` has up-to-date replacements.
    pub fn ensure_expanded(&mut self, composite: ComponentId) -> Result<ExpansionStatus, ExpansionError> {
        let component = self
            .arena
            .get(composite)
            .ok_or(ExpansionError::Retired(composite))?;
        let record = component
            .expansion
            .as_ref()
            .ok_or(ExpansionError::NotComposite(composite))?;
        match record.state {
            ExpansionState::Expanded => return Ok(ExpansionStatus::Unchanged),
            ExpansionState::Expanding => return Err(ExpansionError::Cycle { composite }),
            ExpansionState::Stale => {
                if self.observations_hold(composite)? {
                    return Ok(ExpansionStatus::Unchanged);
                }
            }
            ExpansionState::Unexpanded => {}
        }
        self.rebuild(composite)
    }

    /// Current replacement ids of a composite, without flattening.
    pub fn replacements(&self, composite: ComponentId) -> Vec<ComponentId> {
        self.arena
            .get(composite)
            .and_then(|c| c.expansion.as_ref())
            .map(|record| record.replacements.clone())
            .unwrap_or_default()
    }

    pub fn expansion(&self, composite: ComponentId) -> Option<&ExpansionRecord> {
        self.arena.get(composite)?.expansion.as_ref()
    }

    pub(crate) fn is_composite(&self, id: ComponentId) -> bool {
        self.arena
            .get(id)
            .is_some_and(|component| component.expansion.is_some())
    }

    fn set_expansion_state(&mut self, composite: ComponentId, state: ExpansionState) {
        if let Some(record) = self
            .arena
            .get_mut(composite)
            .and_then(|c| c.expansion.as_mut())
        {
            record.state = state;
        }
    }

    pub(crate) fn mark_expansion_stale(&mut self, composite: ComponentId) -> bool {
        match self
            .arena
            .get_mut(composite)
            .and_then(|c| c.expansion.as_mut())
        {
            Some(record) if record.state == ExpansionState::Expanded => {
                record.state = ExpansionState::Stale;
                true
            }
            _ => false,
        }
    }

    /// Re-read every observation of a stale record. On success the record is
    /// fresh again with the same replacements.
    fn observations_hold(&mut self, composite: ComponentId) -> Result<bool, ExpansionError> {
        let observations = self
            .expansion(composite)
            .map(|record| record.observations.clone())
            .unwrap_or_default();
        self.set_expansion_state(composite, ExpansionState::Expanding);
        self.expanding.push(composite);
        self.graph.begin(Dependent::Expansion(composite));

        let holds = observations
            .iter()
            .all(|observation| self.observation_holds(observation));

        let edges = self.graph.end();
        self.expanding.pop();
        if !self.arena.is_live(composite) {
            return Err(ExpansionError::Retired(composite));
        }
        if holds {
            self.graph.set_edges(Dependent::Expansion(composite), edges);
            self.set_expansion_state(composite, ExpansionState::Expanded);
            log::trace!("expansion of {composite} still holds");
        } else {
            self.set_expansion_state(composite, ExpansionState::Stale);
        }
        Ok(holds)
    }

    fn observation_holds(&mut self, observation: &Observation) -> bool {
        match observation {
            Observation::Value { cell, value } => self
                .read_cell(cell, EdgeKind::Expansion)
                .is_ok_and(|current| current == *value),
            Observation::Shape { cell, shape } => self
                .read_cell(cell, EdgeKind::Expansion)
                .is_ok_and(|current| current.shape() == *shape),
            Observation::Children { parent, ids } => {
                self.effective_children_as(*parent, EdgeKind::Expansion) == *ids
            }
            Observation::Replacements { composite, ids } => self
                .current_replacements(*composite, EdgeKind::Expansion)
                .is_ok_and(|current| current == *ids),
            Observation::Path {
                origin,
                path,
                result,
            } => self.resolve_path_from(*origin, path) == *result,
        }
    }

    fn rebuild(&mut self, composite: ComponentId) -> Result<ExpansionStatus, ExpansionError> {
        if self.expanding.len() >= self.config.max_expansion_depth {
            return Err(ExpansionError::DepthExceeded {
                limit: self.config.max_expansion_depth,
            });
        }
        let (component_type, shadow, parent) = {
            let component = self
                .arena
                .get(composite)
                .ok_or(ExpansionError::Retired(composite))?;
            (
                component.component_type.clone(),
                component.shadow.clone(),
                component.parent,
            )
        };
        let rule: ExpansionFn = match shadow {
            Some(Shadow::Component { .. }) => Rc::new(shadow_rule),
            _ => self
                .registry
                .get(&component_type)
                .and_then(|ty| ty.expansion.clone())
                .ok_or(ExpansionError::NotComposite(composite))?,
        };

        self.set_expansion_state(composite, ExpansionState::Expanding);
        self.expanding.push(composite);
        self.graph.begin(Dependent::Expansion(composite));
        let mut context = ExpansionContext {
            document: self,
            composite,
            observations: Vec::new(),
        };
        let result = rule(&mut context);
        let observations = context.observations;
        let edges = self.graph.end();
        self.expanding.pop();

        if !self.arena.is_live(composite) {
            return Err(ExpansionError::Retired(composite));
        }
        self.graph.set_edges(Dependent::Expansion(composite), edges);

        let old = self
            .arena
            .get_mut(composite)
            .and_then(|c| c.expansion.as_mut())
            .map(|record| std::mem::take(&mut record.replacements))
            .unwrap_or_default();
        for id in old {
            self.retire(id);
        }

        let outcome = result.and_then(|replacements| {
            self.instantiate_replacements(composite, parent, replacements)
        });
        let (replacements, failure) = match outcome {
            Ok(ids) => (ids, None),
            Err(err) => (Vec::new(), Some(err)),
        };
        let count = replacements.len();
        if let Some(record) = self
            .arena
            .get_mut(composite)
            .and_then(|c| c.expansion.as_mut())
        {
            record.state = ExpansionState::Expanded;
            record.replacements = replacements;
            record.observations = observations;
            record.failure = failure.clone();
            record.rebuilds += 1;
        }

        if let Some(parent) = parent {
            let stamp = self.ticks.next();
            self.graph.note_structure_change(parent, stamp);
            self.invalidate(Source::Children(parent));
        }
        let tick = self.ticks.current_tick();
        self.ledger.record(
            tick,
            DeltaKind::Expanded {
                composite,
                replacements: count,
            },
        );

        match failure {
            Some(err) => {
                log::warn!("expansion of {composite} ({component_type}) failed: {err}");
                self.diagnostics.push(Diagnostic::expansion(composite, &err));
                Ok(ExpansionStatus::Degraded(err))
            }
            None => {
                log::debug!("expanded {composite} ({component_type}) into {count} replacements");
                Ok(ExpansionStatus::Rebuilt)
            }
        }
    }

    fn instantiate_replacements(
        &mut self,
        composite: ComponentId,
        parent: Option<ComponentId>,
        replacements: Vec<Replacement>,
    ) -> Result<Vec<ComponentId>, ExpansionError> {
        let mut ids = Vec::with_capacity(replacements.len());
        for replacement in replacements {
            let created = match replacement {
                Replacement::Component(spec) => self.instantiate(&spec, parent).map_err(ExpansionError::from),
                Replacement::Shadow { source } => {
                    if self.arena.mirror_encloses(source, composite) {
                        Err(ExpansionError::SelfReference {
                            composite,
                            target: self.arena.shadow_origin(source),
                        })
                    } else {
                        self.instantiate_shadow(source, parent).map_err(ExpansionError::from)
                    }
                }
                Replacement::ShadowVariable {
                    component_type,
                    variable,
                    source,
                    entry,
                } => self
                    .instantiate_shadow_variable(&component_type, variable, source, entry, parent)
                    .map_err(ExpansionError::from),
            };
            match created {
                Ok(id) => {
                    if let Some(component) = self.arena.get_mut(id) {
                        component.replacement_of = Some(composite);
                    }
                    ids.push(id);
                }
                Err(err) => {
                    for id in ids {
                        self.retire(id);
                    }
                    return Err(err);
                }
            }
        }
        Ok(ids)
    }

    /// Direct replacements of `composite` after making sure it is expanded.
    pub(crate) fn current_replacements(
        &mut self,
        composite: ComponentId,
        kind: EdgeKind,
    ) -> Result<Vec<ComponentId>, ExpansionError> {
        self.ensure_expanded(composite)?;
        if let Some(parent) = self.arena.parent(composite) {
            self.graph.record(Source::Children(parent), kind);
        }
        Ok(self.replacements(composite))
    }

    /// Children of `parent` with every composite replaced by its
    /// (recursively flattened) replacements.
    pub fn effective_children(&mut self, parent: ComponentId) -> Vec<ComponentId> {
        self.effective_children_as(parent, EdgeKind::Value)
    }

    pub(crate) fn effective_children_as(&mut self, parent: ComponentId, kind: EdgeKind) -> Vec<ComponentId> {
        self.graph.record(Source::Children(parent), kind);
        let authored = match self.arena.get(parent) {
            Some(component) => component.children.clone(),
            None => return Vec::new(),
        };
        let mut flattened = Vec::with_capacity(authored.len());
        self.flatten_into(&authored, &mut flattened, 0);
        flattened
    }

    fn flatten_into(&mut self, ids: &[ComponentId], out: &mut Vec<ComponentId>, depth: usize) {
        for &id in ids {
            if !self.is_composite(id) {
                out.push(id);
                continue;
            }
            if depth >= self.config.max_expansion_depth {
                log::warn!("not flattening {id}: composites nested deeper than {depth}");
                continue;
            }
            match self.ensure_expanded(id) {
                Ok(_) => {
                    let replacements = self.replacements(id);
                    self.flatten_into(&replacements, out, depth + 1);
                }
                Err(err) => log::debug!("skipping replacements of {id}: {err}"),
            }
        }
    }

    /// Replacements that count for indexing: composites flattened into
    /// their own replacements, blank text dropped.
    pub(crate) fn meaningful_replacements(&mut self, composite: ComponentId) -> Result<Vec<ComponentId>, ExpansionError> {
        self.meaningful_replacements_at(composite, 0)
    }

    fn meaningful_replacements_at(
        &mut self,
        composite: ComponentId,
        depth: usize,
    ) -> Result<Vec<ComponentId>, ExpansionError> {
        if depth >= self.config.max_expansion_depth {
            return Err(ExpansionError::DepthExceeded {
                limit: self.config.max_expansion_depth,
            });
        }
        let direct = self.current_replacements(composite, EdgeKind::Value)?;
        let mut meaningful = Vec::with_capacity(direct.len());
        for id in direct {
            if self.is_composite(id) {
                match self.meaningful_replacements_at(id, depth + 1) {
                    Ok(inner) => meaningful.extend(inner),
                    Err(err) => log::debug!("skipping replacements of {id}: {err}"),
                }
            } else if !self.is_blank(id) {
                meaningful.push(id);
            }
        }
        Ok(meaningful)
    }

    /// Whitespace-only raw text.
    pub(crate) fn is_blank(&mut self, id: ComponentId) -> bool {
        let is_string = self
            .arena
            .component_type(id)
            .is_some_and(|ty| &**ty == crate::builtins::STRING);
        if !is_string {
            return false;
        }
        match self.cell_value(&CellKey::new(id, "value")) {
            Ok(Value::Text(text)) => text.trim().is_empty(),
            Ok(Value::Null) => true,
            _ => false,
        }
    }
}
