//! Render states and render diffs.
//!
//! Renderers receive owned [`RenderState`]s. [`Document::take_render_updates`]
//! walks the rendered tree and recomputes only components marked dirty by
//! invalidation since the last walk.

use crate::address::{CellKey, ComponentId, VarName};
use crate::builtins;
use crate::document::Document;
use crate::error::RenderError;
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One rendered child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChildInstruction {
    Component {
        id: ComponentId,
        component_type: Arc<str>,
    },
    /// Raw text.
    Text(String),
}

/// What a renderer needs to draw one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    pub component: ComponentId,
    pub component_type: Arc<str>,
    /// Renderer-flagged variables only.
    pub state_values: IndexMap<VarName, Value>,
    pub children: Vec<ChildInstruction>,
    pub actions: Vec<VarName>,
    /// Some renderer variable failed; draw the fallback.
    pub invalid: bool,
}

/// Change of the rendered tree since the last [`Document::take_render_updates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderUpdate {
    Added(RenderState),
    State {
        component: ComponentId,
        state_values: IndexMap<VarName, Value>,
        invalid: bool,
    },
    Children {
        component: ComponentId,
        children: Vec<ChildInstruction>,
    },
    Removed {
        component: ComponentId,
    },
}

/// Last states sent to the renderer and what changed since.
#[derive(Debug, Default)]
pub struct RenderTracker {
    dirty: FxHashSet<ComponentId>,
    last_sent: FxHashMap<ComponentId, RenderState>,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&mut self, component: ComponentId) {
        self.dirty.insert(component);
    }

    pub fn is_dirty(&self, component: ComponentId) -> bool {
        self.dirty.contains(&component)
    }

    /// Retired components are reported as removed by the next walk.
    pub fn forget(&mut self, component: ComponentId) {
        self.dirty.remove(&component);
    }

    pub fn last_sent(&self, component: ComponentId) -> Option<&RenderState> {
        self.last_sent.get(&component)
    }
}

impl Document {
    /// Current render state of one component.
    pub fn get_render_state(&mut self, component: ComponentId) -> Result<RenderState, RenderError> {
        self.flush();
        self.render_state(component)
    }

    fn render_state(&mut self, component: ComponentId) -> Result<RenderState, RenderError> {
        let component_type = self
            .arena
            .component_type(component)
            .cloned()
            .ok_or(RenderError::Retired(component))?;
        let ty = self
            .registry
            .get(&component_type)
            .ok_or(RenderError::Retired(component))?;

        let mut invalid = false;
        let mut state_values = IndexMap::new();
        for variable in ty.renderer_variables() {
            let value = match self.cell_value(&CellKey::new(component, variable.clone())) {
                Ok(value) => value,
                Err(err) => {
                    log::debug!("render of {component}: {variable} failed: {err}");
                    Value::Invalid
                }
            };
            invalid |= value.is_invalid();
            state_values.insert(variable.clone(), value);
        }

        let mut children = Vec::new();
        for child in self.effective_children(component) {
            let Some(child_type) = self.arena.component_type(child).cloned() else {
                continue;
            };
            if &*child_type == builtins::STRING {
                let text = self
                    .cell_value(&CellKey::new(child, "value"))
                    .map(|value| value.to_text())
                    .unwrap_or_default();
                children.push(ChildInstruction::Text(text));
            } else if self.registry.get(&child_type).is_some_and(|ty| ty.is_rendered()) {
                children.push(ChildInstruction::Component {
                    id: child,
                    component_type: child_type,
                });
            }
        }

        Ok(RenderState {
            component,
            component_type,
            state_values,
            children,
            actions: ty.action_names().cloned().collect(),
            invalid,
        })
    }

    /// Diffs of the rendered tree against what was last taken.
    pub fn take_render_updates(&mut self) -> Vec<RenderUpdate> {
        self.flush();
        let mut updates = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let reuse = !self.render.dirty.contains(&id) && self.render.last_sent.contains_key(&id);
            let state = if reuse {
                self.render.last_sent.get(&id).cloned()
            } else {
                match self.render_state(id) {
                    Ok(state) => Some(state),
                    Err(err) => {
                        log::debug!("skipping {id} in render walk: {err}");
                        None
                    }
                }
            };
            let Some(state) = state else { continue };

            for child in state.children.iter().rev() {
                if let ChildInstruction::Component { id: child, .. } = child {
                    stack.push(*child);
                }
            }
            if reuse {
                continue;
            }
            self.render.dirty.remove(&id);
            match self.render.last_sent.get(&id) {
                None => updates.push(RenderUpdate::Added(state.clone())),
                Some(previous) => {
                    if previous.state_values != state.state_values || previous.invalid != state.invalid {
                        updates.push(RenderUpdate::State {
                            component: id,
                            state_values: state.state_values.clone(),
                            invalid: state.invalid,
                        });
                    }
                    if previous.children != state.children {
                        updates.push(RenderUpdate::Children {
                            component: id,
                            children: state.children.clone(),
                        });
                    }
                }
            }
            self.render.last_sent.insert(id, state);
        }

        let mut removed: Vec<ComponentId> = self
            .render
            .last_sent
            .keys()
            .filter(|id| !visited.contains(id))
            .copied()
            .collect();
        removed.sort();
        for component in removed {
            self.render.last_sent.remove(&component);
            self.render.dirty.remove(&component);
            updates.push(RenderUpdate::Removed { component });
        }
        log::trace!("render walk produced {} updates", updates.len());
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forget_keeps_last_sent_for_removal() {
        let mut tracker = RenderTracker::new();
        tracker.mark_dirty(ComponentId(4));
        assert!(tracker.is_dirty(ComponentId(4)));
        tracker.forget(ComponentId(4));
        assert!(!tracker.is_dirty(ComponentId(4)));
        assert!(tracker.last_sent(ComponentId(4)).is_none());
    }
}
