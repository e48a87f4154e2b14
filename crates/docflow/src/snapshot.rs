//! Whole-document state dumps.
//!
//! Note: the JSON helpers require the `json` feature.

use crate::address::{CellKey, ComponentId, VarName};
use crate::document::Document;
use crate::expand::ExpansionState;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ulid::Ulid;

/// State of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStateSnapshot {
    pub component_type: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ComponentId>,
    pub state: IndexMap<VarName, Value>,
    /// Essential values, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<IndexMap<VarName, Value>>,
}

/// Serializable state of a whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Version for migration support.
    pub version: u32,
    pub session: Ulid,
    pub tick: u64,
    pub components: IndexMap<ComponentId, ComponentStateSnapshot>,
}

impl DocumentSnapshot {
    pub const VERSION: u32 = 1;

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Document {
    /// Every state variable of every live component, in id order.
    pub fn return_all_state_variables(
        &mut self,
        force_expand: bool,
        include_essential: bool,
    ) -> IndexMap<ComponentId, ComponentStateSnapshot> {
        self.flush();
        if force_expand {
            self.expand_everything();
        }

        let mut components = IndexMap::new();
        for id in self.arena.ids() {
            let Some(ty) = self.component_type_of(id) else {
                continue;
            };
            let mut state = IndexMap::new();
            for variable in ty.variable_names() {
                let value = self
                    .cell_value(&CellKey::new(id, variable.clone()))
                    .unwrap_or(Value::Invalid);
                state.insert(variable.clone(), value);
            }
            let Some(component) = self.arena.get(id) else {
                continue;
            };
            let essential = include_essential.then(|| {
                component
                    .essential
                    .iter()
                    .map(|(variable, essential)| {
                        let value = match &essential.value {
                            Some(value) if essential.entries.is_empty() => value.clone(),
                            _ if !essential.entries.is_empty() => {
                                let mut entries: Vec<_> = essential.entries.iter().collect();
                                entries.sort_by_key(|(index, _)| **index);
                                Value::array(entries.into_iter().map(|(_, value)| value.clone()))
                            }
                            _ => Value::Null,
                        };
                        (variable.clone(), value)
                    })
                    .collect()
            });
            components.insert(
                id,
                ComponentStateSnapshot {
                    component_type: component.component_type.clone(),
                    name: component.name.clone(),
                    parent: component.parent,
                    state,
                    essential,
                },
            );
        }
        components
    }

    pub fn snapshot(&mut self, force_expand: bool, include_essential: bool) -> DocumentSnapshot {
        let components = self.return_all_state_variables(force_expand, include_essential);
        DocumentSnapshot {
            version: DocumentSnapshot::VERSION,
            session: self.session,
            tick: self.ticks.current_tick(),
            components,
        }
    }

    /// Expand composites until none is left unexpanded or stale.
    fn expand_everything(&mut self) {
        for _ in 0..self.config.max_expansion_depth {
            let pending: Vec<ComponentId> = self
                .arena
                .iter()
                .filter(|component| {
                    component.expansion.as_ref().is_some_and(|record| {
                        matches!(
                            record.state,
                            ExpansionState::Unexpanded | ExpansionState::Stale
                        )
                    })
                })
                .map(|component| component.id)
                .collect();
            if pending.is_empty() {
                return;
            }
            for composite in pending {
                if let Err(err) = self.ensure_expanded(composite) {
                    log::debug!("forced expansion of {composite} failed: {err}");
                }
            }
        }
        log::warn!(
            "composites still unexpanded after {} passes",
            self.config.max_expansion_depth
        );
    }
}
