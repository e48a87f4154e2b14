//! Inverse definitions: turning a desired cell value into essential writes.

use super::Source;
use crate::address::{CellKey, ComponentId, VarName};
use crate::definition::{DependencyTarget, InverseInstruction, InverseRequest};
use crate::document::Document;
use crate::error::{ActionError, InverseError};
use crate::ledger::DeltaKind;
use crate::value::{Desired, Value};

/// One essential value to write once the whole inversion succeeded.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EssentialWrite {
    pub component: ComponentId,
    pub variable: VarName,
    pub desired: Desired,
}

impl Document {
    /// Collect the essential writes that make `key` take `desired`.
    /// Nothing is written here; a failure anywhere rejects the whole set.
    pub(crate) fn invert(
        &mut self,
        key: &CellKey,
        desired: Desired,
        writes: &mut Vec<EssentialWrite>,
        depth: usize,
    ) -> Result<(), ActionError> {
        if depth > self.config.max_resolve_depth {
            return Err(ActionError::DepthExceeded {
                limit: self.config.max_resolve_depth,
            });
        }
        // The inverse runs over the dependency values of a fresh forward pass.
        self.cell_value(key)?;
        let Some(entry) = self.graph.get(key) else {
            return Err(ActionError::InversionUnsupported { cell: key.clone() });
        };
        if let Some(mirror) = entry.mirror.clone() {
            let desired = match (mirror.entry, desired) {
                (Some(index), Desired::Value(value)) => Desired::entry(index, value),
                (Some(_), Desired::Entries(_)) => {
                    return Err(ActionError::InvalidDesired {
                        cell: key.clone(),
                        reason: "per-key update of a single entry".into(),
                    });
                }
                (None, desired) => desired,
            };
            return self.invert(&mirror.target, desired, writes, depth + 1);
        }
        let values = entry.values.clone();
        let targets = entry.targets.clone();
        let current = entry.value.clone();

        let ty = self
            .arena
            .component_type(key.component)
            .and_then(|ty| self.registry.get(ty))
            .ok_or(ActionError::Retired(key.component))?;
        let inverse = ty
            .variable(&key.variable)
            .and_then(|variable| variable.inverse.clone())
            .ok_or_else(|| ActionError::InversionUnsupported { cell: key.clone() })?;

        let request = InverseRequest {
            desired: &desired,
            values: &values,
            current: &current,
        };
        let instructions = inverse(&request).map_err(|err| match err {
            InverseError::Unsupported => ActionError::InversionUnsupported { cell: key.clone() },
            InverseError::InvalidDesired(reason) => ActionError::InvalidDesired {
                cell: key.clone(),
                reason,
            },
        })?;

        for instruction in instructions {
            match instruction {
                InverseInstruction::SetEssential { variable, desired } => {
                    let variable = variable.unwrap_or_else(|| key.variable.clone());
                    let target = CellKey::new(key.component, variable.clone());
                    let Some(declared) = ty.variable(&variable).filter(|v| v.is_essential()) else {
                        return Err(ActionError::NotEssential { cell: target });
                    };
                    let desired = if declared.is_array() {
                        match desired.to_entries() {
                            Some(entries) => Desired::Entries(entries),
                            None => {
                                return Err(ActionError::InvalidDesired {
                                    cell: target,
                                    reason: "array needs per-key values".into(),
                                });
                            }
                        }
                    } else {
                        match desired {
                            Desired::Value(value) => Desired::Value(value),
                            Desired::Entries(_) => {
                                return Err(ActionError::InvalidDesired {
                                    cell: target,
                                    reason: "per-key values for a scalar".into(),
                                });
                            }
                        }
                    };
                    writes.push(EssentialWrite {
                        component: key.component,
                        variable,
                        desired,
                    });
                }
                InverseInstruction::SetDependency {
                    dependency,
                    child,
                    variable,
                    desired,
                } => {
                    let upstream = match targets.get(&dependency) {
                        Some(DependencyTarget::Cell(upstream)) => upstream.clone(),
                        Some(DependencyTarget::Children { ids, variables }) => {
                            let id = ids.get(child.unwrap_or(0)).copied();
                            let variable = variable.or_else(|| variables.first().cloned());
                            match (id, variable) {
                                (Some(id), Some(variable)) => CellKey::new(id, variable),
                                _ => {
                                    return Err(ActionError::InversionUnsupported {
                                        cell: key.clone(),
                                    });
                                }
                            }
                        }
                        Some(DependencyTarget::Fixed) | None => {
                            return Err(ActionError::InversionUnsupported { cell: key.clone() });
                        }
                    };
                    self.invert(&upstream, desired, writes, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    /// Write collected essential values and invalidate their dependents.
    pub(crate) fn apply_writes(&mut self, writes: Vec<EssentialWrite>) -> Vec<CellKey> {
        if let Some(owner) = self.graph.evaluating() {
            panic!("essential values written while {owner:?} was being evaluated");
        }
        let mut written = Vec::with_capacity(writes.len());
        for write in writes {
            let Some(component) = self.arena.get_mut(write.component) else {
                log::debug!("dropping write to retired {}", write.component);
                continue;
            };
            let essential = component.essential.entry(write.variable.clone()).or_default();
            let recorded = match write.desired {
                Desired::Value(value) => {
                    essential.value = Some(value.clone());
                    value
                }
                Desired::Entries(entries) => {
                    let recorded = Value::array(entries.values().cloned().collect::<Vec<_>>());
                    essential.entries.extend(entries);
                    recorded
                }
            };
            let key = CellKey::new(write.component, write.variable);
            self.graph.force(&key);
            self.invalidate(Source::Cell(key.clone()));
            let tick = self.ticks.current_tick();
            self.ledger.record(
                tick,
                DeltaKind::EssentialSet {
                    cell: key.clone(),
                    value: recorded,
                },
            );
            written.push(key);
        }
        written
    }
}
