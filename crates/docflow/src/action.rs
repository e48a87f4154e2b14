//! Action dispatch.
//!
//! An action is either a direct update of a cell ([`Document::dispatch`])
//! or a named action of a component ([`Document::request_action`]) whose
//! handler returns [`ActionEffect`]s. Either way the desired values are
//! inverted into essential writes that are applied all at once.
//!
//! Skippable actions arrive in bursts (drag events). The first action of a
//! burst applies immediately; later ones replace a single deferred slot
//! that is applied before anything observes the document, before any
//! non-skippable action and before a skippable action on another target.

use crate::address::{CellKey, ComponentId, VarName};
use crate::diagnostics::Diagnostic;
use crate::document::Document;
use crate::error::ActionError;
use crate::graph::EssentialWrite;
use crate::ledger::DeltaKind;
use crate::value::{Desired, Value};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionFlags {
    /// Live update that is not committed until a non-transient action on
    /// the same component.
    pub transient: bool,
    /// May be coalesced with later actions on the same target.
    pub skippable: bool,
}

impl ActionFlags {
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// Held in the deferred slot of a skippable burst. Not dropped: unless a
    /// later request of the same burst replaces it, it applies before the
    /// document is next observed or any other action runs. The last request
    /// of a burst always applies even though it reports `Deferred`.
    Deferred,
}

impl ActionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied)
    }
}

/// Named action requested by a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub component: ComponentId,
    pub action: VarName,
    #[serde(default)]
    pub args: IndexMap<String, Value>,
    #[serde(default)]
    pub transient: bool,
    #[serde(default)]
    pub skippable: bool,
}

impl ActionRequest {
    pub fn new(component: ComponentId, action: &str) -> Self {
        Self {
            component,
            action: action.into(),
            args: IndexMap::new(),
            transient: false,
            skippable: false,
        }
    }

    pub fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }

    fn flags(&self) -> ActionFlags {
        ActionFlags {
            transient: self.transient,
            skippable: self.skippable,
        }
    }
}

/// What an action handler asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEffect {
    /// Make a variable of the acting component take `desired`.
    Update { variable: VarName, desired: Desired },
    /// Run another action of the same component later.
    Schedule {
        action: VarName,
        args: IndexMap<String, Value>,
        delay: u64,
    },
}

impl ActionEffect {
    pub fn update(variable: &str, desired: impl Into<Desired>) -> Self {
        ActionEffect::Update {
            variable: variable.into(),
            desired: desired.into(),
        }
    }

    pub fn schedule(action: &str, delay: u64) -> Self {
        ActionEffect::Schedule {
            action: action.into(),
            args: IndexMap::new(),
            delay,
        }
    }
}

/// Handed to action handlers.
pub struct ActionContext<'a> {
    document: &'a mut Document,
    component: ComponentId,
    action: VarName,
    args: &'a IndexMap<String, Value>,
}

impl<'a> ActionContext<'a> {
    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn value(&mut self, variable: &str) -> Result<Value, ActionError> {
        Ok(self
            .document
            .cell_value(&CellKey::new(self.component, variable))?)
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    pub fn require_arg(&self, name: &str) -> Result<&Value, ActionError> {
        self.args.get(name).ok_or_else(|| ActionError::MissingArgument {
            action: self.action.clone(),
            argument: name.to_string(),
        })
    }
}

/// What an action was aimed at; bursts coalesce per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ActionTarget {
    Cell(CellKey),
    Action {
        component: ComponentId,
        action: VarName,
    },
}

impl ActionTarget {
    pub fn component(&self) -> ComponentId {
        match self {
            ActionTarget::Cell(key) => key.component,
            ActionTarget::Action { component, .. } => *component,
        }
    }

    fn label(&self) -> VarName {
        match self {
            ActionTarget::Cell(key) => key.variable.clone(),
            ActionTarget::Action { action, .. } => action.clone(),
        }
    }
}

/// A non-transient action, in application order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRecord {
    pub target: ActionTarget,
    pub tick: u64,
    /// Earlier transient actions on the same component were confirmed.
    pub confirmed_transient: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStats {
    pub applied: usize,
    /// Deferred actions replaced by a newer one before being applied.
    pub coalesced: usize,
    pub rejected: usize,
}

/// Essential writes plus follow-up tasks of one action.
type Collected = (Vec<EssentialWrite>, Vec<(VarName, IndexMap<String, Value>, u64)>);

#[derive(Debug, Clone)]
enum Payload {
    Update(Desired),
    Request(ActionRequest),
}

#[derive(Debug, Clone)]
struct Pending {
    target: ActionTarget,
    payload: Payload,
    flags: ActionFlags,
}

#[derive(Debug, Default)]
pub struct ActionQueue {
    deferred: Option<Pending>,
    /// Target of the skippable burst in progress.
    burst: Option<ActionTarget>,
    transient: FxHashSet<ComponentId>,
    commits: Vec<CommitRecord>,
    stats: ActionStats,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn stats(&self) -> ActionStats {
        self.stats
    }

    pub(crate) fn forget_component(&mut self, component: ComponentId) {
        if self
            .deferred
            .as_ref()
            .is_some_and(|pending| pending.target.component() == component)
        {
            self.deferred = None;
        }
        if self
            .burst
            .as_ref()
            .is_some_and(|target| target.component() == component)
        {
            self.burst = None;
        }
        self.transient.remove(&component);
    }
}

impl Document {
    /// Make `target` take `desired` by inverting through its definitions.
    pub fn dispatch(
        &mut self,
        target: CellKey,
        desired: impl Into<Desired>,
        flags: ActionFlags,
    ) -> Result<ActionOutcome, ActionError> {
        if !self.arena.is_live(target.component) {
            return Err(ActionError::Retired(target.component));
        }
        self.submit(Pending {
            target: ActionTarget::Cell(target),
            payload: Payload::Update(desired.into()),
            flags,
        })
    }

    /// Run a named action of a component.
    pub fn request_action(&mut self, request: ActionRequest) -> Result<ActionOutcome, ActionError> {
        let ty = self
            .arena
            .component_type(request.component)
            .and_then(|ty| self.registry.get(ty))
            .ok_or(ActionError::Retired(request.component))?;
        if !ty.actions.contains_key(&request.action) {
            return Err(ActionError::UnknownAction {
                component: request.component,
                action: request.action,
            });
        }
        self.submit(Pending {
            target: ActionTarget::Action {
                component: request.component,
                action: request.action.clone(),
            },
            flags: request.flags(),
            payload: Payload::Request(request),
        })
    }

    /// Apply the deferred action of a skippable burst, if any.
    pub fn flush(&mut self) {
        if let Some(pending) = self.actions.deferred.take() {
            log::trace!("flushing deferred action on {:?}", pending.target);
            if let Err(err) = self.apply_pending(pending) {
                log::warn!("deferred action rejected: {err}");
            }
        }
    }

    /// Commit records since the last call.
    pub fn take_commits(&mut self) -> Vec<CommitRecord> {
        std::mem::take(&mut self.actions.commits)
    }

    pub fn action_stats(&self) -> ActionStats {
        self.actions.stats
    }

    /// Advance the follow-up clock one tick and run every task now due.
    pub fn tick(&mut self) -> usize {
        self.flush();
        let due = self.scheduler.advance();
        let count = due.len();
        for task in due {
            let request = ActionRequest {
                component: task.component,
                action: task.action,
                args: task.args,
                transient: false,
                skippable: false,
            };
            if let Err(err) = self.request_action(request) {
                log::warn!("scheduled action on {} rejected: {err}", task.component);
            }
        }
        count
    }

    fn submit(&mut self, pending: Pending) -> Result<ActionOutcome, ActionError> {
        if pending.flags.skippable && self.config.coalesce_skippable {
            if self.actions.burst.as_ref() == Some(&pending.target) {
                if let Some(replaced) = self.actions.deferred.replace(pending) {
                    self.actions.stats.coalesced += 1;
                    log::trace!("coalesced skippable action on {:?}", replaced.target);
                    let tick = self.ticks.current_tick();
                    self.ledger.record(
                        tick,
                        DeltaKind::ActionCoalesced {
                            component: replaced.target.component(),
                            action: replaced.target.label(),
                        },
                    );
                }
                return Ok(ActionOutcome::Deferred);
            }
            self.flush();
            self.actions.burst = Some(pending.target.clone());
        } else {
            self.flush();
            self.actions.burst = None;
        }
        self.apply_pending(pending).map(|()| ActionOutcome::Applied)
    }

    fn apply_pending(&mut self, pending: Pending) -> Result<(), ActionError> {
        self.ticks.next_tick();
        let component = pending.target.component();
        let result = match &pending.payload {
            Payload::Update(desired) => {
                let ActionTarget::Cell(key) = &pending.target else {
                    return Err(ActionError::Retired(component));
                };
                let mut writes = Vec::new();
                self.invert(key, desired.clone(), &mut writes, 0)
                    .map(|()| (writes, Vec::new()))
            }
            Payload::Request(request) => self.run_request(request),
        };
        let (writes, schedules) = match result {
            Ok(collected) => collected,
            Err(err) => {
                self.actions.stats.rejected += 1;
                log::debug!("action on {:?} rejected: {err}", pending.target);
                self.diagnostics.push(Diagnostic::rejected(component, &err));
                return Err(err);
            }
        };

        let written = self.apply_writes(writes);
        for (action, args, delay) in schedules {
            self.scheduler.schedule(component, action, args, delay);
        }
        self.actions.stats.applied += 1;
        log::debug!(
            "applied {:?} ({} essential writes)",
            pending.target,
            written.len()
        );

        let tick = self.ticks.current_tick();
        let label = pending.target.label();
        self.ledger.record(
            tick,
            DeltaKind::ActionApplied {
                component,
                action: label.clone(),
            },
        );
        if pending.flags.transient {
            self.actions.transient.insert(component);
        } else {
            let confirmed_transient = self.actions.transient.remove(&component);
            if confirmed_transient {
                self.ledger.record(
                    tick,
                    DeltaKind::Committed {
                        component,
                        action: label,
                    },
                );
            }
            self.actions.commits.push(CommitRecord {
                target: pending.target,
                tick,
                confirmed_transient,
            });
        }
        Ok(())
    }

    /// Run an action handler and invert its updates. Nothing is written.
    fn run_request(&mut self, request: &ActionRequest) -> Result<Collected, ActionError> {
        let handler = self
            .arena
            .component_type(request.component)
            .and_then(|ty| self.registry.get(ty))
            .ok_or(ActionError::Retired(request.component))?
            .actions
            .get(&request.action)
            .cloned()
            .ok_or_else(|| ActionError::UnknownAction {
                component: request.component,
                action: request.action.clone(),
            })?;

        let mut context = ActionContext {
            document: self,
            component: request.component,
            action: request.action.clone(),
            args: &request.args,
        };
        let effects = handler(&mut context)?;

        let mut writes = Vec::new();
        let mut schedules = Vec::new();
        for effect in effects {
            match effect {
                ActionEffect::Update { variable, desired } => {
                    let key = CellKey::new(request.component, variable);
                    self.invert(&key, desired, &mut writes, 0)?;
                }
                ActionEffect::Schedule {
                    action,
                    args,
                    delay,
                } => schedules.push((action, args, delay)),
            }
        }
        Ok((writes, schedules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_builders() {
        let flags = ActionFlags::default().transient().skippable();
        assert!(flags.transient && flags.skippable);
        assert!(ActionOutcome::Applied.applied());
        assert!(!ActionOutcome::Deferred.applied());
    }

    #[test]
    fn request_builder_collects_args() {
        let request = ActionRequest::new(ComponentId(2), "movePoint")
            .arg("x", 1.5)
            .skippable();
        assert_eq!(request.args.get("x"), Some(&Value::Number(1.5)));
        assert!(request.flags().skippable);
        assert!(!request.flags().transient);
    }
}
