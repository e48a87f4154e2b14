//! Diagnostics: recoverable failures and "why did X change?" queries.

use crate::address::{CellKey, ComponentId};
use crate::error::{ActionError, DefinitionError, ExpansionError, PathError};
use crate::graph::{Dependent, DependencyGraph, Source};
use crate::tick::TickSeq;
use crate::value::Value;
use rustc_hash::FxHashSet;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    DefinitionCycle,
    /// A definition failed; the cell holds `Invalid`.
    NumericOrDomain,
    ExpansionFailure,
    UnresolvedPath,
    ActionRejected,
}

/// A recoverable failure surfaced to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub cell: Option<CellKey>,
    pub component: Option<ComponentId>,
    pub message: String,
}

impl Diagnostic {
    pub fn cycle(cell: CellKey) -> Self {
        Self {
            kind: DiagnosticKind::DefinitionCycle,
            component: Some(cell.component),
            message: format!("definition cycle through {cell}"),
            cell: Some(cell),
        }
    }

    pub fn numeric(cell: CellKey, err: &DefinitionError) -> Self {
        Self {
            kind: DiagnosticKind::NumericOrDomain,
            component: Some(cell.component),
            message: err.to_string(),
            cell: Some(cell),
        }
    }

    pub fn expansion(composite: ComponentId, err: &ExpansionError) -> Self {
        Self {
            kind: DiagnosticKind::ExpansionFailure,
            cell: None,
            component: Some(composite),
            message: err.to_string(),
        }
    }

    pub fn unresolved(origin: ComponentId, err: &PathError) -> Self {
        Self {
            kind: DiagnosticKind::UnresolvedPath,
            cell: None,
            component: Some(origin),
            message: err.to_string(),
        }
    }

    pub fn rejected(component: ComponentId, err: &ActionError) -> Self {
        Self {
            kind: DiagnosticKind::ActionRejected,
            cell: None,
            component: Some(component),
            message: err.to_string(),
        }
    }
}

/// A recorded value change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub tick: u64,
    pub cell: CellKey,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Diagnostics of one document.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Track every value change, not only failures.
    pub enabled: bool,
    entries: Vec<Diagnostic>,
    changes: Vec<ChangeEvent>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        // A stale failure re-evaluated to the same error reports once.
        if self.entries.last() != Some(&diagnostic) {
            self.entries.push(diagnostic);
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Hand the accumulated diagnostics to the host.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }

    pub fn record_change(
        &mut self,
        tick: u64,
        cell: CellKey,
        old_value: Option<Value>,
        new_value: Value,
    ) {
        if self.enabled {
            self.changes.push(ChangeEvent {
                tick,
                cell,
                old_value,
                new_value,
            });
        }
    }

    pub fn changes(&self) -> &[ChangeEvent] {
        &self.changes
    }

    pub fn changes_at_tick(&self, tick: u64) -> Vec<&ChangeEvent> {
        self.changes.iter().filter(|e| e.tick == tick).collect()
    }
}

/// Why a cell changed during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeReason {
    pub cell: CellKey,
    pub changed_at: TickSeq,
    /// Inputs that changed during the same tick.
    pub triggered_by: Vec<CellKey>,
}

pub fn why_did_change(graph: &DependencyGraph, cell: &CellKey, tick: u64) -> Option<ChangeReason> {
    let entry = graph.get(cell)?;
    if entry.changed_at.tick != tick {
        return None;
    }
    let triggered_by = graph
        .edges_of(&Dependent::Cell(cell.clone()))
        .iter()
        .filter_map(|(source, _)| match source {
            Source::Cell(input) => Some(input),
            Source::Children(_) => None,
        })
        .filter(|input| {
            graph
                .get(input)
                .is_some_and(|e| e.changed_at.tick == tick)
        })
        .cloned()
        .collect();
    Some(ChangeReason {
        cell: cell.clone(),
        changed_at: entry.changed_at,
        triggered_by,
    })
}

/// Every reason reachable from `cell` through inputs that changed in `tick`.
pub fn change_chain(graph: &DependencyGraph, cell: &CellKey, tick: u64) -> Vec<ChangeReason> {
    let mut chain = Vec::new();
    let mut visited = FxHashSet::default();
    let mut queue = vec![cell.clone()];

    while let Some(current) = queue.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(reason) = why_did_change(graph, &current, tick) {
            queue.extend(reason.triggered_by.iter().cloned());
            chain.push(reason);
        }
    }

    chain
}
