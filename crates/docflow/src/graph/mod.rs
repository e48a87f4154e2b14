//! Dependency graph of value cells.
//!
//! Cells are cached per [`CellKey`]. Each evaluation records the sources it
//! read (cells, or the effective child list of a component) as edges of the
//! evaluating cell or expansion; the reverse map is what staleness walks.
//! Edges are replaced wholesale on every recomputation, so a cell whose
//! dependencies change between evaluations stops being invalidated by the
//! ones it no longer reads.

mod evaluate;
mod inverse;
mod query;

pub use query::DependencyQuery;

pub(crate) use evaluate::Evaluated;
pub(crate) use inverse::EssentialWrite;

use crate::address::{CellKey, ComponentId, VarName};
use crate::definition::{DependencyTarget, DependencyValues};
use crate::error::ValueError;
use crate::tick::TickSeq;
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::rc::Rc;

/// Something a cell or expansion read.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Source {
    Cell(CellKey),
    /// The flattened child list of a component.
    Children(ComponentId),
}

/// Something that records reads.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Dependent {
    Cell(CellKey),
    Expansion(ComponentId),
}

/// Tag of a recorded edge.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeKind {
    Value,
    /// Read of an array size ahead of the entries.
    ArraySize,
    /// Read that governs a composite expansion.
    Expansion,
}

pub type Edges = SmallVec<[(Source, EdgeKind); 8]>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellState {
    #[default]
    Unresolved,
    Fresh,
    Stale,
    Resolving,
    /// Not retried until an input changes.
    Failed(ValueError),
}

/// Identity relation of a mirroring cell.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Mirror {
    pub target: CellKey,
    pub entry: Option<usize>,
}

/// Cached state of one cell.
#[derive(Debug, Clone, Default)]
pub struct CellEntry {
    pub state: CellState,
    pub value: Value,
    /// Auxiliary outputs of the last evaluation.
    pub additional: IndexMap<VarName, Value>,
    /// When the value last changed.
    pub changed_at: TickSeq,
    /// When the value was last computed or confirmed.
    pub verified_at: TickSeq,
    /// Definition runs so far.
    pub evaluations: u64,
    pub(crate) values: Rc<DependencyValues>,
    pub(crate) targets: Rc<IndexMap<VarName, DependencyTarget>>,
    pub(crate) mirror: Option<Mirror>,
    /// The cell's own essential value changed since it was verified.
    pub(crate) forced: bool,
}

pub(crate) struct Frame {
    owner: Dependent,
    edges: Edges,
}

/// Cells, edges and the reverse edges used for invalidation.
#[derive(Default)]
pub struct DependencyGraph {
    cells: FxHashMap<CellKey, CellEntry>,
    edges: FxHashMap<Dependent, Edges>,
    dependents: FxHashMap<Source, SmallVec<[Dependent; 4]>>,
    structure_changed: FxHashMap<ComponentId, TickSeq>,
    pub(crate) frames: Vec<Frame>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CellKey) -> Option<&CellEntry> {
        self.cells.get(key)
    }

    pub fn state(&self, key: &CellKey) -> CellState {
        self.cells
            .get(key)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    pub fn is_resolving(&self, key: &CellKey) -> bool {
        matches!(
            self.cells.get(key).map(|entry| &entry.state),
            Some(CellState::Resolving)
        )
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellKey, &CellEntry)> + '_ {
        self.cells.iter()
    }

    /// Edges recorded by the last evaluation of `owner`.
    pub fn edges_of(&self, owner: &Dependent) -> &[(Source, EdgeKind)] {
        self.edges.get(owner).map(|e| e.as_slice()).unwrap_or(&[])
    }

    pub fn dependents_of(&self, source: &Source) -> SmallVec<[Dependent; 4]> {
        self.dependents.get(source).cloned().unwrap_or_default()
    }

    pub fn structure_changed_at(&self, parent: ComponentId) -> TickSeq {
        self.structure_changed
            .get(&parent)
            .copied()
            .unwrap_or(TickSeq::ZERO)
    }

    pub(crate) fn note_structure_change(&mut self, parent: ComponentId, at: TickSeq) {
        self.structure_changed.insert(parent, at);
    }

    pub(crate) fn cached(&self, key: &CellKey) -> Value {
        self.cells
            .get(key)
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    /// Record a read into the innermost evaluation.
    pub(crate) fn record(&mut self, source: Source, kind: EdgeKind) {
        if let Some(frame) = self.frames.last_mut() {
            if !frame.edges.iter().any(|(s, _)| *s == source) {
                frame.edges.push((source, kind));
            }
        }
    }

    pub(crate) fn begin(&mut self, owner: Dependent) {
        if let Dependent::Cell(key) = &owner {
            self.cells.entry(key.clone()).or_default().state = CellState::Resolving;
        }
        self.frames.push(Frame {
            owner,
            edges: Edges::new(),
        });
    }

    /// The innermost cell or expansion currently recording reads.
    pub(crate) fn evaluating(&self) -> Option<&Dependent> {
        self.frames.last().map(|frame| &frame.owner)
    }

    pub(crate) fn end(&mut self) -> Edges {
        self.frames.pop().map(|frame| frame.edges).unwrap_or_default()
    }

    /// Forget reads recorded so far by the innermost evaluation.
    pub(crate) fn clear_frame(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.edges.clear();
        }
    }

    /// Replace the edges of `owner`, keeping the reverse map in sync.
    pub(crate) fn set_edges(&mut self, owner: Dependent, edges: Edges) {
        if let Some(old) = self.edges.remove(&owner) {
            for (source, _) in old.iter() {
                if edges.iter().any(|(s, _)| s == source) {
                    continue;
                }
                if let Some(dependents) = self.dependents.get_mut(source) {
                    dependents.retain(|d| *d != owner);
                    if dependents.is_empty() {
                        self.dependents.remove(source);
                    }
                }
            }
        }
        for (source, _) in edges.iter() {
            let dependents = self.dependents.entry(source.clone()).or_default();
            if !dependents.contains(&owner) {
                dependents.push(owner.clone());
            }
        }
        if !edges.is_empty() {
            self.edges.insert(owner, edges);
        }
    }

    pub(crate) fn remove_owner(&mut self, owner: &Dependent) {
        self.set_edges(owner.clone(), Edges::new());
    }

    /// Fresh or failed cells become stale; returns whether it transitioned.
    pub(crate) fn mark_stale(&mut self, key: &CellKey) -> bool {
        match self.cells.get_mut(key) {
            Some(entry) if matches!(entry.state, CellState::Fresh | CellState::Failed(_)) => {
                entry.state = CellState::Stale;
                true
            }
            _ => false,
        }
    }

    /// The cell's own essential value changed.
    pub(crate) fn force(&mut self, key: &CellKey) {
        if let Some(entry) = self.cells.get_mut(key) {
            entry.forced = true;
            if matches!(entry.state, CellState::Fresh | CellState::Failed(_)) {
                entry.state = CellState::Stale;
            }
        }
    }

    pub(crate) fn mark_verified(&mut self, key: &CellKey, at: TickSeq) -> Value {
        match self.cells.get_mut(key) {
            Some(entry) => {
                entry.state = CellState::Fresh;
                entry.verified_at = at;
                entry.value.clone()
            }
            None => Value::Null,
        }
    }

    /// Store a computed value; `changed` is the stamp used if it differs.
    pub(crate) fn store(
        &mut self,
        key: &CellKey,
        evaluated: Evaluated,
        changed: TickSeq,
        verified: TickSeq,
    ) -> Value {
        let entry = self.cells.entry(key.clone()).or_default();
        if entry.evaluations == 0 || entry.value != evaluated.value {
            entry.changed_at = changed;
        }
        entry.state = CellState::Fresh;
        entry.value = evaluated.value;
        entry.additional = evaluated.additional;
        entry.values = evaluated.values;
        entry.targets = evaluated.targets;
        entry.mirror = evaluated.mirror;
        entry.verified_at = verified;
        entry.forced = false;
        entry.evaluations += 1;
        entry.value.clone()
    }

    pub(crate) fn fail(&mut self, key: &CellKey, error: ValueError, changed: TickSeq) {
        let entry = self.cells.entry(key.clone()).or_default();
        entry.state = CellState::Failed(error);
        entry.value = Value::Invalid;
        entry.changed_at = changed;
        entry.verified_at = changed;
        entry.forced = false;
    }

    /// Drop an entry whose component went away mid-evaluation.
    pub(crate) fn discard(&mut self, key: &CellKey) {
        self.cells.remove(key);
        self.remove_owner(&Dependent::Cell(key.clone()));
    }

    pub(crate) fn keys_of(&self, component: ComponentId) -> Vec<CellKey> {
        self.cells
            .keys()
            .filter(|key| key.component == component)
            .cloned()
            .collect()
    }

    /// Remove every cell and edge owned by a retired component.
    pub(crate) fn remove_component(&mut self, component: ComponentId) {
        for key in self.keys_of(component) {
            self.cells.remove(&key);
            self.remove_owner(&Dependent::Cell(key.clone()));
            self.dependents.remove(&Source::Cell(key));
        }
        self.remove_owner(&Dependent::Expansion(component));
        self.dependents.remove(&Source::Children(component));
        self.structure_changed.remove(&component);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(component: u32, variable: &str) -> CellKey {
        CellKey::new(ComponentId(component), variable)
    }

    #[test]
    fn frames_nest_by_owner() {
        let mut graph = DependencyGraph::new();
        assert_eq!(graph.evaluating(), None);
        graph.begin(Dependent::Expansion(ComponentId(3)));
        graph.begin(Dependent::Cell(key(0, "a")));
        graph.record(Source::Cell(key(0, "b")), EdgeKind::Value);
        assert_eq!(graph.evaluating(), Some(&Dependent::Cell(key(0, "a"))));

        assert_eq!(graph.end().len(), 1);
        assert_eq!(graph.evaluating(), Some(&Dependent::Expansion(ComponentId(3))));
        assert!(graph.end().is_empty());
        assert_eq!(graph.evaluating(), None);
    }

    #[test]
    fn set_edges_diffs_reverse_map() {
        let mut graph = DependencyGraph::new();
        let owner = Dependent::Cell(key(0, "b"));
        let mut edges = Edges::new();
        edges.push((Source::Cell(key(0, "a")), EdgeKind::Value));
        edges.push((Source::Children(ComponentId(1)), EdgeKind::Value));
        graph.set_edges(owner.clone(), edges);
        assert_eq!(graph.dependents_of(&Source::Cell(key(0, "a"))).len(), 1);

        let mut edges = Edges::new();
        edges.push((Source::Children(ComponentId(1)), EdgeKind::Value));
        graph.set_edges(owner.clone(), edges);
        assert!(graph.dependents_of(&Source::Cell(key(0, "a"))).is_empty());
        assert_eq!(
            graph.dependents_of(&Source::Children(ComponentId(1))).as_slice(),
            &[owner]
        );
    }

    #[test]
    fn only_fresh_or_failed_cells_go_stale() {
        let mut graph = DependencyGraph::new();
        let k = key(0, "a");
        assert!(!graph.mark_stale(&k));
        graph.begin(Dependent::Cell(k.clone()));
        assert!(graph.is_resolving(&k));
        assert!(!graph.mark_stale(&k));
        graph.end();
        graph.store(&k, Evaluated::of(Value::from(1)), TickSeq::ZERO, TickSeq::ZERO);
        assert!(graph.mark_stale(&k));
        assert!(!graph.mark_stale(&k));
        assert_eq!(graph.state(&k), CellState::Stale);
    }

    #[test]
    fn unchanged_value_keeps_changed_stamp() {
        let mut graph = DependencyGraph::new();
        let k = key(0, "a");
        graph.store(&k, Evaluated::of(Value::from(1)), TickSeq::new(0, 1), TickSeq::new(0, 2));
        graph.store(&k, Evaluated::of(Value::from(1)), TickSeq::new(0, 5), TickSeq::new(0, 6));
        assert_eq!(graph.get(&k).unwrap().changed_at, TickSeq::new(0, 1));
        graph.store(&k, Evaluated::of(Value::from(2)), TickSeq::new(0, 7), TickSeq::new(0, 8));
        assert_eq!(graph.get(&k).unwrap().changed_at, TickSeq::new(0, 7));
        assert_eq!(graph.get(&k).unwrap().evaluations, 3);
    }
}
