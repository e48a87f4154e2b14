//! Delta ledger.
//!
//! Records essential writes, expansions, retirements and actions for
//! debugging. Off unless [`EngineConfig::record_ledger`](crate::EngineConfig)
//! is set or [`Ledger::enable`] is called.

use crate::address::{CellKey, ComponentId, VarName};
use crate::value::Value;
use serde::Serialize;

/// A recorded delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaEntry {
    /// Action batch the delta belongs to.
    pub tick: u64,
    pub kind: DeltaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeltaKind {
    /// An essential value was written by an inverse.
    EssentialSet { cell: CellKey, value: Value },
    /// A composite produced a new replacement list.
    Expanded {
        composite: ComponentId,
        replacements: usize,
    },
    Retired { component: ComponentId },
    ActionApplied {
        component: ComponentId,
        action: VarName,
    },
    /// A deferred skippable action was replaced by a newer one.
    ActionCoalesced {
        component: ComponentId,
        action: VarName,
    },
    /// A transient burst was confirmed by a non-transient action.
    Committed {
        component: ComponentId,
        action: VarName,
    },
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<DeltaEntry>,
    enabled: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, tick: u64, kind: DeltaKind) {
        if self.enabled {
            self.entries.push(DeltaEntry { tick, kind });
        }
    }

    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries_for_tick(&self, tick: u64) -> Vec<&DeltaEntry> {
        self.entries.iter().filter(|e| e.tick == tick).collect()
    }
}
