//! # Function Entry Table
//!
//! Local functions the peer may call by handle id.
//!
//! ## Invariants
//!
//! - An id maps to at most one entry.
//! - A single-use entry is removed when it is claimed, before its body runs.
//! - Claiming an entry with a paired release also removes the sibling, so firing one
//!   half of a success/failure pair retires the other.

use dashmap::DashMap;

use crate::tree::Function;

/// A function exposed to the peer.
#[derive(Clone, Debug)]
pub struct FunctionEntry {
    pub function: Function,
    pub single_use: bool,
    pub paired_release: Option<String>,
}

impl FunctionEntry {
    /// An entry that stays until the peer releases it.
    pub fn reusable(function: Function) -> Self {
        Self { function, single_use: false, paired_release: None }
    }

    /// An entry that disappears on first call, taking `sibling` with it.
    pub fn paired(function: Function, sibling: impl Into<String>) -> Self {
        Self { function, single_use: true, paired_release: Some(sibling.into()) }
    }
}

#[derive(Default)]
pub struct FunctionTable {
    entries: DashMap<String, FunctionEntry>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, entry: FunctionEntry) {
        self.entries.insert(id.into(), entry);
    }

    /// Resolves an id for invocation, applying single-use and paired removal.
    pub fn claim(&self, id: &str) -> Option<Function> {
        let entry = match self.entries.remove_if(id, |_, entry| entry.single_use) {
            Some((_, entry)) => entry,
            None => self.entries.get(id)?.value().clone(),
        };
        if let Some(sibling) = &entry.paired_release {
            self.entries.remove(sibling);
        }
        Some(entry.function)
    }

    /// Forgets an id. Absent ids are a no-op.
    pub fn release(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
