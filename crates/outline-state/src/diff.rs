//! Key-level comparison of two snapshots.
//!
//! Snapshots produced by transactions share every untouched node, so most
//! entries compare by pointer.  Entries whose `Arc`s differ fall back to
//! field equality; a node copied only to reset its cached text is not
//! reported as updated.

use std::sync::Arc;

use crate::key::NodeKey;
use crate::state::EditorState;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    /// Keys present only in the next state, in its order.
    pub added: Vec<NodeKey>,
    /// Keys present only in the previous state, in its order.
    pub removed: Vec<NodeKey>,
    /// Keys present in both whose nodes differ, in the next state's order.
    pub updated: Vec<NodeKey>,
    pub selection_changed: bool,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty() && !self.selection_changed
    }
}

pub fn diff(prev: &EditorState, next: &EditorState) -> StateDiff {
    let before = prev.node_map();
    let after = next.node_map();
    let mut out = StateDiff::default();

    for (key, node) in after {
        match before.get(key) {
            None => out.added.push(key.clone()),
            Some(old) if Arc::ptr_eq(old, node) || old == node => {}
            Some(_) => out.updated.push(key.clone()),
        }
    }
    out.removed = before
        .keys()
        .filter(|key| !after.contains_key(*key))
        .cloned()
        .collect();
    out.selection_changed = prev.selection() != next.selection();
    out
}
