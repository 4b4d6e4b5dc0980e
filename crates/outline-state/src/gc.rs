//! Reachability sweep.
//!
//! Walks `children` links from the root and drops every entry it did not
//! visit.  Detaching a subtree's top node is enough to collect the whole
//! subtree: its descendants become unreachable transitively.

use std::collections::HashSet;

use crate::key::{NodeKey, ROOT_KEY};
use crate::node_map::{NodeMap, NodeMapExt};

/// Remove unreachable nodes from `map`, returning the collected keys in map
/// order.  Total: dangling child references are skipped, never reported.
pub fn collect_garbage(map: &mut NodeMap) -> Vec<NodeKey> {
    let mut reachable: HashSet<&str> = HashSet::with_capacity(map.len());
    let mut stack = vec![ROOT_KEY];
    while let Some(key) = stack.pop() {
        if !reachable.insert(key) {
            continue;
        }
        if let Some(node) = map.node(key) {
            stack.extend(node.children().iter().map(NodeKey::as_str));
        }
    }
    let garbage: Vec<NodeKey> = map
        .keys()
        .filter(|k| !reachable.contains(k.as_str()))
        .cloned()
        .collect();
    if garbage.is_empty() {
        return garbage;
    }

    let doomed: HashSet<NodeKey> = garbage.iter().cloned().collect();
    map.retain(|key, _| !doomed.contains(key));
    for key in &garbage {
        tracing::trace!(key = %key, "collected unreachable node");
    }
    garbage
}
