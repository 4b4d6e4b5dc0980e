//! Structural invariants of a node map.
//!
//! - the first entry is the root: key `root`, kind root, no parent;
//! - no other node has kind root;
//! - every child reference resolves and the child points back at its parent;
//! - every non-null parent reference resolves and lists the node as a child;
//! - nothing is reachable twice from the root (no cycles, no second parent).

use indexmap::IndexSet;

use crate::key::NodeKey;
use crate::node::NodeKind;
use crate::node_map::{NodeMap, NodeMapExt};

/// Validate `map` and return the keys reachable from the root in
/// depth-first pre-order.  Errors are plain descriptions; callers wrap them
/// in the error class that fits their context.
pub(crate) fn validate(map: &NodeMap) -> Result<IndexSet<NodeKey>, String> {
    let Some((first_key, root)) = map.get_index(0) else {
        return Err("node map is empty".to_string());
    };
    if !first_key.is_root() || root.kind() != NodeKind::Root || root.key() != first_key {
        return Err(format!("first entry `{first_key}` is not the root node"));
    }
    if let Some(parent) = root.parent() {
        return Err(format!("root has parent `{parent}`"));
    }

    for (key, node) in map.iter() {
        if node.key() != key {
            return Err(format!("entry `{key}` holds node `{}`", node.key()));
        }
        if node.kind() == NodeKind::Root && !key.is_root() {
            return Err(format!("second root node `{key}`"));
        }
        if let Some(parent_key) = node.parent() {
            let parent = map
                .node(parent_key)
                .ok_or_else(|| format!("node `{key}` references missing parent `{parent_key}`"))?;
            if !parent.children().contains(key) {
                return Err(format!("parent `{parent_key}` does not list child `{key}`"));
            }
        }
    }

    let mut reachable = IndexSet::with_capacity(map.len());
    let mut stack = vec![first_key.clone()];
    while let Some(key) = stack.pop() {
        if !reachable.insert(key.clone()) {
            return Err(format!("node `{key}` is reachable more than once"));
        }
        let Some(node) = map.node(&key) else {
            continue;
        };
        for child_key in node.children().iter().rev() {
            let child = map
                .node(child_key)
                .ok_or_else(|| format!("node `{key}` references missing child `{child_key}`"))?;
            if child.parent() != Some(&key) {
                return Err(format!(
                    "child `{child_key}` of `{key}` has parent {:?}",
                    child.parent().map(NodeKey::as_str)
                ));
            }
            stack.push(child_key.clone());
        }
    }
    Ok(reachable)
}
