//! Immutable editor snapshots.
//!
//! An [`EditorState`] pairs a [`NodeMap`] with an optional [`Selection`].  It
//! is never mutated after creation; the next state is produced by a
//! transaction working on its own copy of the map.  Holders keep old states
//! alive through `Arc`.

use std::sync::Arc;

use crate::error::EditorError;
use crate::integrity;
use crate::key::NodeKey;
use crate::node::Node;
use crate::node_map::{NodeMap, NodeMapExt};
use crate::scope::{Scope, ScopeGuard};
use crate::selection::{self, Selection};

#[derive(Debug, Clone)]
pub struct EditorState {
    map: NodeMap,
    selection: Option<Selection>,
}

impl EditorState {
    /// A document holding only an empty root.
    pub fn empty() -> Self {
        let mut map = NodeMap::new();
        map.insert_node(Node::root());
        Self { map, selection: None }
    }

    /// Build a state from parts, checking every structural invariant.
    ///
    /// Unreachable entries are rejected rather than collected: a bootstrap
    /// map is expected to be a committed snapshot.
    pub fn new(map: NodeMap, selection: Option<Selection>) -> Result<Self, EditorError> {
        let reachable = integrity::validate(&map).map_err(EditorError::StructuralIntegrity)?;
        if reachable.len() != map.len() {
            let stray = map.keys().find(|k| !reachable.contains(*k)).cloned();
            return Err(EditorError::StructuralIntegrity(format!(
                "unreachable node `{}`",
                stray.unwrap_or_else(NodeKey::root)
            )));
        }
        if let Some(sel) = &selection {
            selection::validate_selection(&map, sel)?;
        }
        Ok(Self { map, selection })
    }

    /// Seal an already-validated map.
    pub(crate) fn sealed(map: NodeMap, selection: Option<Selection>) -> Self {
        Self { map, selection }
    }

    /// Run a non-mutating closure against this state.
    ///
    /// Any editor update attempted from inside `f` fails with
    /// [`EditorError::ReadOnlyViolation`].
    pub fn read<R>(&self, f: impl FnOnce(&EditorState) -> R) -> R {
        let _scope = ScopeGuard::enter(Scope::Read);
        f(self)
    }

    pub fn node_map(&self) -> &NodeMap {
        &self.map
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn root(&self) -> &Node {
        // The root is the first entry of every validated map.
        &self.map[0]
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.map.node(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Shared handle to a node, for cheap identity comparisons between
    /// snapshots.
    pub fn get_shared(&self, key: &str) -> Option<&Arc<Node>> {
        self.map.get(key)
    }

    /// Iterate the children of `key` in order.
    pub fn children_of<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a Node> + 'a {
        self.map
            .node(key)
            .map(Node::children)
            .unwrap_or(&[])
            .iter()
            .filter_map(move |child| self.map.node(child))
    }

    /// Flattened text of the subtree rooted at `key`.
    pub fn text_content(&self, key: &str) -> Option<&str> {
        self.map.text_content(key)
    }

    /// Flattened text of the whole document.
    pub fn text(&self) -> &str {
        self.map.text_content(self.root().key()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` when the root has no children.
    pub fn is_empty(&self) -> bool {
        self.root().children().is_empty()
    }

    pub fn is_selection_backward(&self) -> bool {
        self.selection
            .as_ref()
            .is_some_and(|sel| sel.is_backward(&self.map))
    }

    /// Canonical JSON value, see [`crate::codec::json`].
    pub fn to_json(&self) -> serde_json::Value {
        crate::codec::json::encode(self)
    }
}

impl Default for EditorState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Structural equality: same keys in the same order, field-equal nodes and
/// the same selection.
impl PartialEq for EditorState {
    fn eq(&self, other: &Self) -> bool {
        self.selection == other.selection
            && self.map.len() == other.map.len()
            && self
                .map
                .iter()
                .zip(other.map.iter())
                .all(|((ka, a), (kb, b))| ka == kb && (Arc::ptr_eq(a, b) || a == b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::scope;

    #[test]
    fn empty_state_has_root_only() {
        let state = EditorState::empty();
        assert_eq!(state.len(), 1);
        assert_eq!(state.root().kind(), NodeKind::Root);
        assert!(state.selection().is_none());
        assert!(state.is_empty());
        assert_eq!(state.text(), "");
    }

    #[test]
    fn new_accepts_root_only_map() {
        let mut map = NodeMap::new();
        map.insert_node(Node::root());
        let state = EditorState::new(map.clone(), None).unwrap();
        assert!(state.selection().is_none());
        assert!(Arc::ptr_eq(state.get_shared("root").unwrap(), map.get("root").unwrap()));
    }

    #[test]
    fn new_rejects_unreachable_entries() {
        let mut map = NodeMap::new();
        map.insert_node(Node::root());
        map.insert_node(Node::text("1".into(), crate::node::TEXT_TYPE, "x"));
        assert!(matches!(
            EditorState::new(map, None),
            Err(EditorError::StructuralIntegrity(msg)) if msg.contains("`1`")
        ));
    }

    #[test]
    fn read_enters_read_scope() {
        let state = EditorState::empty();
        let seen = state.read(|s| {
            assert_eq!(scope::current(), Scope::Read);
            s.len()
        });
        assert_eq!(seen, 1);
        assert_eq!(scope::current(), Scope::Idle);
    }
}
