//! Update transactions.
//!
//! A [`Transaction`] owns a working copy of the previous snapshot's node map.
//! The copy is shallow: every entry is still the previous state's
//! `Arc<Node>` until the transaction writes to it, at which point
//! [`Arc::make_mut`] gives the working copy its own node.  Readers of the
//! previous state never observe a write.
//!
//! Mutations check their preconditions before touching the map, so a failed
//! call leaves the working copy as it was.  Commit runs the structural check,
//! the reachability sweep and selection revalidation, then seals the map into
//! a new [`EditorState`].

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;
use serde_json::{Map, Value};

use crate::error::EditorError;
use crate::gc;
use crate::integrity;
use crate::key::{KeyGenerator, NodeKey};
use crate::node::{Node, NodeFlags, NodeKind, NodeTypeRegistry, TEXT_TYPE};
use crate::node_map::{NodeMap, NodeMapExt};
use crate::scope::{self, Scope};
use crate::selection::{self, Point, Selection};
use crate::state::EditorState;

/// Result of a successful commit.
#[derive(Debug)]
pub(crate) struct Commit {
    pub(crate) state: EditorState,
    /// Created, written or detached keys that survived collection, in the
    /// order they were first touched.
    pub(crate) dirty: Vec<NodeKey>,
    pub(crate) collected: Vec<NodeKey>,
}

/// Mutation handle passed to [`Editor::update`](crate::Editor::update).
///
/// Every mutation fails with [`EditorError::ReadOnlyViolation`] while the
/// calling thread is inside a read closure.
pub struct Transaction<'a> {
    map: NodeMap,
    selection: Option<Selection>,
    selection_dirty: bool,
    dirty: IndexSet<NodeKey>,
    /// Nodes whose cached text and whose ancestors' cached text were reset by
    /// this transaction.
    invalidated: HashSet<NodeKey>,
    keys: &'a KeyGenerator,
    registry: &'a NodeTypeRegistry,
}

impl<'a> Transaction<'a> {
    pub(crate) fn open(prev: &EditorState, keys: &'a KeyGenerator, registry: &'a NodeTypeRegistry) -> Self {
        Self {
            map: prev.node_map().clone(),
            selection: prev.selection().cloned(),
            selection_dirty: false,
            dirty: IndexSet::new(),
            invalidated: HashSet::new(),
            keys,
            registry,
        }
    }

    // ── Reads over the working copy ───────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.map.node(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn root(&self) -> &Node {
        &self.map[0]
    }

    pub fn text_content(&self, key: &str) -> Option<&str> {
        self.map.text_content(key)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn node_map(&self) -> &NodeMap {
        &self.map
    }

    // ── Creation ──────────────────────────────────────────────────────────

    /// Create a detached element of a registered element type.
    pub fn create_element(&mut self, node_type: &str) -> Result<NodeKey, EditorError> {
        self.create_node(node_type, Map::new())
    }

    /// Create a detached plain text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> Result<NodeKey, EditorError> {
        let node = Node::text(self.fresh_key()?, TEXT_TYPE, text);
        Ok(self.insert_fresh(node))
    }

    /// Create a detached node of any registered non-root type with its
    /// declared extension fields.
    pub fn create_node(&mut self, node_type: &str, fields: Map<String, Value>) -> Result<NodeKey, EditorError> {
        let registry = self.registry;
        let schema = registry.resolve(node_type)?;
        let fields = schema.normalize_fields(fields)?;
        let mut node = match schema.kind {
            NodeKind::Element => Node::element(self.fresh_key()?, node_type),
            NodeKind::Text => Node::text(self.fresh_key()?, node_type, ""),
            NodeKind::Root => {
                return Err(EditorError::SchemaViolation {
                    node_type: node_type.to_string(),
                    reason: "root nodes cannot be created".to_string(),
                })
            }
        };
        node.set_fields(fields);
        Ok(self.insert_fresh(node))
    }

    /// Next issued key that is not already stored in the working copy.
    fn fresh_key(&self) -> Result<NodeKey, EditorError> {
        ensure_writable()?;
        loop {
            let key = self.keys.issue().ok_or(EditorError::KeysExhausted)?;
            if !self.map.contains_key(&key) {
                return Ok(key);
            }
        }
    }

    fn insert_fresh(&mut self, node: Node) -> NodeKey {
        let key = node.key().clone();
        self.dirty.insert(key.clone());
        self.map.insert_node(node);
        key
    }

    // ── Structure ─────────────────────────────────────────────────────────

    /// Attach `child` as the last child of `parent`.
    ///
    /// An attached child is moved: it leaves its old parent in the same step.
    pub fn append(&mut self, parent: &str, child: &str) -> Result<(), EditorError> {
        self.attach(parent, child, None)
    }

    /// Attach `child` at `index` among `parent`'s children.
    ///
    /// `index` is interpreted after `child` has left its old position, so
    /// `0..=len` is valid where `len` excludes `child` itself.
    pub fn insert_child(&mut self, parent: &str, index: usize, child: &str) -> Result<(), EditorError> {
        self.attach(parent, child, Some(index))
    }

    /// Detach `key` from its parent.  The node and its subtree stay in the
    /// working copy until commit collects them, so they can still be
    /// re-attached by a later call in the same transaction.
    pub fn remove(&mut self, key: &str) -> Result<(), EditorError> {
        ensure_writable()?;
        let node = self.require(key)?;
        if node.kind() == NodeKind::Root {
            return Err(EditorError::StructuralIntegrity("the root cannot be removed".to_string()));
        }
        let Some(parent) = node.parent().cloned() else {
            return Ok(());
        };
        self.unlink(&parent, key)?;
        self.write(key)?.set_parent(None);
        Ok(())
    }

    fn attach(&mut self, parent: &str, child: &str, index: Option<usize>) -> Result<(), EditorError> {
        ensure_writable()?;
        let parent_node = self.require(parent)?;
        if !parent_node.kind().is_container() {
            return Err(EditorError::WrongNodeKind {
                key: parent_node.key().clone(),
                expected: "element",
                actual: parent_node.kind(),
            });
        }
        let child_node = self.require(child)?;
        if child_node.kind() == NodeKind::Root {
            return Err(EditorError::StructuralIntegrity("the root cannot be attached".to_string()));
        }
        if child == parent || self.map.is_ancestor_of(child, parent) {
            return Err(EditorError::StructuralIntegrity(format!(
                "attaching `{child}` under `{parent}` would create a cycle"
            )));
        }

        let old_parent = child_node.parent().cloned();
        let mut len = parent_node.children().len();
        if old_parent.as_deref() == Some(parent) {
            len -= 1;
        }
        let index = index.unwrap_or(len);
        if index > len {
            return Err(EditorError::InvalidOffset {
                key: NodeKey::from(parent),
                offset: index,
                len,
            });
        }

        if let Some(old_parent) = old_parent {
            self.unlink(&old_parent, child)?;
        }
        let child_key = NodeKey::from(child);
        if let Some(body) = self.write(parent)?.element_body_mut() {
            body.children.insert(index, child_key);
        }
        self.write(child)?.set_parent(Some(NodeKey::from(parent)));
        self.invalidate_ancestors(Some(NodeKey::from(parent)));
        Ok(())
    }

    /// Drop `child` from `parent`'s children and invalidate the chain above.
    fn unlink(&mut self, parent: &NodeKey, child: &str) -> Result<(), EditorError> {
        if let Some(body) = self.write(parent)?.element_body_mut() {
            body.children.retain(|c| c.as_str() != child);
        }
        self.invalidate_ancestors(Some(parent.clone()));
        Ok(())
    }

    // ── Payload ───────────────────────────────────────────────────────────

    pub fn set_text(&mut self, key: &str, text: impl Into<String>) -> Result<(), EditorError> {
        ensure_writable()?;
        let text = text.into();
        let node = self.require_kind(key, NodeKind::Text)?;
        if node.text_payload() == Some(text.as_str()) {
            return Ok(());
        }
        let parent = node.parent().cloned();
        if let Some(body) = self.write(key)?.text_body_mut() {
            body.text = text;
        }
        self.invalidate_ancestors(parent);
        Ok(())
    }

    pub fn set_style(&mut self, key: &str, style: impl Into<String>) -> Result<(), EditorError> {
        ensure_writable()?;
        let style = style.into();
        if self.require_kind(key, NodeKind::Text)?.style() == Some(style.as_str()) {
            return Ok(());
        }
        if let Some(body) = self.write(key)?.text_body_mut() {
            body.style = style;
        }
        Ok(())
    }

    pub fn set_format(&mut self, key: &str, format: u32) -> Result<(), EditorError> {
        ensure_writable()?;
        if self.require(key)?.format() != format {
            self.write(key)?.set_format(format);
        }
        Ok(())
    }

    /// Set the indent level of a root or element node.
    pub fn set_indent(&mut self, key: &str, indent: u32) -> Result<(), EditorError> {
        ensure_writable()?;
        let node = self.require(key)?;
        if !node.kind().is_container() {
            return Err(EditorError::WrongNodeKind {
                key: node.key().clone(),
                expected: "element",
                actual: node.kind(),
            });
        }
        if node.indent() == Some(indent) {
            return Ok(());
        }
        if let Some(body) = self.write(key)?.element_body_mut() {
            body.indent = indent;
        }
        Ok(())
    }

    pub fn set_flags(&mut self, key: &str, flags: NodeFlags) -> Result<(), EditorError> {
        ensure_writable()?;
        if self.require(key)?.flags() != flags {
            self.write(key)?.set_flags(flags);
        }
        Ok(())
    }

    /// Set a declared extension field.
    pub fn set_field(&mut self, key: &str, name: &str, value: Value) -> Result<(), EditorError> {
        ensure_writable()?;
        let node = self.require(key)?;
        if node.field(name) == Some(&value) {
            return Ok(());
        }
        let registry = self.registry;
        let schema = registry.resolve(node.node_type())?;
        let mut fields = node.fields().clone();
        fields.insert(name.to_string(), value);
        let fields = schema.normalize_fields(fields)?;
        self.write(key)?.set_fields(fields);
        Ok(())
    }

    /// Remove an optional extension field.  Required fields cannot be
    /// removed.
    pub fn remove_field(&mut self, key: &str, name: &str) -> Result<(), EditorError> {
        ensure_writable()?;
        let node = self.require(key)?;
        if node.field(name).is_none() {
            return Ok(());
        }
        let registry = self.registry;
        let schema = registry.resolve(node.node_type())?;
        if schema.field(name).is_some_and(|spec| spec.required) {
            return Err(EditorError::SchemaViolation {
                node_type: node.node_type().to_string(),
                reason: format!("required field `{name}` cannot be removed"),
            });
        }
        let mut fields = node.fields().clone();
        fields.remove(name);
        let fields = schema.normalize_fields(fields)?;
        self.write(key)?.set_fields(fields);
        Ok(())
    }

    // ── Selection ─────────────────────────────────────────────────────────

    /// Replace the selection.  Both points are checked now; out-of-range
    /// offsets are rejected, never clamped.
    pub fn set_selection(&mut self, selection: Selection) -> Result<(), EditorError> {
        selection::validate_selection(&self.map, &selection)?;
        self.replace_selection(Some(selection))
    }

    /// Move the anchor.  With no selection this places a caret.
    pub fn set_anchor(&mut self, point: Point) -> Result<(), EditorError> {
        selection::validate_point(&self.map, &point)?;
        let next = match &self.selection {
            Some(sel) => Selection::new(point, sel.focus.clone()),
            None => Selection::collapsed(point),
        };
        self.replace_selection(Some(next))
    }

    /// Move the focus.  With no selection this places a caret.
    pub fn set_focus(&mut self, point: Point) -> Result<(), EditorError> {
        selection::validate_point(&self.map, &point)?;
        let next = match &self.selection {
            Some(sel) => Selection::new(sel.anchor.clone(), point),
            None => Selection::collapsed(point),
        };
        self.replace_selection(Some(next))
    }

    /// Select `anchor..focus` (character offsets) inside one text node.
    pub fn select_text(&mut self, key: &str, anchor: usize, focus: usize) -> Result<(), EditorError> {
        self.set_selection(Selection::new(Point::text(key, anchor), Point::text(key, focus)))
    }

    pub fn clear_selection(&mut self) -> Result<(), EditorError> {
        self.replace_selection(None)
    }

    fn replace_selection(&mut self, selection: Option<Selection>) -> Result<(), EditorError> {
        ensure_writable()?;
        if self.selection != selection {
            self.selection = selection;
            self.selection_dirty = true;
        }
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn require(&self, key: &str) -> Result<&Node, EditorError> {
        self.map
            .node(key)
            .ok_or_else(|| EditorError::NodeNotFound(NodeKey::from(key)))
    }

    fn require_kind(&self, key: &str, kind: NodeKind) -> Result<&Node, EditorError> {
        let node = self.require(key)?;
        if node.kind() != kind {
            return Err(EditorError::WrongNodeKind {
                key: node.key().clone(),
                expected: kind.as_str(),
                actual: node.kind(),
            });
        }
        Ok(node)
    }

    /// Writable node, copied out of the shared snapshot on first write.
    fn write(&mut self, key: &str) -> Result<&mut Node, EditorError> {
        ensure_writable()?;
        let (_, key, entry) = self
            .map
            .get_full_mut(key)
            .ok_or_else(|| EditorError::NodeNotFound(NodeKey::from(key)))?;
        self.dirty.insert(key.clone());
        Ok(Arc::make_mut(entry))
    }

    /// Reset the cached text of `start` and every node above it, returning
    /// how many nodes were reset.
    ///
    /// The walk stops at a node this transaction already reset whose entry is
    /// no longer shared and whose cache is still empty: everything above it
    /// was reset by the same earlier walk, and filling any of those caches
    /// would have filled this one too.  A node still shared with the previous
    /// state is always reset, since a reader of that state may fill it.
    fn invalidate_ancestors(&mut self, start: Option<NodeKey>) -> usize {
        let mut current = start;
        let mut reset = 0;
        while reset < self.map.len() {
            let Some(key) = current else {
                break;
            };
            let Some(entry) = self.map.get_mut(&key) else {
                break;
            };
            if self.invalidated.contains(&key)
                && Arc::get_mut(entry).is_some_and(|node| !node.has_cached_text())
            {
                break;
            }
            let node = Arc::make_mut(entry);
            node.invalidate_cached_text();
            current = node.parent().cloned();
            self.invalidated.insert(key);
            reset += 1;
        }
        reset
    }

    pub(crate) fn is_noop(&self) -> bool {
        self.dirty.is_empty() && !self.selection_dirty
    }

    pub(crate) fn commit(self) -> Result<Commit, EditorError> {
        let Self {
            mut map,
            selection,
            mut dirty,
            ..
        } = self;
        integrity::validate(&map).map_err(EditorError::StructuralIntegrity)?;
        let collected = gc::collect_garbage(&mut map);

        let selection = match selection {
            Some(sel) if collected.iter().any(|key| sel.references(key)) => None,
            Some(sel) => {
                selection::validate_selection(&map, &sel)?;
                Some(sel)
            }
            None => None,
        };

        dirty.retain(|key| map.contains_key(key));
        Ok(Commit {
            state: EditorState::sealed(map, selection),
            dirty: dirty.into_iter().collect(),
            collected,
        })
    }
}

fn ensure_writable() -> Result<(), EditorError> {
    if scope::current() == Scope::Read {
        return Err(EditorError::ReadOnlyViolation);
    }
    Ok(())
}
