//! The key → node arena of one snapshot.
//!
//! Entries are `Arc<Node>` so a transaction's working copy can share every
//! untouched node with the state it was opened from; the first write to an
//! entry goes through [`Arc::make_mut`] and replaces it.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::key::NodeKey;
use crate::node::{Node, NodeBody};

/// Insertion-ordered map from key to node.  Order is creation order.
pub type NodeMap = IndexMap<NodeKey, Arc<Node>>;

/// Tree queries over a [`NodeMap`].
pub trait NodeMapExt {
    fn node(&self, key: &str) -> Option<&Node>;

    /// Flattened text of the subtree at `key`.
    ///
    /// Text nodes return their payload.  Root and element nodes concatenate
    /// descendant text depth-first in child order, memoizing the result on
    /// the node until it is invalidated.
    fn text_content(&self, key: &str) -> Option<&str>;

    /// `true` when `ancestor` is a strict ancestor of `key`.
    fn is_ancestor_of(&self, ancestor: &str, key: &str) -> bool;

    /// Child indices leading from the root to `key`; `None` when the node is
    /// missing or not attached to the root.
    fn path_to(&self, key: &str) -> Option<Vec<usize>>;

    fn insert_node(&mut self, node: Node);
}

impl NodeMapExt for NodeMap {
    fn node(&self, key: &str) -> Option<&Node> {
        self.get(key).map(Arc::as_ref)
    }

    fn text_content(&self, key: &str) -> Option<&str> {
        let node = self.node(key)?;
        match node.body() {
            NodeBody::Text(body) => Some(&body.text),
            NodeBody::Root(body) | NodeBody::Element(body) => {
                if body.cached_text.get().is_none() {
                    fill_cached_text(self, node);
                }
                Some(body.cached_text.get_or_init(|| join_children(self, &body.children)))
            }
        }
    }

    fn is_ancestor_of(&self, ancestor: &str, key: &str) -> bool {
        let mut current = self.node(key).and_then(Node::parent);
        // Bounded walk: a map can never have more ancestors than entries.
        for _ in 0..self.len() {
            match current {
                Some(parent) if parent.as_str() == ancestor => return true,
                Some(parent) => current = self.node(parent).and_then(Node::parent),
                None => return false,
            }
        }
        false
    }

    fn path_to(&self, key: &str) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut node = self.node(key)?;
        for _ in 0..=self.len() {
            let Some(parent_key) = node.parent() else {
                path.reverse();
                return node.key().is_root().then_some(path);
            };
            let parent = self.node(parent_key)?;
            let index = parent.children().iter().position(|c| c == node.key())?;
            path.push(index);
            node = parent;
        }
        None
    }

    fn insert_node(&mut self, node: Node) {
        self.insert(node.key().clone(), Arc::new(node));
    }
}

/// Fill the cached text of `start` and of every uncached element below it,
/// children before parents.  Uses an explicit stack so document depth is not
/// bounded by the thread's stack.
fn fill_cached_text(map: &NodeMap, start: &Node) {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![(start, false)];
    while let Some((node, expanded)) = stack.pop() {
        let Some(body) = node.element_body() else {
            continue;
        };
        if body.cached_text.get().is_some() {
            continue;
        }
        if expanded {
            body.cached_text.get_or_init(|| join_children(map, &body.children));
            continue;
        }
        if !visited.insert(node.key().as_str()) {
            continue;
        }
        stack.push((node, true));
        stack.extend(
            body.children
                .iter()
                .filter_map(|child| map.node(child))
                .map(|child| (child, false)),
        );
    }
}

/// Concatenate the payloads and cached texts of `children`.  Uncached
/// elements contribute nothing.
fn join_children(map: &NodeMap, children: &[NodeKey]) -> String {
    let mut out = String::new();
    for child in children {
        match map.node(child).map(Node::body) {
            Some(NodeBody::Text(body)) => out.push_str(&body.text),
            Some(NodeBody::Root(body) | NodeBody::Element(body)) => {
                if let Some(text) = body.cached_text.get() {
                    out.push_str(text);
                }
            }
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{PARAGRAPH_TYPE, TEXT_TYPE};

    /// root → 1 (paragraph) → [2 "foo", 3 "bar"], root → 4 (paragraph) → [5 "!"]
    fn sample() -> NodeMap {
        let mut map = NodeMap::new();
        let mut root = Node::root();
        root.element_body_mut().unwrap().children = vec!["1".into(), "4".into()];
        map.insert_node(root);
        for (key, kids) in [("1", vec!["2", "3"]), ("4", vec!["5"])] {
            let mut p = Node::element(key.into(), PARAGRAPH_TYPE);
            p.set_parent(Some(NodeKey::root()));
            p.element_body_mut().unwrap().children = kids.into_iter().map(NodeKey::from).collect();
            map.insert_node(p);
        }
        for (key, parent, text) in [("2", "1", "foo"), ("3", "1", "bar"), ("5", "4", "!")] {
            let mut t = Node::text(key.into(), TEXT_TYPE, text);
            t.set_parent(Some(parent.into()));
            map.insert_node(t);
        }
        map
    }

    #[test]
    fn text_content_concatenates_depth_first() {
        let map = sample();
        assert_eq!(map.text_content("root"), Some("foobar!"));
        assert_eq!(map.text_content("1"), Some("foobar"));
        assert_eq!(map.text_content("5"), Some("!"));
        assert_eq!(map.text_content("9"), None);
    }

    #[test]
    fn text_content_is_memoized_until_invalidated() {
        let mut map = sample();
        assert_eq!(map.text_content("1"), Some("foobar"));
        Arc::make_mut(map.get_mut("2").unwrap()).text_body_mut().unwrap().text = "FOO".into();
        assert_eq!(map.text_content("1"), Some("foobar"));
        Arc::make_mut(map.get_mut("1").unwrap()).invalidate_cached_text();
        assert_eq!(map.text_content("1"), Some("FOObar"));
    }

    #[test]
    fn text_content_handles_deep_nesting() {
        const DEPTH: usize = 100_000;
        let mut map = NodeMap::new();
        let mut root = Node::root();
        root.element_body_mut().unwrap().children = vec!["1".into()];
        map.insert_node(root);
        for i in 1..=DEPTH {
            let mut p = Node::element(NodeKey::new(i.to_string()), PARAGRAPH_TYPE);
            let parent = if i == 1 { NodeKey::root() } else { NodeKey::new((i - 1).to_string()) };
            p.set_parent(Some(parent));
            p.element_body_mut().unwrap().children = vec![NodeKey::new((i + 1).to_string())];
            map.insert_node(p);
        }
        let mut leaf = Node::text(NodeKey::new((DEPTH + 1).to_string()), TEXT_TYPE, "deep");
        leaf.set_parent(Some(NodeKey::new(DEPTH.to_string())));
        map.insert_node(leaf);

        assert_eq!(map.text_content("root"), Some("deep"));
        assert_eq!(map.text_content("50000"), Some("deep"));
        assert!(map.node(&DEPTH.to_string()).unwrap().has_cached_text());
    }

    #[test]
    fn ancestry_and_paths() {
        let map = sample();
        assert!(map.is_ancestor_of("root", "3"));
        assert!(map.is_ancestor_of("1", "3"));
        assert!(!map.is_ancestor_of("4", "3"));
        assert!(!map.is_ancestor_of("3", "3"));
        assert_eq!(map.path_to("root"), Some(vec![]));
        assert_eq!(map.path_to("3"), Some(vec![0, 1]));
        assert_eq!(map.path_to("5"), Some(vec![1, 0]));
    }

    #[test]
    fn detached_nodes_have_no_path() {
        let mut map = sample();
        map.insert_node(Node::text("6".into(), TEXT_TYPE, "loose"));
        assert_eq!(map.path_to("6"), None);
    }
}
