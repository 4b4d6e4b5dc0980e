//! Node records.
//!
//! A [`Node`] is one addressable unit of content.  All nodes share the same
//! generic shape; the per-kind payload lives in [`NodeBody`]:
//!
//! | Kind      | Payload                                         |
//! |-----------|-------------------------------------------------|
//! | `root`    | children, format, indent, cached text           |
//! | `element` | children, format, indent, cached text           |
//! | `text`    | text, format, style                             |
//!
//! Parent and children are stored as [`NodeKey`] references, never as
//! pointers, so snapshots can share unchanged nodes.

pub mod schema;

use std::fmt;
use std::sync::OnceLock;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::key::NodeKey;

pub use schema::{FieldSpec, NodeSchema, NodeTypeRegistry};

/// Type tag of the root node.
pub const ROOT_TYPE: &str = "root";
/// Type tag of plain text nodes.
pub const TEXT_TYPE: &str = "text";
/// Type tag of the built-in paragraph element.
pub const PARAGRAPH_TYPE: &str = "paragraph";

// ── NodeKind ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Element,
    Text,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Element => "element",
            Self::Text => "text",
        }
    }

    /// Root and element nodes may own children.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Root | Self::Element)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── NodeFlags ─────────────────────────────────────────────────────────────

bitflags! {
    /// Generic per-node state bits.  Bits this crate does not name are
    /// carried through untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u32 {
        const IMMUTABLE = 1;
        const SEGMENTED = 1 << 1;
        const INERT = 1 << 2;
        const DIRECTIONLESS = 1 << 3;
    }
}

// ── Bodies ────────────────────────────────────────────────────────────────

/// Payload of root and element nodes.
#[derive(Debug, Clone, Default)]
pub struct ElementBody {
    pub(crate) children: Vec<NodeKey>,
    pub(crate) format: u32,
    pub(crate) indent: u32,
    /// Flattened descendant text, filled on first read.
    pub(crate) cached_text: OnceLock<String>,
}

impl ElementBody {
    pub(crate) fn invalidate(&mut self) {
        self.cached_text = OnceLock::new();
    }
}

impl PartialEq for ElementBody {
    fn eq(&self, other: &Self) -> bool {
        self.children == other.children
            && self.format == other.format
            && self.indent == other.indent
    }
}

/// Payload of text nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBody {
    pub(crate) text: String,
    pub(crate) format: u32,
    pub(crate) style: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    Root(ElementBody),
    Element(ElementBody),
    Text(TextBody),
}

// ── Node ──────────────────────────────────────────────────────────────────

/// A single node of the document tree.
///
/// Equality compares every stored field and ignores the cached text, which
/// is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    key: NodeKey,
    node_type: String,
    parent: Option<NodeKey>,
    flags: NodeFlags,
    body: NodeBody,
    /// Extension fields declared by the node type's schema, kept in
    /// declaration order.
    fields: Map<String, Value>,
}

impl Node {
    /// A fresh root node with no children.
    pub fn root() -> Self {
        Self {
            key: NodeKey::root(),
            node_type: ROOT_TYPE.to_string(),
            parent: None,
            flags: NodeFlags::empty(),
            body: NodeBody::Root(ElementBody::default()),
            fields: Map::new(),
        }
    }

    pub(crate) fn element(key: NodeKey, node_type: impl Into<String>) -> Self {
        Self {
            key,
            node_type: node_type.into(),
            parent: None,
            flags: NodeFlags::empty(),
            body: NodeBody::Element(ElementBody::default()),
            fields: Map::new(),
        }
    }

    pub(crate) fn text(key: NodeKey, node_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key,
            node_type: node_type.into(),
            parent: None,
            flags: NodeFlags::empty(),
            body: NodeBody::Text(TextBody {
                text: text.into(),
                ..TextBody::default()
            }),
            fields: Map::new(),
        }
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Root(_) => NodeKind::Root,
            NodeBody::Element(_) => NodeKind::Element,
            NodeBody::Text(_) => NodeKind::Text,
        }
    }

    pub fn parent(&self) -> Option<&NodeKey> {
        self.parent.as_ref()
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    /// Child keys in order.  Empty for text nodes.
    pub fn children(&self) -> &[NodeKey] {
        match &self.body {
            NodeBody::Root(body) | NodeBody::Element(body) => &body.children,
            NodeBody::Text(_) => &[],
        }
    }

    pub fn first_child(&self) -> Option<&NodeKey> {
        self.children().first()
    }

    pub fn last_child(&self) -> Option<&NodeKey> {
        self.children().last()
    }

    pub fn format(&self) -> u32 {
        match &self.body {
            NodeBody::Root(body) | NodeBody::Element(body) => body.format,
            NodeBody::Text(body) => body.format,
        }
    }

    /// Indent level; `None` for text nodes.
    pub fn indent(&self) -> Option<u32> {
        self.element_body().map(|body| body.indent)
    }

    /// Text payload; `None` for root and element nodes.
    pub fn text_payload(&self) -> Option<&str> {
        self.text_body().map(|body| body.text.as_str())
    }

    pub fn style(&self) -> Option<&str> {
        self.text_body().map(|body| body.style.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub(crate) fn element_body(&self) -> Option<&ElementBody> {
        match &self.body {
            NodeBody::Root(body) | NodeBody::Element(body) => Some(body),
            NodeBody::Text(_) => None,
        }
    }

    pub(crate) fn element_body_mut(&mut self) -> Option<&mut ElementBody> {
        match &mut self.body {
            NodeBody::Root(body) | NodeBody::Element(body) => Some(body),
            NodeBody::Text(_) => None,
        }
    }

    pub(crate) fn text_body(&self) -> Option<&TextBody> {
        match &self.body {
            NodeBody::Text(body) => Some(body),
            _ => None,
        }
    }

    pub(crate) fn text_body_mut(&mut self) -> Option<&mut TextBody> {
        match &mut self.body {
            NodeBody::Text(body) => Some(body),
            _ => None,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeKey>) {
        self.parent = parent;
    }

    pub(crate) fn set_flags(&mut self, flags: NodeFlags) {
        self.flags = flags;
    }

    pub(crate) fn set_format(&mut self, format: u32) {
        match &mut self.body {
            NodeBody::Root(body) | NodeBody::Element(body) => body.format = format,
            NodeBody::Text(body) => body.format = format,
        }
    }

    pub(crate) fn set_fields(&mut self, fields: Map<String, Value>) {
        self.fields = fields;
    }

    pub(crate) fn has_cached_text(&self) -> bool {
        self.element_body()
            .is_some_and(|body| body.cached_text.get().is_some())
    }

    /// Drop the memoized text of a root/element node.
    pub(crate) fn invalidate_cached_text(&mut self) {
        if let Some(body) = self.element_body_mut() {
            body.invalidate();
        }
    }
}
