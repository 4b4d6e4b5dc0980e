//! Canonical JSON codec.
//!
//! Wire format: the node map as an ordered list of `[key, fields]` pairs in
//! creation order, followed by the selection.
//!
//! ```json
//! {
//!   "_nodeMap": [
//!     ["root", {"__type": "root", "__flags": 0, "__key": "root", "__parent": null,
//!               "__children": ["1"], "__format": 0, "__indent": 0, "__cachedText": "foo"}],
//!     ["1", {"__type": "paragraph", "__flags": 0, "__key": "1", "__parent": "root",
//!            "__children": ["2"], "__format": 0, "__indent": 0}],
//!     ["2", {"__type": "text", "__flags": 0, "__key": "2", "__parent": "1",
//!            "__text": "foo", "__format": 0, "__style": ""}]
//!   ],
//!   "_selection": {"anchor": {"key": "2", "offset": 0, "type": "text"},
//!                  "focus": {"key": "2", "offset": 3, "type": "text"}}
//! }
//! ```
//!
//! Fields are sparse per kind and always emitted in the order shown.
//! Extension fields declared by a node type follow as `__<name>`.  Only the
//! root carries `__cachedText`; it is derived, so the decoder ignores it.

use serde_json::{Map, Value};

use crate::error::EditorError;
use crate::integrity;
use crate::key::NodeKey;
use crate::node::{Node, NodeBody, NodeFlags, NodeKind, NodeTypeRegistry};
use crate::node_map::{NodeMap, NodeMapExt};
use crate::selection::{self, Selection};
use crate::state::EditorState;

const NODE_MAP: &str = "_nodeMap";
const SELECTION: &str = "_selection";

const TYPE: &str = "__type";
const FLAGS: &str = "__flags";
const KEY: &str = "__key";
const PARENT: &str = "__parent";
const CHILDREN: &str = "__children";
const FORMAT: &str = "__format";
const INDENT: &str = "__indent";
const CACHED_TEXT: &str = "__cachedText";
const TEXT: &str = "__text";
const STYLE: &str = "__style";

const FIELD_PREFIX: &str = "__";

// ── Encode ────────────────────────────────────────────────────────────────

/// Encode `state` to its canonical JSON value.
pub fn encode(state: &EditorState) -> Value {
    let map = state.node_map();
    let entries: Vec<Value> = map
        .iter()
        .map(|(key, node)| Value::Array(vec![Value::String(key.to_string()), encode_node(map, node)]))
        .collect();
    let selection = match state.selection() {
        Some(sel) => encode_selection(sel),
        None => Value::Null,
    };
    let mut out = Map::new();
    out.insert(NODE_MAP.to_string(), Value::Array(entries));
    out.insert(SELECTION.to_string(), selection);
    Value::Object(out)
}

/// Compact canonical text.
pub fn to_string(state: &EditorState) -> String {
    encode(state).to_string()
}

/// Two-space indented canonical text.
pub fn to_string_pretty(state: &EditorState) -> Result<String, EditorError> {
    Ok(serde_json::to_string_pretty(&encode(state))?)
}

fn encode_node(map: &NodeMap, node: &Node) -> Value {
    let mut out = Map::new();
    out.insert(TYPE.into(), Value::String(node.node_type().to_string()));
    out.insert(FLAGS.into(), Value::from(node.flags().bits()));
    out.insert(KEY.into(), Value::String(node.key().to_string()));
    out.insert(
        PARENT.into(),
        node.parent().map_or(Value::Null, |p| Value::String(p.to_string())),
    );
    match node.body() {
        NodeBody::Root(body) | NodeBody::Element(body) => {
            let children = body.children.iter().map(|c| Value::String(c.to_string())).collect();
            out.insert(CHILDREN.into(), Value::Array(children));
            out.insert(FORMAT.into(), Value::from(body.format));
            out.insert(INDENT.into(), Value::from(body.indent));
            if node.kind() == NodeKind::Root {
                let text = map.text_content(node.key()).unwrap_or_default();
                out.insert(CACHED_TEXT.into(), Value::String(text.to_string()));
            }
        }
        NodeBody::Text(body) => {
            out.insert(TEXT.into(), Value::String(body.text.clone()));
            out.insert(FORMAT.into(), Value::from(body.format));
            out.insert(STYLE.into(), Value::String(body.style.clone()));
        }
    }
    for (name, value) in node.fields() {
        out.insert(format!("{FIELD_PREFIX}{name}"), value.clone());
    }
    Value::Object(out)
}

fn encode_selection(sel: &Selection) -> Value {
    // Derived serialization of plain structs cannot fail.
    serde_json::to_value(sel).unwrap_or(Value::Null)
}

// ── Decode ────────────────────────────────────────────────────────────────

fn malformed(msg: impl Into<String>) -> EditorError {
    EditorError::MalformedState(msg.into())
}

/// Parse canonical text.
pub fn from_str(text: &str, registry: &NodeTypeRegistry) -> Result<EditorState, EditorError> {
    let value: Value = serde_json::from_str(text)?;
    decode(&value, registry)
}

/// Rebuild an [`EditorState`] from its canonical JSON value.
///
/// The input is untrusted: every reference must close (children resolve and
/// point back, parents list their children, everything is reachable from a
/// leading root entry) and the selection must address surviving nodes with
/// in-range offsets.  Any violation is a [`EditorError::MalformedState`].
pub fn decode(value: &Value, registry: &NodeTypeRegistry) -> Result<EditorState, EditorError> {
    let top = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object"))?;
    if let Some(field) = top.keys().find(|k| *k != NODE_MAP && *k != SELECTION) {
        return Err(malformed(format!("unexpected top-level field `{field}`")));
    }
    let entries = top
        .get(NODE_MAP)
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("`_nodeMap` must be an array"))?;

    let mut map = NodeMap::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let (key, fields) = match entry.as_array().map(Vec::as_slice) {
            Some([Value::String(key), Value::Object(fields)]) => (key, fields),
            _ => return Err(malformed(format!("entry {index} is not a [key, fields] pair"))),
        };
        if map.contains_key(key.as_str()) {
            return Err(malformed(format!("duplicate key `{key}`")));
        }
        map.insert_node(decode_node(key, fields.clone(), registry)?);
    }

    let reachable = integrity::validate(&map).map_err(EditorError::MalformedState)?;
    if let Some(stray) = map.keys().find(|k| !reachable.contains(*k)) {
        return Err(malformed(format!("node `{stray}` is not reachable from the root")));
    }

    let selection = match top.get(SELECTION) {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let sel: Selection = serde_json::from_value(raw.clone())
                .map_err(|e| malformed(format!("invalid selection: {e}")))?;
            selection::validate_selection(&map, &sel)
                .map_err(|e| malformed(format!("invalid selection: {e}")))?;
            Some(sel)
        }
    };
    Ok(EditorState::sealed(map, selection))
}

fn decode_node(key: &str, mut fields: Map<String, Value>, registry: &NodeTypeRegistry) -> Result<Node, EditorError> {
    let node_type = take_string(&mut fields, key, TYPE)?;
    let schema = registry
        .get(&node_type)
        .ok_or_else(|| malformed(format!("node `{key}` has unknown type `{node_type}`")))?;
    let flags = take_u32(&mut fields, key, FLAGS)?;
    let own_key = take_string(&mut fields, key, KEY)?;
    if own_key != key {
        return Err(malformed(format!("entry `{key}` carries __key `{own_key}`")));
    }
    let parent = match fields.remove(PARENT) {
        Some(Value::Null) => None,
        Some(Value::String(parent)) => Some(NodeKey::from(parent)),
        Some(_) => return Err(malformed(format!("node `{key}`: __parent must be a string or null"))),
        None => return Err(malformed(format!("node `{key}`: missing __parent"))),
    };

    let mut node = match schema.kind {
        NodeKind::Root | NodeKind::Element => {
            let mut node = if schema.kind == NodeKind::Root {
                if key != crate::key::ROOT_KEY {
                    return Err(malformed(format!("root node stored under key `{key}`")));
                }
                match fields.remove(CACHED_TEXT) {
                    None | Some(Value::String(_)) => {}
                    Some(_) => return Err(malformed("root __cachedText must be a string")),
                }
                Node::root()
            } else {
                Node::element(NodeKey::from(key), node_type.as_str())
            };
            let children = take_children(&mut fields, key)?;
            let format = take_u32(&mut fields, key, FORMAT)?;
            let indent = take_u32(&mut fields, key, INDENT)?;
            if let Some(body) = node.element_body_mut() {
                body.children = children;
                body.format = format;
                body.indent = indent;
            }
            node
        }
        NodeKind::Text => {
            let text = take_string(&mut fields, key, TEXT)?;
            let format = take_u32(&mut fields, key, FORMAT)?;
            let style = take_string(&mut fields, key, STYLE)?;
            let mut node = Node::text(NodeKey::from(key), node_type.as_str(), text);
            if let Some(body) = node.text_body_mut() {
                body.format = format;
                body.style = style;
            }
            node
        }
    };
    node.set_parent(parent);
    node.set_flags(NodeFlags::from_bits_retain(flags));

    let mut extension = Map::new();
    for (name, value) in fields {
        match name.strip_prefix(FIELD_PREFIX) {
            Some(bare) if !bare.is_empty() => {
                extension.insert(bare.to_string(), value);
            }
            _ => return Err(malformed(format!("node `{key}`: unexpected field `{name}`"))),
        }
    }
    let extension = schema
        .normalize_fields(extension)
        .map_err(|e| malformed(format!("node `{key}`: {e}")))?;
    node.set_fields(extension);
    Ok(node)
}

fn take_string(fields: &mut Map<String, Value>, key: &str, name: &str) -> Result<String, EditorError> {
    match fields.remove(name) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(malformed(format!("node `{key}`: {name} must be a string"))),
        None => Err(malformed(format!("node `{key}`: missing {name}"))),
    }
}

fn take_u32(fields: &mut Map<String, Value>, key: &str, name: &str) -> Result<u32, EditorError> {
    let value = fields
        .remove(name)
        .ok_or_else(|| malformed(format!("node `{key}`: missing {name}")))?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| malformed(format!("node `{key}`: {name} must be an unsigned 32-bit integer")))
}

fn take_children(fields: &mut Map<String, Value>, key: &str) -> Result<Vec<NodeKey>, EditorError> {
    match fields.remove(CHILDREN) {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(child) => Ok(NodeKey::from(child)),
                _ => Err(malformed(format!("node `{key}`: children must be strings"))),
            })
            .collect(),
        Some(_) => Err(malformed(format!("node `{key}`: __children must be an array"))),
        None => Err(malformed(format!("node `{key}`: missing __children"))),
    }
}
