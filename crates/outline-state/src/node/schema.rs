//! Node type registry.
//!
//! Node-type modules register a type tag, the kind of node it produces and
//! the extension fields it carries.  The core stores extension values
//! opaquely; it only checks that required fields are present and that no
//! undeclared field sneaks in.  Structural fields (`type`, `key`, `parent`,
//! `children`, ...) are owned by the core and cannot be declared.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{NodeKind, PARAGRAPH_TYPE, ROOT_TYPE, TEXT_TYPE};
use crate::error::EditorError;

/// Field names reserved for the generic node shape.
pub const RESERVED_FIELDS: &[&str] = &[
    "type",
    "flags",
    "key",
    "parent",
    "children",
    "format",
    "indent",
    "cachedText",
    "text",
    "style",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// Declared shape of one node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    #[serde(rename = "type")]
    pub node_type: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl NodeSchema {
    pub fn new(node_type: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            node_type: node_type.into(),
            kind,
            fields: Vec::new(),
        }
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            required: false,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn violation(&self, reason: impl Into<String>) -> EditorError {
        EditorError::SchemaViolation {
            node_type: self.node_type.clone(),
            reason: reason.into(),
        }
    }

    /// Check `fields` against the declaration and return them re-ordered in
    /// declaration order.
    pub(crate) fn normalize_fields(&self, mut fields: Map<String, Value>) -> Result<Map<String, Value>, EditorError> {
        let mut ordered = Map::new();
        for spec in &self.fields {
            match fields.remove(&spec.name) {
                Some(value) => {
                    ordered.insert(spec.name.clone(), value);
                }
                None if spec.required => {
                    return Err(self.violation(format!("missing required field `{}`", spec.name)));
                }
                None => {}
            }
        }
        if let Some(name) = fields.keys().next() {
            return Err(self.violation(format!("undeclared field `{name}`")));
        }
        Ok(ordered)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// Type tag → schema.
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    schemas: IndexMap<String, NodeSchema>,
}

impl NodeTypeRegistry {
    /// Registry holding the built-in `root`, `text` and `paragraph` types.
    pub fn new() -> Self {
        let mut schemas = IndexMap::new();
        for schema in [
            NodeSchema::new(ROOT_TYPE, NodeKind::Root),
            NodeSchema::new(TEXT_TYPE, NodeKind::Text),
            NodeSchema::new(PARAGRAPH_TYPE, NodeKind::Element),
        ] {
            schemas.insert(schema.node_type.clone(), schema);
        }
        Self { schemas }
    }

    /// Register or replace a node type.
    ///
    /// The `root` and `text` built-ins cannot be redefined, no other type
    /// may produce root nodes, and extension fields may not shadow the
    /// generic node fields.
    pub fn register(&mut self, schema: NodeSchema) -> Result<(), EditorError> {
        if schema.node_type.is_empty() {
            return Err(schema.violation("type tag must not be empty"));
        }
        if schema.node_type == ROOT_TYPE || schema.node_type == TEXT_TYPE {
            return Err(schema.violation("built-in type cannot be redefined"));
        }
        if schema.kind == NodeKind::Root {
            return Err(schema.violation("only the built-in root type may have kind root"));
        }
        for (i, spec) in schema.fields.iter().enumerate() {
            if RESERVED_FIELDS.contains(&spec.name.as_str()) {
                return Err(schema.violation(format!("field `{}` is reserved", spec.name)));
            }
            if schema.fields[..i].iter().any(|f| f.name == spec.name) {
                return Err(schema.violation(format!("field `{}` declared twice", spec.name)));
            }
        }
        tracing::debug!(node_type = %schema.node_type, kind = %schema.kind, "registered node type");
        self.schemas.insert(schema.node_type.clone(), schema);
        Ok(())
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeSchema> {
        self.schemas.get(node_type)
    }

    pub fn resolve(&self, node_type: &str) -> Result<&NodeSchema, EditorError> {
        self.get(node_type)
            .ok_or_else(|| EditorError::UnknownNodeType(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.schemas.contains_key(node_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeSchema> {
        self.schemas.values()
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
