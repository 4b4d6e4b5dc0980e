//! Editor configuration.
//!
//! An [`EditorConfig`] names the editor and declares the node types it
//! accepts beyond the built-in ones.  It loads from JSON with camelCase field
//! names or is assembled with the `with_*` builders.
//! [`EditorConfig::registry`] turns it into the [`NodeTypeRegistry`] an
//! editor validates against.

use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::node::{NodeSchema, NodeTypeRegistry};

pub const DEFAULT_NAMESPACE: &str = "outline";

/// Editor configuration.
///
/// ```json
/// {
///   "namespace": "notes",
///   "nodeTypes": [
///     {"type": "heading", "kind": "element", "fields": [{"name": "tag", "required": true}]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Editor name, attached to log spans
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Node types registered on top of the built-ins
    #[serde(default)]
    pub node_types: Vec<NodeSchema>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            node_types: vec![],
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EditorError> {
        serde_json::from_str(json).map_err(|e| EditorError::Config(e.to_string()))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_node_type(mut self, schema: NodeSchema) -> Self {
        self.node_types.push(schema);
        self
    }

    /// Built-in registry extended with the configured node types.
    pub fn registry(&self) -> Result<NodeTypeRegistry, EditorError> {
        let mut registry = NodeTypeRegistry::new();
        for schema in &self.node_types {
            registry
                .register(schema.clone())
                .map_err(|e| EditorError::Config(e.to_string()))?;
        }
        Ok(registry)
    }
}
