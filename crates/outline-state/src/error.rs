use thiserror::Error;

use crate::key::NodeKey;
use crate::node::NodeKind;
use crate::selection::PointKind;

/// Every failure the editor state core can report.
#[derive(Debug, Error)]
pub enum EditorError {
    /// Children reference a missing key, parent/child back-references
    /// disagree, or a mutation would create a cycle.
    #[error("structural integrity violated: {0}")]
    StructuralIntegrity(String),
    #[error("cannot mutate editor state inside a read scope")]
    ReadOnlyViolation,
    #[error("offset {offset} out of range for node {key} (length {len})")]
    InvalidOffset {
        key: NodeKey,
        offset: usize,
        len: usize,
    },
    /// A serialized state whose references do not close.
    #[error("malformed editor state: {0}")]
    MalformedState(String),
    #[error("node not found: {0}")]
    NodeNotFound(NodeKey),
    #[error("node {key} is {actual}, expected {expected}")]
    WrongNodeKind {
        key: NodeKey,
        expected: &'static str,
        actual: NodeKind,
    },
    #[error("{kind} selection point cannot address node {key}")]
    InvalidSelectionPoint { key: NodeKey, kind: PointKind },
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("schema violation for node type {node_type}: {reason}")]
    SchemaViolation { node_type: String, reason: String },
    #[error("an update is already running on this thread")]
    NestedUpdate,
    #[error("no node keys left to issue")]
    KeysExhausted,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid editor config: {0}")]
    Config(String),
}
