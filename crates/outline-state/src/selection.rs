//! Selection model.
//!
//! A [`Selection`] is an anchor/focus pair of [`Point`]s.  A text point is a
//! character offset into a text node's payload; an element point is a child
//! boundary inside a root/element node.  Offsets are checked when a point is
//! set and are never clamped.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::key::NodeKey;
use crate::node::NodeKind;
use crate::node_map::{NodeMap, NodeMapExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Text,
    Element,
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Element => "element",
        })
    }
}

/// One selection endpoint.  Serializes as `{key, offset, type}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
    #[serde(rename = "type")]
    pub kind: PointKind,
}

impl Point {
    pub fn new(key: impl Into<NodeKey>, offset: usize, kind: PointKind) -> Self {
        Self {
            key: key.into(),
            offset,
            kind,
        }
    }

    pub fn text(key: impl Into<NodeKey>, offset: usize) -> Self {
        Self::new(key, offset, PointKind::Text)
    }

    pub fn element(key: impl Into<NodeKey>, offset: usize) -> Self {
        Self::new(key, offset, PointKind::Element)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    /// A caret: anchor and focus at the same point.
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// `true` when the focus precedes the anchor in document order.
    ///
    /// Points inside detached nodes have no document position and are never
    /// considered backward.
    pub fn is_backward(&self, map: &NodeMap) -> bool {
        if self.anchor.key == self.focus.key {
            return self.focus.offset < self.anchor.offset;
        }
        match (map.path_to(&self.anchor.key), map.path_to(&self.focus.key)) {
            (Some(anchor), Some(focus)) => compare_points(&anchor, &self.anchor, &focus, &self.focus) == Ordering::Greater,
            _ => false,
        }
    }

    pub(crate) fn references(&self, key: &str) -> bool {
        self.anchor.key.as_str() == key || self.focus.key.as_str() == key
    }
}

/// Order two points by tree path, treating an element point as sitting in
/// front of its `offset`-th child.
fn compare_points(a_path: &[usize], a: &Point, b_path: &[usize], b: &Point) -> Ordering {
    let position = |path: &[usize], point: &Point| -> Vec<usize> {
        let mut pos = path.to_vec();
        if point.kind == PointKind::Element {
            pos.push(point.offset);
        }
        pos
    };
    position(a_path, a).cmp(&position(b_path, b))
}

/// Check that `point` addresses a node of the right kind and that its
/// offset lies in `0..=len`.
pub(crate) fn validate_point(map: &NodeMap, point: &Point) -> Result<(), EditorError> {
    let node = map
        .node(&point.key)
        .ok_or_else(|| EditorError::NodeNotFound(point.key.clone()))?;
    let len = match (point.kind, node.kind()) {
        (PointKind::Text, NodeKind::Text) => node.text_payload().map_or(0, |t| t.chars().count()),
        (PointKind::Element, NodeKind::Root | NodeKind::Element) => node.children().len(),
        (kind, _) => {
            return Err(EditorError::InvalidSelectionPoint {
                key: point.key.clone(),
                kind,
            })
        }
    };
    if point.offset > len {
        return Err(EditorError::InvalidOffset {
            key: point.key.clone(),
            offset: point.offset,
            len,
        });
    }
    Ok(())
}

pub(crate) fn validate_selection(map: &NodeMap, selection: &Selection) -> Result<(), EditorError> {
    validate_point(map, &selection.anchor)?;
    validate_point(map, &selection.focus)
}
