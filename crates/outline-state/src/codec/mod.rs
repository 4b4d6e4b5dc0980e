//! Editor state codecs.
//!
//! - [`json`]: canonical ordered JSON snapshot (`_nodeMap` + `_selection`)

pub mod json;
