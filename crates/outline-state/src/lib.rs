//! outline-state: immutable editor state for structured rich text.
//!
//! A document is a tree of [`Node`]s addressed by stable [`NodeKey`]s and
//! stored in an ordered [`NodeMap`].  An [`EditorState`] pairs that map with
//! an optional [`Selection`] and never changes once published.  New states are
//! produced by [`Editor::update`], which runs a [`Transaction`] over a
//! copy-on-write working copy, sweeps unreachable nodes and swaps the result
//! in.
//!
//! ```
//! use outline_state::{Editor, PARAGRAPH_TYPE};
//!
//! let editor = Editor::new();
//! editor
//!     .update(|tx| {
//!         let p = tx.create_element(PARAGRAPH_TYPE)?;
//!         let t = tx.create_text("Hello world")?;
//!         tx.append(&p, &t)?;
//!         tx.append("root", &p)?;
//!         tx.select_text(&t, 6, 11)
//!     })
//!     .unwrap();
//! assert_eq!(editor.read(|state| state.text().to_string()), "Hello world");
//! ```

pub mod codec;
pub mod config;
pub mod diff;
pub mod editor;
pub mod error;
pub mod gc;
mod integrity;
pub mod key;
pub mod node;
pub mod node_map;
mod scope;
pub mod selection;
pub mod state;
pub mod transaction;

pub use config::EditorConfig;
pub use diff::{diff, StateDiff};
pub use editor::{Editor, UpdateEvent, UpdateListener};
pub use error::EditorError;
pub use key::{KeyGenerator, NodeKey, ROOT_KEY};
pub use node::{
    FieldSpec, Node, NodeBody, NodeFlags, NodeKind, NodeSchema, NodeTypeRegistry, PARAGRAPH_TYPE, ROOT_TYPE,
    TEXT_TYPE,
};
pub use node_map::{NodeMap, NodeMapExt};
pub use selection::{Point, PointKind, Selection};
pub use state::EditorState;
pub use transaction::Transaction;
