//! The editor handle.
//!
//! An [`Editor`] owns the currently published [`EditorState`] and is the only
//! way to produce a new one.  Readers clone the published `Arc` and keep a
//! consistent snapshot for as long as they hold it; [`Editor::update`] builds
//! the next snapshot in a [`Transaction`] and swaps it in on commit.
//!
//! One update runs at a time.  Updates are rejected while the calling thread
//! is inside a read closure or another update closure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, instrument, warn};

use crate::codec::json;
use crate::config::EditorConfig;
use crate::diff::{self, StateDiff};
use crate::error::EditorError;
use crate::key::{KeyGenerator, NodeKey};
use crate::node::NodeTypeRegistry;
use crate::scope::{self, Scope, ScopeGuard};
use crate::state::EditorState;
use crate::transaction::Transaction;

pub type UpdateListener = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Delivered to update listeners after a new state is published.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    pub prev: Arc<EditorState>,
    pub next: Arc<EditorState>,
    /// Keys created or written by the update that are still in `next`.
    pub dirty: Vec<NodeKey>,
    /// Keys removed by the reachability sweep.
    pub collected: Vec<NodeKey>,
}

impl UpdateEvent {
    pub fn diff(&self) -> StateDiff {
        diff::diff(&self.prev, &self.next)
    }
}

pub struct Editor {
    current: RwLock<Arc<EditorState>>,
    writer: Mutex<()>,
    keys: KeyGenerator,
    registry: NodeTypeRegistry,
    config: EditorConfig,
    listeners: Mutex<BTreeMap<u64, UpdateListener>>,
    next_listener_id: AtomicU64,
}

impl Editor {
    /// Editor over an empty document with the built-in node types.
    pub fn new() -> Self {
        Self::from_parts(EditorConfig::default(), NodeTypeRegistry::new())
    }

    pub fn with_config(config: EditorConfig) -> Result<Self, EditorError> {
        let registry = config.registry()?;
        Ok(Self::from_parts(config, registry))
    }

    fn from_parts(config: EditorConfig, registry: NodeTypeRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(EditorState::empty())),
            writer: Mutex::new(()),
            keys: KeyGenerator::new(),
            registry,
            config,
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Start from `state` instead of an empty document.
    pub fn with_initial_state(mut self, state: EditorState) -> Self {
        self.observe_keys(&state);
        *self.current.get_mut().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    /// The currently published state.
    pub fn state(&self) -> Arc<EditorState> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Run `f` over the current state inside a read scope.
    pub fn read<R>(&self, f: impl FnOnce(&EditorState) -> R) -> R {
        self.state().read(f)
    }

    /// Run `f` against a transaction over the current state and publish the
    /// result.
    ///
    /// Nothing is published when `f` returns an error or panics, when commit
    /// validation fails, or when `f` changed nothing.  Listeners run after
    /// publication, inside a read scope.
    #[instrument(skip(self, f), fields(namespace = %self.config.namespace))]
    pub fn update<F, R>(&self, f: F) -> Result<R, EditorError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R, EditorError>,
    {
        ensure_writable()?;
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = self.state();

        let (value, commit) = {
            let _scope = ScopeGuard::enter(Scope::Update);
            let mut tx = Transaction::open(&prev, &self.keys, &self.registry);
            let value = f(&mut tx).inspect_err(|err| warn!(error = %err, "update aborted"))?;
            if tx.is_noop() {
                debug!("update changed nothing");
                return Ok(value);
            }
            let commit = tx
                .commit()
                .inspect_err(|err| warn!(error = %err, "commit rejected"))?;
            (value, commit)
        };

        let next = Arc::new(commit.state);
        self.publish(Arc::clone(&next));
        debug!(
            nodes = next.len(),
            dirty = commit.dirty.len(),
            collected = commit.collected.len(),
            "published update"
        );
        self.notify(&UpdateEvent {
            prev,
            next,
            dirty: commit.dirty,
            collected: commit.collected,
        });
        Ok(value)
    }

    /// Replace the current state wholesale.
    ///
    /// Listeners see every added or changed key as dirty and every dropped
    /// key as collected.
    #[instrument(skip(self, state), fields(namespace = %self.config.namespace, nodes = state.len()))]
    pub fn set_state(&self, state: EditorState) -> Result<(), EditorError> {
        ensure_writable()?;
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.observe_keys(&state);
        let prev = self.state();
        let next = Arc::new(state);
        self.publish(Arc::clone(&next));

        let changes = diff::diff(&prev, &next);
        let mut dirty = changes.added;
        dirty.extend(changes.updated);
        self.notify(&UpdateEvent {
            prev,
            next,
            dirty,
            collected: changes.removed,
        });
        Ok(())
    }

    /// Parse canonical JSON against this editor's node types.  The result is
    /// not published; pass it to [`Editor::set_state`].
    pub fn parse_state(&self, text: &str) -> Result<EditorState, EditorError> {
        json::from_str(text, &self.registry)
    }

    pub fn register_update_listener<F>(&self, listener: F) -> u64
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        id
    }

    pub fn unregister_update_listener(&self, listener_id: u64) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&listener_id)
            .is_some()
    }

    fn observe_keys(&self, state: &EditorState) {
        for key in state.node_map().keys() {
            self.keys.observe(key);
        }
    }

    fn publish(&self, next: Arc<EditorState>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn notify(&self, event: &UpdateEvent) {
        // Snapshot so listeners may register or unregister while running.
        let listeners: Vec<UpdateListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        if listeners.is_empty() {
            return;
        }
        let _scope = ScopeGuard::enter(Scope::Read);
        for listener in listeners {
            listener(event);
        }
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("namespace", &self.config.namespace)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn ensure_writable() -> Result<(), EditorError> {
    match scope::current() {
        Scope::Idle => Ok(()),
        Scope::Read => Err(EditorError::ReadOnlyViolation),
        Scope::Update => Err(EditorError::NestedUpdate),
    }
}
