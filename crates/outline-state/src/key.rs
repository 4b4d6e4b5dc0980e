//! Node identity.
//!
//! Every node is addressed by a [`NodeKey`]: either the `"root"` sentinel or
//! a decimal value issued by a per-editor [`KeyGenerator`].  Keys are assigned
//! once at creation and never change for the lifetime of the node.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Key of the single root node of every editor state.
pub const ROOT_KEY: &str = "root";

/// Stable string identifier of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The root sentinel key.
    pub fn root() -> Self {
        Self(ROOT_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_KEY
    }

    /// Counter value of a generated key, `None` for the root sentinel and
    /// for foreign keys that are not plain decimals.
    pub fn counter_value(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl Deref for NodeKey {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl PartialEq<str> for NodeKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ── KeyGenerator ──────────────────────────────────────────────────────────

/// Monotonic key source shared by all transactions of one editor.
///
/// Keys consumed by an aborted transaction are never reissued.  The counter
/// value `u64::MAX` is never issued; once `next` reaches it the generator is
/// exhausted.
#[derive(Debug)]
pub struct KeyGenerator {
    next: AtomicU64,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    /// Issue a fresh key, `None` once the counter is exhausted.
    pub fn issue(&self) -> Option<NodeKey> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .ok()
            .map(|value| NodeKey(value.to_string()))
    }

    /// Make sure future keys never collide with `key`.
    pub fn observe(&self, key: &NodeKey) {
        if let Some(value) = key.counter_value() {
            let next = value.checked_add(1).unwrap_or(u64::MAX);
            self.next.fetch_max(next, Ordering::Relaxed);
        }
    }

    /// The value the next issued key will carry.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_increasing_decimal_keys() {
        let keys = KeyGenerator::new();
        assert_eq!(keys.issue().unwrap(), "1");
        assert_eq!(keys.issue().unwrap(), "2");
        assert_eq!(keys.peek(), 3);
    }

    #[test]
    fn observe_skips_past_loaded_keys() {
        let keys = KeyGenerator::new();
        keys.observe(&NodeKey::new("41"));
        keys.observe(&NodeKey::root());
        keys.observe(&NodeKey::new("7"));
        assert_eq!(keys.issue().unwrap(), "42");
    }

    #[test]
    fn observing_the_largest_key_exhausts_instead_of_wrapping() {
        let keys = KeyGenerator::new();
        keys.observe(&NodeKey::new(u64::MAX.to_string()));
        assert_eq!(keys.peek(), u64::MAX);
        assert_eq!(keys.issue(), None);
        assert_eq!(keys.issue(), None);

        let keys = KeyGenerator::new();
        keys.observe(&NodeKey::new((u64::MAX - 2).to_string()));
        assert_eq!(keys.issue().unwrap(), (u64::MAX - 1).to_string().as_str());
        assert_eq!(keys.issue(), None);
    }

    #[test]
    fn counter_value_rejects_foreign_keys() {
        assert_eq!(NodeKey::new("12").counter_value(), Some(12));
        assert_eq!(NodeKey::root().counter_value(), None);
        assert_eq!(NodeKey::new("-3").counter_value(), None);
        assert_eq!(NodeKey::new("").counter_value(), None);
    }
}
