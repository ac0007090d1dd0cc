// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Append-only string interner with stable 64-bit keys.
//!
//! The `StringStore` maps every distinct string to a `StringKey` derived from
//! a deterministic hash of its UTF-8 bytes. Keys never change once assigned
//! and are never reused: there is no removal operation.
//!
//! # Design Philosophy
//!
//! The key is the hash, not a position. Two stores that intern the same
//! strings in the same order agree on every key, so keys can be persisted
//! next to vectors and lexeme attributes without a translation table.
//! The empty string always maps to the reserved key 0 and is never stored.

use std::{
    fmt,
    hash::Hasher,
    sync::Arc,
};

use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};

use crate::error::{LexiconError, Result};

/// Stable interned identity of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StringKey(pub u64);

impl StringKey {
    /// Key of the empty string.
    pub const EMPTY: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StringKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StringKey {
    fn from(key: u64) -> Self {
        Self(key)
    }
}

impl From<StringKey> for u64 {
    fn from(key: StringKey) -> Self {
        key.0
    }
}

/// Hash a string's bytes with the given probe seed.
///
/// Seed 0 is the plain hash; higher seeds are only used after a collision.
#[inline]
#[must_use]
pub fn hash_key(text: &str, seed: u64) -> StringKey {
    let mut hasher = FxHasher::default();
    if seed > 0 {
        hasher.write_u64(seed);
    }
    hasher.write(text.as_bytes());
    StringKey(hasher.finish())
}

/// Bidirectional string <-> key table.
///
/// # Performance
///
/// - `intern`: O(1) amortized
/// - `key_of`: O(1)
/// - `resolve`: O(1)
#[derive(Debug, Default, Clone)]
pub struct StringStore {
    /// Keys in insertion order.
    order: Vec<StringKey>,
    by_key: FxHashMap<StringKey, Arc<str>>,
    by_text: FxHashMap<Arc<str>, StringKey>,
}

impl StringStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            order: Vec::with_capacity(capacity),
            by_key: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            by_text: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Intern a string, returning its stable key.
    ///
    /// Idempotent: interning the same string twice returns the same key.
    pub fn intern(&mut self, text: &str) -> StringKey {
        if text.is_empty() {
            return StringKey::EMPTY;
        }
        if let Some(&key) = self.by_text.get(text) {
            return key;
        }

        // Probe past reserved key 0 and keys already held by other strings.
        let mut seed = 0u64;
        let key = loop {
            let candidate = hash_key(text, seed);
            if !candidate.is_empty() && !self.by_key.contains_key(&candidate) {
                break candidate;
            }
            seed += 1;
        };

        let shared: Arc<str> = Arc::from(text);
        self.by_key.insert(key, Arc::clone(&shared));
        self.by_text.insert(shared, key);
        self.order.push(key);
        key
    }

    /// Resolve a key back to its string.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::UnknownKey`] if the key was never interned.
    pub fn resolve(&self, key: StringKey) -> Result<&str> {
        if key.is_empty() {
            return Ok("");
        }
        self.by_key
            .get(&key)
            .map(AsRef::as_ref)
            .ok_or(LexiconError::UnknownKey(key))
    }

    /// Look up the key of a string without interning it.
    #[must_use]
    pub fn key_of(&self, text: &str) -> Option<StringKey> {
        if text.is_empty() {
            return Some(StringKey::EMPTY);
        }
        self.by_text.get(text).copied()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.key_of(text).is_some()
    }

    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: StringKey) -> bool {
        key.is_empty() || self.by_key.contains_key(&key)
    }

    /// Number of interned strings, not counting the empty string.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate `(key, string)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (StringKey, &str)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.by_key.get(key).map(|text| (*key, text.as_ref())))
    }

    /// Get serializable state for persistence.
    #[must_use]
    pub fn snapshot(&self) -> StringStoreSnapshot {
        StringStoreSnapshot {
            entries: self
                .iter()
                .map(|(key, text)| (key, text.to_string()))
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot, keeping every persisted key.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::MalformedPersistedState`] if the snapshot holds
    /// the reserved key 0, an empty string, or a duplicated key or string.
    pub fn restore(snapshot: StringStoreSnapshot) -> Result<Self> {
        let mut store = Self::with_capacity(snapshot.entries.len());
        for (key, text) in snapshot.entries {
            if key.is_empty() || text.is_empty() {
                return Err(LexiconError::MalformedPersistedState(format!(
                    "reserved empty key or string in interner snapshot (key {key})"
                )));
            }
            if store.by_key.contains_key(&key) {
                return Err(LexiconError::MalformedPersistedState(format!(
                    "duplicate interned key {key}"
                )));
            }
            if store.by_text.contains_key(text.as_str()) {
                return Err(LexiconError::MalformedPersistedState(format!(
                    "duplicate interned string {text:?}"
                )));
            }
            let shared: Arc<str> = Arc::from(text);
            store.by_key.insert(key, Arc::clone(&shared));
            store.by_text.insert(shared, key);
            store.order.push(key);
        }
        Ok(store)
    }
}

/// Serializable snapshot of `StringStore` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringStoreSnapshot {
    entries: Vec<(StringKey, String)>,
}

impl StringStoreSnapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
