// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Configuration for the vocabulary store.

use serde::{Deserialize, Serialize};

use crate::error::{LexiconError, Result};

/// Strings shorter than this many code points are always admitted permanently.
pub const DEFAULT_SHORT_LEN: usize = 3;

/// Every new lexeme is admitted permanently until this many are indexed.
pub const DEFAULT_BOOTSTRAP_LEN: usize = 10_000;

/// Batch size used when pruning vectors without an explicit batch size.
pub const DEFAULT_PRUNE_BATCH_SIZE: usize = 1024;

/// Configuration for a [`Vocab`](crate::Vocab).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabConfig {
    /// Code-point length below which a lexeme is always permanent.
    pub short_len: usize,

    /// Permanent count below which every new lexeme is permanent.
    pub bootstrap_len: usize,

    /// Capacity of the permanent arena. Set to 0 for unlimited.
    pub max_lexemes: usize,

    /// Records to pre-reserve in the permanent arena and index.
    pub initial_capacity: usize,

    /// Name given to the initial vector table.
    pub vectors_name: Option<String>,

    /// Batch size for [`Vocab::prune_vectors_default`](crate::Vocab::prune_vectors_default).
    pub prune_batch_size: usize,
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            short_len: DEFAULT_SHORT_LEN,
            bootstrap_len: DEFAULT_BOOTSTRAP_LEN,
            max_lexemes: 0,
            initial_capacity: 0,
            vectors_name: None,
            prune_batch_size: DEFAULT_PRUNE_BATCH_SIZE,
        }
    }
}

impl VocabConfig {
    /// Admission by string length only: no bootstrap window.
    #[must_use]
    pub fn length_only(short_len: usize) -> Self {
        Self {
            short_len,
            bootstrap_len: 0,
            ..Default::default()
        }
    }

    /// Default admission with a bounded permanent arena.
    #[must_use]
    pub fn with_max_lexemes(max_lexemes: usize) -> Self {
        Self {
            max_lexemes,
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::Serialization`] if the JSON does not describe a config.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LexiconError::Serialization(e.to_string()))
    }
}
