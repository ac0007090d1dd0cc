// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Externally locked vocabulary handle.
//!
//! `Vocab` assumes a single mutator. `SharedVocab` supplies that exclusion
//! with a reader-writer lock: any number of readers between mutations, one
//! writer at a time.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{config::VocabConfig, vocab::Vocab};

/// Cloneable, thread-safe handle to one vocabulary.
#[derive(Debug, Clone, Default)]
pub struct SharedVocab {
    inner: Arc<RwLock<Vocab>>,
}

impl SharedVocab {
    #[must_use]
    pub fn new(vocab: Vocab) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vocab)),
        }
    }

    #[must_use]
    pub fn with_config(config: VocabConfig) -> Self {
        Self::new(Vocab::with_config(config))
    }

    /// Shared access. Blocks while a writer holds the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, Vocab> {
        self.inner.read()
    }

    /// Exclusive access. Blocks until every reader has released the lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vocab> {
        self.inner.write()
    }

    /// Unwrap the vocabulary if this is the last handle.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if other clones are still alive.
    pub fn try_into_inner(self) -> std::result::Result<Vocab, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl From<Vocab> for SharedVocab {
    fn from(vocab: Vocab) -> Self {
        Self::new(vocab)
    }
}
