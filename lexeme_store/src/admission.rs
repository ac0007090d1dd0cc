// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Admission policy: which new lexemes become permanent.

use crate::config::VocabConfig;

/// Decides whether a new lexeme is admitted to the permanent arena.
///
/// Implemented for any `Fn(&str, usize) -> bool`, where the second argument
/// is the number of permanently admitted lexemes.
pub trait AdmissionPolicy: Send + Sync {
    fn is_permanent(&self, text: &str, permanent_count: usize) -> bool;
}

impl<F> AdmissionPolicy for F
where
    F: Fn(&str, usize) -> bool + Send + Sync,
{
    fn is_permanent(&self, text: &str, permanent_count: usize) -> bool {
        self(text, permanent_count)
    }
}

/// Short strings are always permanent, and so is everything while the
/// vocabulary is still below its bootstrap size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthOrBootstrap {
    pub short_len: usize,
    pub bootstrap_len: usize,
}

impl LengthOrBootstrap {
    #[must_use]
    pub const fn new(short_len: usize, bootstrap_len: usize) -> Self {
        Self {
            short_len,
            bootstrap_len,
        }
    }
}

impl From<&VocabConfig> for LengthOrBootstrap {
    fn from(config: &VocabConfig) -> Self {
        Self::new(config.short_len, config.bootstrap_len)
    }
}

impl AdmissionPolicy for LengthOrBootstrap {
    fn is_permanent(&self, text: &str, permanent_count: usize) -> bool {
        permanent_count < self.bootstrap_len || text.chars().count() < self.short_len
    }
}
