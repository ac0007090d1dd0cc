// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! `LexemeStore` - interning vocabulary store for NLP pipelines
//!
//! Maps every distinct word to a stable 64-bit key and a shared record of
//! orthography-derived attributes, with an attached word-vector table:
//! - Append-only string interner with deterministic keys
//! - Lexeme records in bulk-freed arenas, permanent or caller-owned transient
//! - Pluggable attribute getters and up to 63 boolean flags per lexeme
//! - Vector table with growth, subword synthesis and nearest-neighbor pruning
//! - Directory and blob persistence with per-field exclusion
//!
//! # Example
//!
//! ```
//! use lexeme_store::{LexAttr, LexemeArena, Pool, Vocab, VocabConfig};
//!
//! let mut vocab = Vocab::with_config(VocabConfig::length_only(3));
//! vocab.set_attr_getter(LexAttr::Lower, |s| Some(s.to_lowercase().into()));
//!
//! let mut scratch = LexemeArena::new();
//! vocab.get_or_create(Pool::Transient(&mut scratch), "a").unwrap();
//! vocab.get_or_create(Pool::Transient(&mut scratch), "Elephant").unwrap();
//!
//! assert!(vocab.contains("a"));
//! assert!(!vocab.contains("Elephant"));
//! assert_eq!(vocab.lexeme("Dog").unwrap().lower(), "dog");
//! ```

pub mod admission;
pub mod arena;
pub mod attrs;
pub mod config;
pub mod error;
pub mod lexeme;
pub mod lookups;
pub mod serialize;
pub mod shared;
pub mod strings;
pub mod vectors;
pub mod vocab;

pub use admission::{AdmissionPolicy, LengthOrBootstrap};
pub use arena::{ArenaId, LexemeArena, LexemeId, Pool};
pub use attrs::{
    AttrGetter, AttrGetters, AttrValue, FlagGetter, FlagRegistry, LexAttr, MAX_FLAG_BIT,
    MIN_FLAG_BIT,
};
pub use config::VocabConfig;
pub use error::{LexiconError, Result};
pub use lexeme::{Lexeme, LexemeRecord, SlotValue, EMPTY_LEXEME, OOV_RANK};
pub use lookups::{Lookups, Table, NORM_EXCEPTIONS_TABLE};
pub use serialize::Field;
pub use shared::SharedVocab;
pub use strings::{hash_key, StringKey, StringStore, StringStoreSnapshot};
pub use vectors::{
    char_ngrams, cosine_similarity, Neighbor, PrunedKey, VectorTable, VectorTableSnapshot,
};
pub use vocab::{PruneRemap, Vocab};
