// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! The vocabulary: interner, lexicon index, vectors and lookups in one owner.
//!
//! `Vocab` resolves or creates lexemes by string or key. New lexemes are
//! populated from the registered attribute getters and flags, and either
//! admitted to the permanent arena (and indexed) or allocated in a
//! caller-supplied transient arena, as decided by the [`AdmissionPolicy`].
//!
//! # Thread Safety
//!
//! None built in. Every mutating method takes `&mut self`; wrap the vocabulary
//! in a [`SharedVocab`](crate::SharedVocab) to share it across threads.

use std::{collections::HashMap, fmt};

use rustc_hash::FxHashMap;
use tracing::{debug, instrument, warn};

use crate::{
    admission::{AdmissionPolicy, LengthOrBootstrap},
    arena::{LexemeArena, LexemeId, Pool},
    attrs::{AttrGetter, AttrGetters, AttrValue, FlagGetter, FlagRegistry, LexAttr},
    config::VocabConfig,
    error::Result,
    lexeme::{Lexeme, LexemeRecord, SlotValue, EMPTY_LEXEME},
    lookups::{Lookups, Table, NORM_EXCEPTIONS_TABLE},
    strings::{hash_key, StringKey, StringStore},
    vectors::{char_ngrams, VectorTable},
};

/// Word -> (nearest surviving word, cosine similarity) produced by pruning.
pub type PruneRemap = HashMap<String, (String, f32)>;

/// Interning lexeme store with an attached vector table.
pub struct Vocab {
    pub(crate) config: VocabConfig,
    pub(crate) strings: StringStore,
    /// Permanent records. Every record here is indexed.
    pub(crate) arena: LexemeArena,
    pub(crate) index: FxHashMap<StringKey, LexemeId>,
    getters: AttrGetters,
    flags: FlagRegistry,
    /// Norm overrides composited from the `lexeme_norm` lookup table.
    norm_exceptions: Option<Table>,
    admission: Box<dyn AdmissionPolicy>,
    pub(crate) vectors: VectorTable,
    pub(crate) lookups: Lookups,
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocab {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(VocabConfig::default())
    }

    /// Create a vocabulary using the length-or-bootstrap policy from `config`.
    #[must_use]
    pub fn with_config(config: VocabConfig) -> Self {
        let policy = LengthOrBootstrap::from(&config);
        Self::with_policy(config, policy)
    }

    /// Create a vocabulary with a custom admission policy.
    #[must_use]
    pub fn with_policy<P>(config: VocabConfig, policy: P) -> Self
    where
        P: AdmissionPolicy + 'static,
    {
        let mut vectors = VectorTable::default();
        vectors.set_name(config.vectors_name.clone());
        Self {
            strings: StringStore::with_capacity(config.initial_capacity),
            arena: LexemeArena::with_limit(config.initial_capacity, config.max_lexemes),
            index: FxHashMap::with_capacity_and_hasher(config.initial_capacity, Default::default()),
            getters: AttrGetters::new(),
            flags: FlagRegistry::new(),
            norm_exceptions: None,
            admission: Box::new(policy),
            vectors,
            lookups: Lookups::new(),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &VocabConfig {
        &self.config
    }

    #[must_use]
    pub const fn strings(&self) -> &StringStore {
        &self.strings
    }

    /// Intern a string without creating a lexeme.
    pub fn intern(&mut self, text: &str) -> StringKey {
        self.strings.intern(text)
    }

    /// Number of permanently admitted lexemes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether `text` has a permanent lexeme.
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.strings
            .key_of(text)
            .is_some_and(|key| self.index.contains_key(&key))
    }

    #[must_use]
    pub fn contains_orth(&self, orth: StringKey) -> bool {
        self.index.contains_key(&orth)
    }

    /// Resolve or create the lexeme for `text`.
    ///
    /// The empty string always yields [`LexemeId::EMPTY`]. An indexed lexeme
    /// is returned as is. Otherwise a record is built and placed in the
    /// permanent arena when `pool` is permanent or the admission policy
    /// accepts it, else in the transient arena of `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::AllocationError`](crate::LexiconError::AllocationError)
    /// if the chosen arena cannot grow.
    pub fn get_or_create(&mut self, pool: Pool<'_>, text: &str) -> Result<LexemeId> {
        if text.is_empty() {
            return Ok(LexemeId::EMPTY);
        }
        let orth = self.strings.intern(text);
        if let Some(&id) = self.index.get(&orth) {
            return Ok(id);
        }
        self.create(pool, orth, text)
    }

    /// Like [`get_or_create`](Self::get_or_create), starting from a key.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::UnknownKey`](crate::LexiconError::UnknownKey)
    /// if a missing lexeme's key was never interned, or an allocation error.
    pub fn get_or_create_by_orth(&mut self, pool: Pool<'_>, orth: StringKey) -> Result<LexemeId> {
        if orth.is_empty() {
            return Ok(LexemeId::EMPTY);
        }
        if let Some(&id) = self.index.get(&orth) {
            return Ok(id);
        }
        let text = self.strings.resolve(orth)?.to_owned();
        self.create(pool, orth, &text)
    }

    fn create(&mut self, pool: Pool<'_>, orth: StringKey, text: &str) -> Result<LexemeId> {
        let permanent = pool.is_permanent() || self.admission.is_permanent(text, self.index.len());
        let record = self.build_record(orth, text);

        match pool {
            Pool::Transient(arena) if !permanent => arena.alloc(record),
            _ => {
                let id = self.arena.alloc(record)?;
                self.index.insert(orth, id);
                debug!(orth = orth.as_u64(), permanent = self.index.len(), "admitted lexeme");
                Ok(id)
            },
        }
    }

    fn build_record(&mut self, orth: StringKey, text: &str) -> LexemeRecord {
        #[allow(clippy::cast_possible_truncation)]
        let length = text.chars().count().min(u32::MAX as usize) as u32;
        let mut record = LexemeRecord::new(orth, length);
        record.set_row(self.vectors.find_row(orth));

        let exception = self
            .norm_exceptions
            .as_ref()
            .and_then(|table| table.get(text))
            .map(AttrValue::from);
        let mut norm_applied = false;
        for (attr, getter) in self.getters.iter() {
            let value = match attr {
                LexAttr::Norm => {
                    norm_applied = true;
                    exception.clone().or_else(|| getter(text))
                },
                _ => getter(text),
            };
            if let Some(value) = value {
                write_slot(&mut self.strings, &mut record, attr, value);
            }
        }
        if !norm_applied {
            if let Some(value) = exception {
                write_slot(&mut self.strings, &mut record, LexAttr::Norm, value);
            }
        }

        record.set_flag_bits(self.flags.evaluate(text));
        record
    }

    /// Get-or-create in the permanent pool and return a view.
    ///
    /// # Errors
    ///
    /// Returns an allocation error if the permanent arena cannot grow.
    pub fn lexeme(&mut self, text: &str) -> Result<Lexeme<'_>> {
        let orth = self.strings.intern(text);
        self.get_or_create_by_orth(Pool::Permanent, orth)?;
        Ok(Lexeme::new(self, orth))
    }

    /// View of the permanent lexeme for `text`, if indexed.
    #[must_use]
    pub fn get(&self, text: &str) -> Option<Lexeme<'_>> {
        if text.is_empty() {
            return Some(Lexeme::new(self, StringKey::EMPTY));
        }
        let orth = self.strings.key_of(text)?;
        self.get_by_orth(orth)
    }

    #[must_use]
    pub fn get_by_orth(&self, orth: StringKey) -> Option<Lexeme<'_>> {
        if orth.is_empty() || self.index.contains_key(&orth) {
            Some(Lexeme::new(self, orth))
        } else {
            None
        }
    }

    /// Resolve a handle issued by the permanent arena (or the empty handle).
    #[must_use]
    pub fn record(&self, id: LexemeId) -> Option<&LexemeRecord> {
        if id.is_empty() {
            return Some(&EMPTY_LEXEME);
        }
        self.arena.get(id)
    }

    /// Resolve a handle from either the permanent arena or `pool`.
    #[must_use]
    pub fn resolve_in<'a>(&'a self, pool: &'a LexemeArena, id: LexemeId) -> Option<&'a LexemeRecord> {
        self.record(id).or_else(|| pool.get(id))
    }

    #[must_use]
    pub fn record_by_orth(&self, orth: StringKey) -> Option<&LexemeRecord> {
        if orth.is_empty() {
            return Some(&EMPTY_LEXEME);
        }
        self.index.get(&orth).and_then(|&id| self.arena.get(id))
    }

    /// Iterate permanent lexemes in admission order.
    pub fn iter(&self) -> impl Iterator<Item = Lexeme<'_>> + '_ {
        self.arena.iter().map(move |record| Lexeme::new(self, record.orth()))
    }

    /// Register the getter for an attribute, replacing any previous one.
    ///
    /// Applies to lexemes created afterwards.
    pub fn set_attr_getter<F>(&mut self, attr: LexAttr, getter: F)
    where
        F: Fn(&str) -> Option<AttrValue> + Send + Sync + 'static,
    {
        let getter: AttrGetter = std::sync::Arc::new(getter);
        self.getters.set(attr, getter);
    }

    #[must_use]
    pub const fn attr_getters(&self) -> &AttrGetters {
        &self.getters
    }

    /// Register a flag predicate and replay it over every indexed lexeme.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::InvalidFlagId`](crate::LexiconError::InvalidFlagId)
    /// for an explicit bit outside `1..=63` or
    /// [`LexiconError::NoFreeBits`](crate::LexiconError::NoFreeBits) when none
    /// is left. Nothing is modified on error.
    #[instrument(skip(self, getter))]
    pub fn add_flag<F>(&mut self, getter: F, bit: Option<u32>) -> Result<u32>
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let bit = self.flags.resolve_bit(bit)?;
        let getter: FlagGetter = std::sync::Arc::new(getter);
        for record in self.arena.iter_mut() {
            let text = self.strings.resolve(record.orth())?;
            record.set_flag(bit, getter(text))?;
        }
        self.flags.register(getter, Some(bit))?;
        debug!(bit, lexemes = self.arena.len(), "registered flag");
        Ok(bit)
    }

    #[must_use]
    pub const fn flags(&self) -> &FlagRegistry {
        &self.flags
    }

    /// Set a flag on the permanent lexeme of `orth`, creating it if needed.
    ///
    /// The empty lexeme is shared and immutable; writes to it are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid bit, an unknown key or a failed allocation.
    pub fn set_flag(&mut self, orth: StringKey, bit: u32, value: bool) -> Result<()> {
        let id = self.get_or_create_by_orth(Pool::Permanent, orth)?;
        match self.arena.get_mut(id) {
            Some(record) => record.set_flag(bit, value),
            None => Ok(()),
        }
    }

    /// Overwrite one attribute slot on the permanent lexeme of `orth`.
    ///
    /// Returns whether the value fit the slot. The empty lexeme is never written.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown key or a failed allocation.
    pub fn set_attr(&mut self, orth: StringKey, attr: LexAttr, value: AttrValue) -> Result<bool> {
        let id = self.get_or_create_by_orth(Pool::Permanent, orth)?;
        let Some(record) = self.arena.get_mut(id) else {
            return Ok(false);
        };
        Ok(write_slot(&mut self.strings, record, attr, value))
    }

    #[must_use]
    pub const fn vectors(&self) -> &VectorTable {
        &self.vectors
    }

    /// Width of the vector table.
    #[must_use]
    pub const fn vectors_length(&self) -> usize {
        self.vectors.dims()
    }

    /// Replace the vector table wholesale.
    pub fn set_vectors(&mut self, vectors: VectorTable) {
        self.vectors = vectors;
        self.refresh_ranks();
    }

    /// Drop all vectors, keeping the table name.
    ///
    /// `width` defaults to the current width and `rows` to 0.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::InvalidShape`](crate::LexiconError::InvalidShape)
    /// if the table cannot be allocated; the old table is kept.
    pub fn reset_vectors(&mut self, width: Option<usize>, rows: Option<usize>) -> Result<()> {
        let width = width.unwrap_or(self.vectors.dims());
        let mut table = VectorTable::new(rows.unwrap_or(0), width)?;
        table.set_name(self.vectors.name().map(str::to_string));
        self.set_vectors(table);
        Ok(())
    }

    #[must_use]
    pub fn has_vector(&self, text: &str) -> bool {
        self.strings
            .key_of(text)
            .is_some_and(|key| self.vectors.contains(key))
    }

    /// The assigned vector of `text`, else its n-gram synthesis over the
    /// whole word length.
    #[must_use]
    pub fn get_vector(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.strings.key_of(text).and_then(|key| self.vectors.lookup(key)) {
            return vector.to_vec();
        }
        self.get_vector_ngrams(text, None, None)
    }

    /// Mean vector of the character n-grams of `text` with lengths in
    /// `min_n..=max_n` that have rows; both default to the word length.
    ///
    /// N-grams that were never interned are looked up by their unprobed hash,
    /// so subword tables keyed by [`hash_key`] work without the n-gram strings.
    #[must_use]
    pub fn get_vector_ngrams(&self, text: &str, min_n: Option<usize>, max_n: Option<usize>) -> Vec<f32> {
        let length = text.chars().count();
        let min_n = min_n.unwrap_or(length);
        let max_n = max_n.unwrap_or(length);
        let keys = char_ngrams(text, min_n, max_n)
            .into_iter()
            .map(|gram| self.strings.key_of(gram).unwrap_or_else(|| hash_key(gram, 0)));
        self.vectors.average(keys)
    }

    /// Subword fallback vector for an interned key.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::UnknownKey`](crate::LexiconError::UnknownKey)
    /// if the key was never interned.
    pub fn synthesize_vector(&self, orth: StringKey, min_n: Option<usize>, max_n: Option<usize>) -> Result<Vec<f32>> {
        let text = self.strings.resolve(orth)?;
        Ok(self.get_vector_ngrams(text, min_n, max_n))
    }

    /// Assign a vector to `text`, growing the table if needed, and record the
    /// row on its permanent lexeme.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::DimensionMismatch`](crate::LexiconError::DimensionMismatch)
    /// before any mutation if the width conflicts with the table, or an
    /// allocation error for the lexeme.
    pub fn set_vector(&mut self, text: &str, vector: &[f32]) -> Result<usize> {
        let dims = self.vectors.dims();
        if dims != 0 && vector.len() != dims {
            return Err(crate::LexiconError::DimensionMismatch {
                expected: dims,
                got: vector.len(),
            });
        }
        let orth = self.strings.intern(text);
        let id = self.get_or_create_by_orth(Pool::Permanent, orth)?;
        let row = self.vectors.assign(orth, vector)?;
        if let Some(record) = self.arena.get_mut(id) {
            record.set_row(Some(row));
        }
        Ok(row)
    }

    /// Shrink the vector table to `target_rows`, remapping the rest onto
    /// their nearest survivors.
    ///
    /// Every vector key first gets a permanent lexeme so its `prob` attribute
    /// drives the ranking.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::UnknownKey`](crate::LexiconError::UnknownKey) if
    /// a vector key has no interned string, or
    /// [`LexiconError::NoSurvivingRows`](crate::LexiconError::NoSurvivingRows)
    /// for a zero target. The vector table is untouched on error.
    #[instrument(skip(self))]
    pub fn prune_vectors(&mut self, target_rows: usize, batch_size: usize) -> Result<PruneRemap> {
        let keys: Vec<StringKey> = self.vectors.keys().collect();
        for &key in &keys {
            self.strings.resolve(key)?;
        }
        for &key in &keys {
            self.get_or_create_by_orth(Pool::Permanent, key)?;
        }

        let index = &self.index;
        let arena = &self.arena;
        let pruned = self.vectors.prune(target_rows, batch_size, |key| {
            index
                .get(&key)
                .and_then(|&id| arena.get(id))
                .map_or(0.0, LexemeRecord::prob)
        })?;
        self.refresh_ranks();

        let mut remap = PruneRemap::with_capacity(pruned.len());
        for entry in pruned {
            let word = self.strings.resolve(entry.key)?.to_string();
            let synonym = self.strings.resolve(entry.survivor)?.to_string();
            remap.insert(word, (synonym, entry.score));
        }
        Ok(remap)
    }

    /// [`prune_vectors`](Self::prune_vectors) with the configured batch size.
    ///
    /// # Errors
    ///
    /// See [`prune_vectors`](Self::prune_vectors).
    pub fn prune_vectors_default(&mut self, target_rows: usize) -> Result<PruneRemap> {
        self.prune_vectors(target_rows, self.config.prune_batch_size)
    }

    fn refresh_ranks(&mut self) {
        for record in self.arena.iter_mut() {
            record.set_row(self.vectors.find_row(record.orth()));
        }
    }

    #[must_use]
    pub const fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    /// Replace the lookups and re-composite the norm exceptions.
    ///
    /// A `lexeme_norm` table replaces any previously composited one; without
    /// it the norm getter runs unmodified.
    pub fn set_lookups(&mut self, lookups: Lookups) {
        self.norm_exceptions = lookups.get_table(NORM_EXCEPTIONS_TABLE).ok().cloned();
        self.lookups = lookups;
    }

    #[must_use]
    pub const fn norm_exceptions(&self) -> Option<&Table> {
        self.norm_exceptions.as_ref()
    }

    /// Drop the lexicon index and every permanent record.
    ///
    /// Handles from the old permanent arena stop resolving.
    pub(crate) fn invalidate_index(&mut self) {
        self.index.clear();
        self.arena = LexemeArena::with_limit(self.config.initial_capacity, self.config.max_lexemes);
    }
}

impl fmt::Debug for Vocab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocab")
            .field("lexemes", &self.index.len())
            .field("strings", &self.strings.len())
            .field("vectors", &self.vectors.shape())
            .field("flags", &self.flags)
            .field("getters", &self.getters)
            .field("lookups", &self.lookups.len())
            .finish_non_exhaustive()
    }
}

/// Intern string results and store a getter value in its slot.
///
/// Values that do not fit the slot are logged and skipped.
fn write_slot(strings: &mut StringStore, record: &mut LexemeRecord, attr: LexAttr, value: AttrValue) -> bool {
    let slot = match value {
        AttrValue::Str(s) if attr.is_string_valued() => SlotValue::Key(strings.intern(&s)),
        AttrValue::Str(_) => {
            warn!(%attr, "string value for numeric attribute skipped");
            return false;
        },
        AttrValue::Int(v) => SlotValue::Int(v),
        AttrValue::Float(v) => SlotValue::Float(v),
    };
    let written = record.set_slot(attr, slot);
    if !written {
        warn!(%attr, "attribute value does not fit slot; skipped");
    }
    written
}
