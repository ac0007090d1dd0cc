// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Fixed-layout lexeme records and the borrowed `Lexeme` view.

use serde::{Deserialize, Serialize};

use crate::{
    attrs::{LexAttr, MAX_FLAG_BIT, MIN_FLAG_BIT},
    error::{LexiconError, Result},
    strings::StringKey,
    vectors::cosine_similarity,
    vocab::Vocab,
};

/// Rank of a lexeme with no vector row.
pub const OOV_RANK: u64 = u64::MAX;

/// The shared record of the empty string. Never allocated, never indexed.
pub static EMPTY_LEXEME: LexemeRecord = LexemeRecord::new(StringKey::EMPTY, 0);

/// Slot value after string results have been interned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotValue {
    Key(StringKey),
    Int(u64),
    Float(f32),
}

/// Orthography-derived attributes of one interned string.
///
/// The orth key is fixed at construction; every other slot may be
/// overwritten in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LexemeRecord {
    orth: StringKey,
    length: u32,
    flags: u64,
    rank: u64,
    lower: StringKey,
    norm: StringKey,
    shape: StringKey,
    prefix: StringKey,
    suffix: StringKey,
    lang: StringKey,
    cluster: u64,
    prob: f32,
    sentiment: f32,
}

impl LexemeRecord {
    #[must_use]
    pub const fn new(orth: StringKey, length: u32) -> Self {
        Self {
            orth,
            length,
            flags: 0,
            rank: OOV_RANK,
            lower: StringKey::EMPTY,
            norm: StringKey::EMPTY,
            shape: StringKey::EMPTY,
            prefix: StringKey::EMPTY,
            suffix: StringKey::EMPTY,
            lang: StringKey::EMPTY,
            cluster: 0,
            prob: 0.0,
            sentiment: 0.0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn orth(&self) -> StringKey {
        self.orth
    }

    /// Length in code points.
    #[inline]
    #[must_use]
    pub const fn length(&self) -> u32 {
        self.length
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> u64 {
        self.flags
    }

    /// Raw vector rank; [`OOV_RANK`] when no row is assigned.
    #[inline]
    #[must_use]
    pub const fn rank(&self) -> u64 {
        self.rank
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn row(&self) -> Option<usize> {
        if self.rank == OOV_RANK {
            None
        } else {
            Some(self.rank as usize)
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_oov(&self) -> bool {
        self.rank == OOV_RANK
    }

    pub fn set_row(&mut self, row: Option<usize>) {
        self.rank = row.map_or(OOV_RANK, |r| r as u64);
    }

    /// Key stored in a string-valued slot; `None` for numeric attributes.
    #[must_use]
    pub const fn attr_key(&self, attr: LexAttr) -> Option<StringKey> {
        match attr {
            LexAttr::Lower => Some(self.lower),
            LexAttr::Norm => Some(self.norm),
            LexAttr::Shape => Some(self.shape),
            LexAttr::Prefix => Some(self.prefix),
            LexAttr::Suffix => Some(self.suffix),
            LexAttr::Lang => Some(self.lang),
            LexAttr::Cluster | LexAttr::Prob | LexAttr::Sentiment => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn cluster(&self) -> u64 {
        self.cluster
    }

    #[inline]
    #[must_use]
    pub const fn prob(&self) -> f32 {
        self.prob
    }

    #[inline]
    #[must_use]
    pub const fn sentiment(&self) -> f32 {
        self.sentiment
    }

    /// Write a slot. Returns `false` if the value kind does not fit the slot.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_slot(&mut self, attr: LexAttr, value: SlotValue) -> bool {
        match (attr, value) {
            (LexAttr::Lower, SlotValue::Key(k)) => self.lower = k,
            (LexAttr::Norm, SlotValue::Key(k)) => self.norm = k,
            (LexAttr::Shape, SlotValue::Key(k)) => self.shape = k,
            (LexAttr::Prefix, SlotValue::Key(k)) => self.prefix = k,
            (LexAttr::Suffix, SlotValue::Key(k)) => self.suffix = k,
            (LexAttr::Lang, SlotValue::Key(k)) => self.lang = k,
            (LexAttr::Cluster, SlotValue::Int(v)) => self.cluster = v,
            (LexAttr::Prob, SlotValue::Float(v)) => self.prob = v,
            (LexAttr::Prob, SlotValue::Int(v)) => self.prob = v as f32,
            (LexAttr::Sentiment, SlotValue::Float(v)) => self.sentiment = v,
            (LexAttr::Sentiment, SlotValue::Int(v)) => self.sentiment = v as f32,
            _ => return false,
        }
        true
    }

    #[inline]
    #[must_use]
    pub const fn check_flag(&self, bit: u32) -> bool {
        bit < 64 && (self.flags & (1u64 << bit)) != 0
    }

    /// Set or clear one flag bit.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::InvalidFlagId`] if `bit` is outside `1..=63`.
    pub fn set_flag(&mut self, bit: u32, value: bool) -> Result<()> {
        if !(MIN_FLAG_BIT..=MAX_FLAG_BIT).contains(&bit) {
            return Err(LexiconError::InvalidFlagId(bit));
        }
        if value {
            self.flags |= 1u64 << bit;
        } else {
            self.flags &= !(1u64 << bit);
        }
        Ok(())
    }

    pub(crate) fn set_flag_bits(&mut self, bits: u64) {
        self.flags |= bits;
    }
}

/// Non-owning view of a permanent lexeme.
///
/// Holds only the vocabulary and the orth key; every accessor re-resolves
/// into the vocabulary.
#[derive(Clone, Copy)]
pub struct Lexeme<'v> {
    vocab: &'v Vocab,
    orth: StringKey,
}

impl<'v> Lexeme<'v> {
    pub(crate) const fn new(vocab: &'v Vocab, orth: StringKey) -> Self {
        Self { vocab, orth }
    }

    #[inline]
    #[must_use]
    pub const fn orth(&self) -> StringKey {
        self.orth
    }

    /// The underlying record. Falls back to the empty lexeme for the empty string.
    #[must_use]
    pub fn record(&self) -> &'v LexemeRecord {
        self.vocab.record_by_orth(self.orth).unwrap_or(&EMPTY_LEXEME)
    }

    #[must_use]
    pub fn text(&self) -> &'v str {
        self.vocab.strings().resolve(self.orth).unwrap_or_default()
    }

    fn attr_text(&self, attr: LexAttr) -> &'v str {
        self.record()
            .attr_key(attr)
            .and_then(|key| self.vocab.strings().resolve(key).ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.record().length()
    }

    #[must_use]
    pub fn flags(&self) -> u64 {
        self.record().flags()
    }

    #[must_use]
    pub fn check_flag(&self, bit: u32) -> bool {
        self.record().check_flag(bit)
    }

    #[must_use]
    pub fn lower(&self) -> &'v str {
        self.attr_text(LexAttr::Lower)
    }

    #[must_use]
    pub fn norm(&self) -> &'v str {
        self.attr_text(LexAttr::Norm)
    }

    #[must_use]
    pub fn shape(&self) -> &'v str {
        self.attr_text(LexAttr::Shape)
    }

    #[must_use]
    pub fn prefix(&self) -> &'v str {
        self.attr_text(LexAttr::Prefix)
    }

    #[must_use]
    pub fn suffix(&self) -> &'v str {
        self.attr_text(LexAttr::Suffix)
    }

    #[must_use]
    pub fn lang(&self) -> &'v str {
        self.attr_text(LexAttr::Lang)
    }

    #[must_use]
    pub fn cluster(&self) -> u64 {
        self.record().cluster()
    }

    #[must_use]
    pub fn prob(&self) -> f32 {
        self.record().prob()
    }

    #[must_use]
    pub fn sentiment(&self) -> f32 {
        self.record().sentiment()
    }

    #[must_use]
    pub fn rank(&self) -> u64 {
        self.record().rank()
    }

    #[must_use]
    pub fn has_vector(&self) -> bool {
        self.vocab.vectors().contains(self.orth)
    }

    #[must_use]
    pub fn vector(&self) -> Option<&'v [f32]> {
        self.vocab.vectors().lookup(self.orth)
    }

    /// L2 norm of the vector, 0.0 without one.
    #[must_use]
    pub fn vector_norm(&self) -> f32 {
        self.vector()
            .map_or(0.0, |v| v.iter().map(|x| x * x).sum::<f32>().sqrt())
    }

    /// Cosine similarity of the two vectors, 0.0 if either is missing.
    #[must_use]
    pub fn similarity(&self, other: &Lexeme<'_>) -> f32 {
        match (self.vector(), other.vector()) {
            (Some(a), Some(b)) => cosine_similarity(a, b),
            _ => 0.0,
        }
    }
}

impl std::fmt::Debug for Lexeme<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lexeme")
            .field("orth", &self.orth)
            .field("text", &self.text())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_oov() {
        let rec = LexemeRecord::new(StringKey::new(10), 4);
        assert_eq!(rec.orth(), StringKey::new(10));
        assert_eq!(rec.length(), 4);
        assert!(rec.is_oov());
        assert_eq!(rec.row(), None);
        assert_eq!(rec.flags(), 0);
    }

    #[test]
    fn test_empty_lexeme() {
        assert_eq!(EMPTY_LEXEME.orth(), StringKey::EMPTY);
        assert_eq!(EMPTY_LEXEME.length(), 0);
        assert!(EMPTY_LEXEME.is_oov());
    }

    #[test]
    fn test_set_row() {
        let mut rec = LexemeRecord::new(StringKey::new(1), 1);
        rec.set_row(Some(7));
        assert_eq!(rec.row(), Some(7));
        assert_eq!(rec.rank(), 7);
        rec.set_row(None);
        assert_eq!(rec.rank(), OOV_RANK);
    }

    #[test]
    fn test_set_flag_bounds() {
        let mut rec = LexemeRecord::new(StringKey::new(1), 1);
        rec.set_flag(5, true).unwrap();
        assert!(rec.check_flag(5));
        rec.set_flag(5, false).unwrap();
        assert!(!rec.check_flag(5));

        assert!(matches!(
            rec.set_flag(0, true),
            Err(LexiconError::InvalidFlagId(0))
        ));
        assert!(matches!(
            rec.set_flag(64, true),
            Err(LexiconError::InvalidFlagId(64))
        ));
        assert!(!rec.check_flag(64));
    }

    #[test]
    fn test_set_slot_kinds() {
        let mut rec = LexemeRecord::new(StringKey::new(1), 1);
        assert!(rec.set_slot(LexAttr::Norm, SlotValue::Key(StringKey::new(9))));
        assert_eq!(rec.attr_key(LexAttr::Norm), Some(StringKey::new(9)));

        assert!(rec.set_slot(LexAttr::Prob, SlotValue::Float(-3.5)));
        assert_eq!(rec.prob(), -3.5);
        assert!(rec.set_slot(LexAttr::Sentiment, SlotValue::Int(2)));
        assert_eq!(rec.sentiment(), 2.0);
        assert!(rec.set_slot(LexAttr::Cluster, SlotValue::Int(42)));
        assert_eq!(rec.cluster(), 42);

        assert!(!rec.set_slot(LexAttr::Cluster, SlotValue::Float(1.0)));
        assert!(!rec.set_slot(LexAttr::Lower, SlotValue::Int(1)));
        assert!(!rec.set_slot(LexAttr::Prob, SlotValue::Key(StringKey::new(3))));
        assert_eq!(rec.orth(), StringKey::new(1));
    }
}
