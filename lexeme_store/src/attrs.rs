// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Computed lexeme attributes and the flag registry.
//!
//! Attribute values are never derived here. Callers register getters
//! (`&str -> Option<AttrValue>`) per attribute and boolean flag predicates per
//! bit; the vocabulary applies them when a lexeme is created and, for flags,
//! replays them over every indexed lexeme at registration time.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::{LexiconError, Result};

/// Lowest assignable flag bit. Bit 0 is reserved.
pub const MIN_FLAG_BIT: u32 = 1;

/// Highest assignable flag bit.
pub const MAX_FLAG_BIT: u32 = 63;

/// Attribute slot of a lexeme record filled by a registered getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LexAttr {
    Lower,
    Norm,
    Shape,
    Prefix,
    Suffix,
    Lang,
    Cluster,
    Prob,
    Sentiment,
}

impl LexAttr {
    pub const ALL: [Self; 9] = [
        Self::Lower,
        Self::Norm,
        Self::Shape,
        Self::Prefix,
        Self::Suffix,
        Self::Lang,
        Self::Cluster,
        Self::Prob,
        Self::Sentiment,
    ];

    /// Whether the slot stores an interned string key.
    #[must_use]
    pub const fn is_string_valued(self) -> bool {
        matches!(
            self,
            Self::Lower | Self::Norm | Self::Shape | Self::Prefix | Self::Suffix | Self::Lang
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Norm => "norm",
            Self::Shape => "shape",
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::Lang => "lang",
            Self::Cluster => "cluster",
            Self::Prob => "prob",
            Self::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for LexAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value produced by an attribute getter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Int(u64),
    Float(f32),
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

/// Attribute getter: `None` leaves the slot untouched.
pub type AttrGetter = Arc<dyn Fn(&str) -> Option<AttrValue> + Send + Sync>;

/// Boolean flag predicate over a lexeme's surface string.
pub type FlagGetter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Ordered list of attribute getters owned by one vocabulary.
#[derive(Clone, Default)]
pub struct AttrGetters {
    entries: Vec<(LexAttr, AttrGetter)>,
}

impl AttrGetters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a getter. An existing getter for the same attribute is
    /// replaced in place, keeping its position.
    pub fn set(&mut self, attr: LexAttr, getter: AttrGetter) {
        if let Some(slot) = self.entries.iter_mut().find(|(a, _)| *a == attr) {
            slot.1 = getter;
        } else {
            self.entries.push((attr, getter));
        }
    }

    #[must_use]
    pub fn get(&self, attr: LexAttr) -> Option<&AttrGetter> {
        self.entries
            .iter()
            .find(|(a, _)| *a == attr)
            .map(|(_, getter)| getter)
    }

    pub fn remove(&mut self, attr: LexAttr) -> Option<AttrGetter> {
        let pos = self.entries.iter().position(|(a, _)| *a == attr)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LexAttr, &AttrGetter)> + '_ {
        self.entries.iter().map(|(attr, getter)| (*attr, getter))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for AttrGetters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(attr, _)| attr))
            .finish()
    }
}

/// Mapping from flag bit (1..=63) to its predicate.
#[derive(Clone)]
pub struct FlagRegistry {
    getters: [Option<FlagGetter>; 64],
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self {
            getters: std::array::from_fn(|_| None),
        }
    }
}

impl FlagRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the bit a registration would use without registering it.
    ///
    /// An explicit bit must lie in `1..=63` and may replace an existing flag.
    /// Without one, the lowest unused bit is chosen.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::InvalidFlagId`] for an explicit bit outside
    /// `1..=63`, or [`LexiconError::NoFreeBits`] when every bit is taken.
    pub fn resolve_bit(&self, bit: Option<u32>) -> Result<u32> {
        match bit {
            Some(bit) if (MIN_FLAG_BIT..=MAX_FLAG_BIT).contains(&bit) => Ok(bit),
            Some(bit) => Err(LexiconError::InvalidFlagId(bit)),
            None => (MIN_FLAG_BIT..=MAX_FLAG_BIT)
                .find(|&b| self.getters[b as usize].is_none())
                .ok_or(LexiconError::NoFreeBits),
        }
    }

    /// Register a flag predicate, returning the bit it occupies.
    ///
    /// # Errors
    ///
    /// See [`resolve_bit`](Self::resolve_bit).
    pub fn register(&mut self, getter: FlagGetter, bit: Option<u32>) -> Result<u32> {
        let bit = self.resolve_bit(bit)?;
        self.getters[bit as usize] = Some(getter);
        Ok(bit)
    }

    #[must_use]
    pub fn get(&self, bit: u32) -> Option<&FlagGetter> {
        self.getters.get(bit as usize).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn is_registered(&self, bit: u32) -> bool {
        self.get(bit).is_some()
    }

    /// Iterate registered `(bit, predicate)` pairs in bit order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FlagGetter)> + '_ {
        self.getters
            .iter()
            .enumerate()
            .filter_map(|(bit, getter)| getter.as_ref().map(|g| (bit as u32, g)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.getters.iter().filter(|g| g.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate every registered flag over `text` into a bitset.
    #[must_use]
    pub fn evaluate(&self, text: &str) -> u64 {
        self.iter()
            .filter(|(_, getter)| getter(text))
            .fold(0u64, |bits, (bit, _)| bits | (1u64 << bit))
    }
}

impl fmt::Debug for FlagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(bit, _)| bit))
            .finish()
    }
}
