// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Integration test helpers for lexeme_store.
//!
//! Provides vocabularies pre-populated with attribute getters, flags and
//! vectors for cross-module scenarios.

use lexeme_store::{AttrValue, LexAttr, Lookups, Table, Vocab, VocabConfig, NORM_EXCEPTIONS_TABLE};

/// Width of the sample embeddings.
pub const SAMPLE_DIMS: usize = 8;

/// Deterministic pseudo-embedding for a seed.
pub fn sample_vector(seed: usize) -> Vec<f32> {
    (0..SAMPLE_DIMS)
        .map(|i| ((seed * 17 + i) as f32 / 10.0).sin())
        .collect()
}

/// Install the getters a typical English pipeline registers.
pub fn install_english_getters(vocab: &mut Vocab) {
    vocab.set_attr_getter(LexAttr::Lower, |s| Some(s.to_lowercase().into()));
    vocab.set_attr_getter(LexAttr::Norm, |s| Some(s.to_lowercase().into()));
    vocab.set_attr_getter(LexAttr::Prefix, |s| {
        Some(s.chars().take(1).collect::<String>().into())
    });
    vocab.set_attr_getter(LexAttr::Suffix, |s| {
        let chars: Vec<char> = s.chars().collect();
        let start = chars.len().saturating_sub(3);
        Some(chars[start..].iter().collect::<String>().into())
    });
    vocab.set_attr_getter(LexAttr::Shape, |s| Some(word_shape(s).into()));
    vocab.set_attr_getter(LexAttr::Lang, |_| Some("en".into()));
}

/// Collapse a word into its character-class shape, e.g. "Rust2" -> "Xxxxd".
pub fn word_shape(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_uppercase() {
                'X'
            } else if c.is_lowercase() {
                'x'
            } else if c.is_ascii_digit() {
                'd'
            } else {
                c
            }
        })
        .collect()
}

/// Register the `is_alpha` / `is_digit` / `is_title` flags, returning their bits.
pub fn install_flags(vocab: &mut Vocab) -> (u32, u32, u32) {
    let is_alpha = vocab
        .add_flag(|s| !s.is_empty() && s.chars().all(char::is_alphabetic), None)
        .unwrap();
    let is_digit = vocab
        .add_flag(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()), None)
        .unwrap();
    let is_title = vocab
        .add_flag(|s| s.chars().next().is_some_and(char::is_uppercase), None)
        .unwrap();
    (is_alpha, is_digit, is_title)
}

/// Norm exceptions for contractions and slang.
pub fn sample_lookups() -> Lookups {
    let mut lookups = Lookups::new();
    lookups.set_table(Table::from_entries(
        NORM_EXCEPTIONS_TABLE,
        [("gonna", "going to"), ("cos", "because"), ("u", "you")],
    ));
    lookups
        .add_table("lemma")
        .unwrap()
        .set("ran", "run");
    lookups
}

/// A vocabulary with getters, lookups and vectors for `words`.
///
/// Earlier words get a higher `prob`, so they survive pruning first.
pub fn populated_vocab(words: &[&str]) -> Vocab {
    let mut vocab = Vocab::with_config(VocabConfig::default());
    install_english_getters(&mut vocab);
    let ranking: Vec<String> = words.iter().map(|w| (*w).to_string()).collect();
    vocab.set_attr_getter(LexAttr::Prob, move |s| {
        ranking
            .iter()
            .position(|w| w == s)
            .map(|i| AttrValue::Float(-(i as f32) - 1.0))
    });
    vocab.set_lookups(sample_lookups());
    for (i, word) in words.iter().enumerate() {
        vocab.set_vector(word, &sample_vector(i)).unwrap();
    }
    vocab
}

/// Words shared by the scenario tests.
pub fn sample_words() -> Vec<&'static str> {
    vec![
        "the", "of", "and", "to", "in", "is", "was", "cat", "dog", "house", "garden", "river",
        "mountain", "elephant", "giraffe", "keyboard",
    ]
}
