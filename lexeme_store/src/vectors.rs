// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Dense vector table keyed by interned strings.
//!
//! `VectorTable` stores a row-major `rows x dims` f32 matrix and a key -> row
//! map. Several keys may share a row (pruning remaps discarded keys onto
//! their nearest survivor). The width is fixed for the table's lifetime;
//! resizing and pruning build a new table and swap it in.
//!
//! # Design Philosophy
//!
//! - One contiguous allocation, rows addressed by offset
//! - Unassigned rows tracked lazily: a cursor past which every row is free,
//!   plus an ordered set of rows released below it
//! - Growth only through explicit replacement (`resized`, `assign`, `prune`)

use std::collections::BTreeSet;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    error::{LexiconError, Result},
    strings::StringKey,
};

/// Minimum row count after automatic growth.
pub const MIN_GROWTH_ROWS: usize = 100;

/// Cosine similarity of two equal-length vectors. Zero vectors score 0.0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / norm).collect()
}

/// Contiguous code-point substrings of `word` with lengths in `min_n..=max_n`.
///
/// Boundaries fall on `char` boundaries only, so multi-byte sequences are
/// never split. A one-character n-gram is skipped when it is the whole word.
/// Repeated substrings are returned once per occurrence.
#[must_use]
pub fn char_ngrams(word: &str, min_n: usize, max_n: usize) -> Vec<&str> {
    let bounds: Vec<usize> = word
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(word.len()))
        .collect();
    let n_chars = bounds.len() - 1;
    let mut ngrams = Vec::new();

    for start in 0..n_chars {
        for n in min_n.max(1)..=max_n {
            let end = start + n;
            if end > n_chars {
                break;
            }
            if n == 1 && n_chars == 1 {
                continue;
            }
            ngrams.push(&word[bounds[start]..bounds[end]]);
        }
    }
    ngrams
}

/// Nearest row found for a query vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    /// Lowest key pointing at `row`.
    pub key: StringKey,
    pub score: f32,
}

/// A key dropped from the matrix by pruning and where it now points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrunedKey {
    pub key: StringKey,
    pub survivor: StringKey,
    pub score: f32,
}

/// Dense `rows x dims` matrix with a key -> row map.
#[derive(Debug, Clone, Default)]
pub struct VectorTable {
    name: Option<String>,
    rows: usize,
    dims: usize,
    data: Vec<f32>,
    key2row: FxHashMap<StringKey, usize>,
    /// Every row at or past this cursor is unassigned.
    next_free: usize,
    /// Unassigned rows below `next_free`.
    freed: BTreeSet<usize>,
}

impl VectorTable {
    /// Create a zero-filled table with every row unassigned.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::InvalidShape`] if `rows x dims` overflows or
    /// the matrix cannot be allocated.
    pub fn new(rows: usize, dims: usize) -> Result<Self> {
        let len = rows
            .checked_mul(dims)
            .ok_or(LexiconError::InvalidShape { rows, dims })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| LexiconError::InvalidShape { rows, dims })?;
        data.resize(len, 0.0);
        Ok(Self {
            name: None,
            rows,
            dims,
            data,
            key2row: FxHashMap::default(),
            next_free: 0,
            freed: BTreeSet::new(),
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    /// `(rows, dims)`.
    #[inline]
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.dims)
    }

    #[inline]
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims
    }

    /// Number of keys with a row. May exceed `rows` after pruning.
    #[inline]
    #[must_use]
    pub fn n_keys(&self) -> usize {
        self.key2row.len()
    }

    /// True when no unassigned row is left.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.first_unset().is_none()
    }

    /// Lowest row no key points at.
    fn first_unset(&self) -> Option<usize> {
        self.freed
            .first()
            .copied()
            .or((self.next_free < self.rows).then_some(self.next_free))
    }

    fn mark_taken(&mut self, row: usize) {
        if row < self.next_free {
            self.freed.remove(&row);
        } else {
            self.freed.extend(self.next_free..row);
            self.next_free = row + 1;
        }
    }

    /// Return `row` to the free rows if no key points at it any more.
    fn release(&mut self, row: usize) {
        if row < self.next_free && !self.key2row.values().any(|&r| r == row) {
            self.freed.insert(row);
        }
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: StringKey) -> bool {
        self.key2row.contains_key(&key)
    }

    #[inline]
    #[must_use]
    pub fn find_row(&self, key: StringKey) -> Option<usize> {
        self.key2row.get(&key).copied()
    }

    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.dims;
        Some(&self.data[start..start + self.dims])
    }

    /// Row data for a row the key map points at. Key map rows are always in bounds.
    fn row_slice(&self, row: usize) -> &[f32] {
        let start = row * self.dims;
        &self.data[start..start + self.dims]
    }

    /// Exact lookup of the row assigned to `key`.
    #[must_use]
    pub fn lookup(&self, key: StringKey) -> Option<&[f32]> {
        self.find_row(key).and_then(|row| self.row(row))
    }

    pub fn keys(&self) -> impl Iterator<Item = StringKey> + '_ {
        self.key2row.keys().copied()
    }

    /// Iterate `(key, row, vector)` triples in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (StringKey, usize, &[f32])> + '_ {
        self.key2row.iter().filter_map(|(&key, &row)| {
            self.row(row).map(|vector| (key, row, vector))
        })
    }

    /// Point `key` at a row, optionally writing `vector` into it.
    ///
    /// Without an explicit `row`, an existing key keeps its row and a new key
    /// takes the lowest unassigned one.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::DimensionMismatch`] for a vector of the wrong
    /// width, [`LexiconError::RowOutOfBounds`] for an explicit row past the
    /// end, or [`LexiconError::TableFull`] when a new key finds no free row.
    pub fn add(&mut self, key: StringKey, vector: Option<&[f32]>, row: Option<usize>) -> Result<usize> {
        if let Some(vector) = vector {
            if vector.len() != self.dims {
                return Err(LexiconError::DimensionMismatch {
                    expected: self.dims,
                    got: vector.len(),
                });
            }
        }
        let row = match row {
            Some(row) if row >= self.rows => {
                return Err(LexiconError::RowOutOfBounds {
                    row,
                    rows: self.rows,
                })
            },
            Some(row) => row,
            None => match self.find_row(key) {
                Some(row) => row,
                None => self
                    .first_unset()
                    .ok_or(LexiconError::TableFull { rows: self.rows })?,
            },
        };

        if let Some(vector) = vector {
            let start = row * self.dims;
            self.data[start..start + self.dims].copy_from_slice(vector);
        }
        let previous = self.key2row.insert(key, row);
        self.mark_taken(row);
        if let Some(old) = previous.filter(|&old| old != row) {
            self.release(old);
        }
        Ok(row)
    }

    /// Insert or overwrite the vector for `key`, growing the table when it is
    /// full and the key is new.
    ///
    /// Growth builds a table of `max(100, floor(1.3 * rows))` rows. A table
    /// with no width yet adopts the vector's width.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::DimensionMismatch`] before any mutation if the
    /// table has a width and the vector does not match it, or
    /// [`LexiconError::InvalidShape`] if the grown table cannot be allocated.
    pub fn assign(&mut self, key: StringKey, vector: &[f32]) -> Result<usize> {
        if self.dims != 0 && vector.len() != self.dims {
            return Err(LexiconError::DimensionMismatch {
                expected: self.dims,
                got: vector.len(),
            });
        }
        let needs_width = self.dims == 0 && !vector.is_empty();
        if needs_width || (self.is_full() && !self.contains(key)) {
            let rows = if self.is_full() {
                MIN_GROWTH_ROWS.max(self.rows * 13 / 10)
            } else {
                self.rows.max(MIN_GROWTH_ROWS)
            };
            debug!(from = self.rows, to = rows, dims = vector.len(), "growing vector table");
            let (grown, _) = self.resized(rows, vector.len())?;
            *self = grown;
        }
        self.add(key, Some(vector), None)
    }

    /// Build a new table of the given shape.
    ///
    /// The overlapping block is copied and the rest zero-filled. Keys whose
    /// row falls outside the new shape are dropped and returned.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::InvalidShape`] if the new matrix cannot be allocated.
    pub fn resized(&self, rows: usize, dims: usize) -> Result<(Self, Vec<(StringKey, usize)>)> {
        let mut table = Self::new(rows, dims)?;
        table.name = self.name.clone();

        let copy_rows = rows.min(self.rows);
        let copy_dims = dims.min(self.dims);
        for row in 0..copy_rows {
            let src = row * self.dims;
            let dst = row * dims;
            table.data[dst..dst + copy_dims].copy_from_slice(&self.data[src..src + copy_dims]);
        }

        let mut kept: Vec<(usize, StringKey)> = Vec::with_capacity(self.key2row.len());
        let mut dropped = Vec::new();
        for (&key, &row) in &self.key2row {
            if row < rows {
                kept.push((row, key));
            } else {
                dropped.push((key, row));
            }
        }
        kept.sort_unstable();
        for (row, key) in kept {
            table.key2row.insert(key, row);
            table.mark_taken(row);
        }
        dropped.sort_unstable();
        Ok((table, dropped))
    }

    /// Mean of the vectors assigned to `keys`; zero vector if none have one.
    ///
    /// Every occurrence counts, so a repeated key is weighted by repetition.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average<I>(&self, keys: I) -> Vec<f32>
    where
        I: IntoIterator<Item = StringKey>,
    {
        let mut sum = vec![0.0f32; self.dims];
        let mut count = 0usize;
        for vector in keys.into_iter().filter_map(|key| self.lookup(key)) {
            for (acc, x) in sum.iter_mut().zip(vector) {
                *acc += x;
            }
            count += 1;
        }
        if count > 0 {
            let n = count as f32;
            sum.iter_mut().for_each(|x| *x /= n);
        }
        sum
    }

    /// Nearest keyed row to each query by cosine similarity.
    ///
    /// Queries are processed `batch_size` at a time (0 is treated as 1);
    /// within a batch they run in parallel. Ties go to the lowest row.
    /// `None` is returned for a query when no row has a key.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::DimensionMismatch`] if any query has the wrong width.
    pub fn most_similar(&self, queries: &[&[f32]], batch_size: usize) -> Result<Vec<Option<Neighbor>>> {
        if let Some(bad) = queries.iter().find(|q| q.len() != self.dims) {
            return Err(LexiconError::DimensionMismatch {
                expected: self.dims,
                got: bad.len(),
            });
        }

        let mut row_keys: FxHashMap<usize, StringKey> = FxHashMap::default();
        for (&key, &row) in &self.key2row {
            row_keys
                .entry(row)
                .and_modify(|k| *k = (*k).min(key))
                .or_insert(key);
        }
        let mut candidates: Vec<(usize, StringKey)> = row_keys.into_iter().collect();
        candidates.sort_unstable_by_key(|&(row, _)| row);
        let normed: Vec<Vec<f32>> = candidates
            .iter()
            .filter_map(|&(row, _)| self.row(row).map(normalized))
            .collect();

        let mut results = Vec::with_capacity(queries.len());
        for batch in queries.chunks(batch_size.max(1)) {
            let found: Vec<Option<Neighbor>> = batch
                .par_iter()
                .map(|query| {
                    let query = normalized(query);
                    let mut best: Option<Neighbor> = None;
                    for (&(row, key), candidate) in candidates.iter().zip(&normed) {
                        let score: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
                        if best.map_or(true, |b| score > b.score) {
                            best = Some(Neighbor { row, key, score });
                        }
                    }
                    best
                })
                .collect();
            results.extend(found);
        }
        Ok(results)
    }

    /// Shrink the matrix to `target_rows`, remapping every discarded key to
    /// its nearest surviving row.
    ///
    /// Keys are ranked by descending `prob`, then row, then key. The top
    /// `target_rows` keep their vectors (in rank order) in a new table; the
    /// rest are matched against the survivors in batches of `batch_size`.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::NoSurvivingRows`] if `target_rows` is 0 while
    /// keys exist. The table is not modified on error.
    #[instrument(skip(self, prob))]
    pub fn prune<F>(&mut self, target_rows: usize, batch_size: usize, prob: F) -> Result<Vec<PrunedKey>>
    where
        F: Fn(StringKey) -> f32,
    {
        let mut ranked: Vec<(f32, usize, StringKey)> = self
            .key2row
            .iter()
            .map(|(&key, &row)| (prob(key), row, key))
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let keep = target_rows.min(ranked.len());
        if keep == 0 && !ranked.is_empty() {
            return Err(LexiconError::NoSurvivingRows);
        }

        let mut table = Self::new(keep, self.dims)?;
        table.name = self.name.clone();
        for (new_row, &(_, old_row, key)) in ranked[..keep].iter().enumerate() {
            if let Some(vector) = self.row(old_row) {
                let start = new_row * self.dims;
                table.data[start..start + self.dims].copy_from_slice(vector);
            }
            table.key2row.insert(key, new_row);
        }
        table.next_free = keep;

        let tossed = &ranked[keep..];
        let queries: Vec<&[f32]> = tossed
            .iter()
            .map(|&(_, row, _)| self.row_slice(row))
            .collect();
        let neighbors = table.most_similar(&queries, batch_size)?;

        let mut remap = Vec::with_capacity(tossed.len());
        for (&(_, _, key), neighbor) in tossed.iter().zip(neighbors) {
            let neighbor = neighbor.ok_or(LexiconError::NoSurvivingRows)?;
            remap.push(PrunedKey {
                key,
                survivor: neighbor.key,
                score: neighbor.score,
            });
        }
        for pruned in &remap {
            if let Some(row) = table.find_row(pruned.survivor) {
                table.key2row.insert(pruned.key, row);
            }
        }

        info!(kept = keep, remapped = remap.len(), "pruned vector table");
        *self = table;
        Ok(remap)
    }

    /// Get serializable state for persistence.
    #[must_use]
    pub fn snapshot(&self) -> VectorTableSnapshot {
        let mut key2row: Vec<(StringKey, usize)> =
            self.key2row.iter().map(|(&k, &r)| (k, r)).collect();
        key2row.sort_unstable();
        VectorTableSnapshot {
            name: self.name.clone(),
            rows: self.rows,
            dims: self.dims,
            data: self.data.clone(),
            key2row,
        }
    }

    /// Rebuild a table from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::MalformedPersistedState`] if the matrix size
    /// disagrees with the shape, rows exist without a width, or a key points
    /// past the last row.
    pub fn restore(snapshot: VectorTableSnapshot) -> Result<Self> {
        if snapshot.rows > 0 && snapshot.dims == 0 {
            return Err(LexiconError::MalformedPersistedState(format!(
                "vector shape {}x0 has rows but no width",
                snapshot.rows
            )));
        }
        let expected = snapshot
            .rows
            .checked_mul(snapshot.dims)
            .ok_or_else(|| LexiconError::MalformedPersistedState("vector shape overflows".into()))?;
        if snapshot.data.len() != expected {
            return Err(LexiconError::MalformedPersistedState(format!(
                "vector data holds {} floats, shape {}x{} needs {expected}",
                snapshot.data.len(),
                snapshot.rows,
                snapshot.dims
            )));
        }

        let mut table = Self {
            name: snapshot.name,
            rows: snapshot.rows,
            dims: snapshot.dims,
            data: snapshot.data,
            key2row: FxHashMap::default(),
            next_free: 0,
            freed: BTreeSet::new(),
        };
        let mut pairs = snapshot.key2row;
        pairs.sort_unstable_by_key(|&(key, row)| (row, key));
        for (key, row) in pairs {
            if row >= table.rows {
                return Err(LexiconError::MalformedPersistedState(format!(
                    "key {key} points at row {row} of {}",
                    table.rows
                )));
            }
            table.key2row.insert(key, row);
            table.mark_taken(row);
        }
        Ok(table)
    }
}

/// Serializable snapshot of `VectorTable` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorTableSnapshot {
    pub name: Option<String>,
    pub rows: usize,
    pub dims: usize,
    pub data: Vec<f32>,
    /// Sorted by key.
    pub key2row: Vec<(StringKey, usize)>,
}
