// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Bulk-owned storage for lexeme records.
//!
//! A `LexemeArena` is a slab of fixed-size records addressed by dense
//! `LexemeId` handles. Records are never freed individually; the whole arena
//! is released when it is dropped. Each arena carries a process-unique id so
//! a handle can only ever resolve in the arena that issued it.
//!
//! The vocabulary owns one permanent arena. Callers that process large
//! amounts of rare text supply their own transient arena through
//! [`Pool::Transient`] and decide when to drop it.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    error::{LexiconError, Result},
    lexeme::LexemeRecord,
};

/// Id 0 is reserved for the static empty lexeme.
static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(u32);

impl ArenaId {
    const EMPTY: Self = Self(0);

    fn next() -> Self {
        Self(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a record inside a specific arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LexemeId {
    arena: ArenaId,
    slot: u32,
}

impl LexemeId {
    /// Handle of the shared empty lexeme.
    pub const EMPTY: Self = Self {
        arena: ArenaId::EMPTY,
        slot: 0,
    };

    #[inline]
    #[must_use]
    pub const fn arena(self) -> ArenaId {
        self.arena
    }

    #[inline]
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

/// Where a newly created, non-admitted lexeme is allocated.
#[derive(Debug)]
pub enum Pool<'a> {
    /// The vocabulary's own arena. Records created here are always indexed.
    Permanent,
    /// A caller-owned arena. Records not admitted permanently land here and
    /// live exactly as long as the arena.
    Transient(&'a mut LexemeArena),
}

impl Pool<'_> {
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// Slab of lexeme records with bulk-only deallocation.
///
/// # Performance
///
/// - `alloc`: O(1) amortized
/// - `get`: O(1)
#[derive(Debug)]
pub struct LexemeArena {
    id: ArenaId,
    records: Vec<LexemeRecord>,
    /// Maximum number of records (0 = unlimited).
    max_records: usize,
}

impl Default for LexemeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl LexemeArena {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(0, 0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limit(capacity, 0)
    }

    /// Create an arena that refuses to grow past `max_records` (0 = unlimited).
    #[must_use]
    pub fn with_limit(capacity: usize, max_records: usize) -> Self {
        let capacity = if max_records > 0 {
            capacity.min(max_records)
        } else {
            capacity
        };
        Self {
            id: ArenaId::next(),
            records: Vec::with_capacity(capacity),
            max_records,
        }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> ArenaId {
        self.id
    }

    #[inline]
    #[must_use]
    pub const fn max_records(&self) -> usize {
        self.max_records
    }

    /// Store a record and return its handle.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::AllocationError`] if the arena is at its limit
    /// or the allocator cannot grow the backing storage.
    pub fn alloc(&mut self, record: LexemeRecord) -> Result<LexemeId> {
        let requested = self.records.len() + 1;
        if self.max_records > 0 && requested > self.max_records {
            return Err(LexiconError::AllocationError {
                requested,
                limit: self.max_records,
            });
        }
        let slot = u32::try_from(self.records.len()).map_err(|_| LexiconError::AllocationError {
            requested,
            limit: u32::MAX as usize,
        })?;
        self.records
            .try_reserve(1)
            .map_err(|_| LexiconError::AllocationError {
                requested,
                limit: self.records.capacity(),
            })?;
        self.records.push(record);
        Ok(LexemeId { arena: self.id, slot })
    }

    /// Resolve a handle issued by this arena.
    #[must_use]
    pub fn get(&self, id: LexemeId) -> Option<&LexemeRecord> {
        if id.arena != self.id {
            return None;
        }
        self.records.get(id.slot as usize)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: LexemeId) -> Option<&mut LexemeRecord> {
        if id.arena != self.id {
            return None;
        }
        self.records.get_mut(id.slot as usize)
    }

    /// Whether a handle was issued by this arena.
    #[inline]
    #[must_use]
    pub fn owns(&self, id: LexemeId) -> bool {
        id.arena == self.id && (id.slot as usize) < self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LexemeRecord> + '_ {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LexemeRecord> + '_ {
        self.records.iter_mut()
    }

    /// Approximate bytes held by the arena.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.records.capacity() * std::mem::size_of::<LexemeRecord>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::StringKey;

    fn record(key: u64) -> LexemeRecord {
        LexemeRecord::new(StringKey::new(key), 1)
    }

    #[test]
    fn test_alloc_get() {
        let mut arena = LexemeArena::new();
        let id = arena.alloc(record(5)).unwrap();
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(id).unwrap().orth(), StringKey::new(5));
        assert!(arena.owns(id));
    }

    #[test]
    fn test_dense_slots() {
        let mut arena = LexemeArena::with_capacity(4);
        let ids: Vec<_> = (1..=4).map(|k| arena.alloc(record(k)).unwrap()).collect();
        let slots: Vec<u32> = ids.iter().map(|id| id.slot()).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_handles_do_not_cross_arenas() {
        let mut a = LexemeArena::new();
        let mut b = LexemeArena::new();
        assert_ne!(a.id(), b.id());

        let id_a = a.alloc(record(1)).unwrap();
        let _ = b.alloc(record(2)).unwrap();
        assert!(b.get(id_a).is_none());
        assert!(!b.owns(id_a));
        assert!(b.get_mut(id_a).is_none());
    }

    #[test]
    fn test_limit_is_allocation_error() {
        let mut arena = LexemeArena::with_limit(0, 2);
        arena.alloc(record(1)).unwrap();
        arena.alloc(record(2)).unwrap();
        let err = arena.alloc(record(3)).unwrap_err();
        assert!(matches!(
            err,
            LexiconError::AllocationError {
                requested: 3,
                limit: 2
            }
        ));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_empty_handle_never_resolves() {
        let arena = LexemeArena::new();
        assert!(arena.get(LexemeId::EMPTY).is_none());
        assert!(LexemeId::EMPTY.is_empty());
    }

    #[test]
    fn test_get_mut_overwrites_slot() {
        let mut arena = LexemeArena::new();
        let id = arena.alloc(record(1)).unwrap();
        arena.get_mut(id).unwrap().set_row(Some(3));
        assert_eq!(arena.get(id).unwrap().row(), Some(3));
    }

    #[test]
    fn test_pool_is_permanent() {
        let mut arena = LexemeArena::new();
        assert!(Pool::Permanent.is_permanent());
        assert!(!Pool::Transient(&mut arena).is_permanent());
    }
}
