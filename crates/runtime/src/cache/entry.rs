//! Stored cache entries.

use std::time::Instant;

/// A value plus the metadata the eviction policies and TTL checks need.
///
/// Owned by its [`CacheEngine`](super::CacheEngine) and only mutated under
/// the engine's lock.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Time of the last write.
    pub created_at: Instant,
    pub last_accessed: Instant,
    /// Successful reads since the key was first inserted.
    pub access_count: u64,
    /// `None` when `created_at + ttl` is not representable; such entries never
    /// expire.
    pub expires_at: Option<Instant>,
    pub size_bytes: usize,
    pub(crate) insertion_seq: u64,
    pub(crate) recency: u64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(
        value: V,
        size_bytes: usize,
        now: Instant,
        expires_at: Option<Instant>,
        insertion_seq: u64,
        recency: u64,
    ) -> Self {
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            expires_at,
            size_bytes,
            insertion_seq,
            recency,
        }
    }

    /// `now < expires_at`; the expiry instant itself is already invalid.
    pub fn is_valid(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }

    pub(crate) fn position(&self) -> Position {
        Position { insertion_seq: self.insertion_seq, recency: self.recency, hits: self.access_count }
    }
}

/// Ordering data an [`EvictionIndex`](super::index::EvictionIndex) keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    pub insertion_seq: u64,
    pub recency: u64,
    pub hits: u64,
}
