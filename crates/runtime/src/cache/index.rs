//! Per-policy ordering index used to pick eviction victims.

use std::collections::BTreeMap;

use super::config::EvictionPolicy;
use super::entry::Position;

/// Auxiliary ordering kept next to the entry map.
///
/// Each variant orders keys so that the first element is the next victim:
/// LRU by access tick, LFU by `(hits, insertion_seq)`, FIFO by insertion
/// sequence. `TimeOnly` keeps no index.
#[derive(Debug)]
pub(crate) enum EvictionIndex<K> {
    Lru(BTreeMap<u64, K>),
    Lfu(BTreeMap<(u64, u64), K>),
    Fifo(BTreeMap<u64, K>),
    TimeOnly,
}

impl<K: Clone> EvictionIndex<K> {
    pub(crate) fn new(policy: EvictionPolicy) -> Self {
        match policy {
            EvictionPolicy::Lru => Self::Lru(BTreeMap::new()),
            EvictionPolicy::Lfu => Self::Lfu(BTreeMap::new()),
            EvictionPolicy::Fifo => Self::Fifo(BTreeMap::new()),
            EvictionPolicy::TimeOnly => Self::TimeOnly,
        }
    }

    pub(crate) fn insert(&mut self, key: K, position: Position) {
        match self {
            Self::Lru(order) => {
                order.insert(position.recency, key);
            }
            Self::Lfu(order) => {
                order.insert((position.hits, position.insertion_seq), key);
            }
            Self::Fifo(order) => {
                order.insert(position.insertion_seq, key);
            }
            Self::TimeOnly => {}
        }
    }

    pub(crate) fn remove(&mut self, position: Position) {
        match self {
            Self::Lru(order) => {
                order.remove(&position.recency);
            }
            Self::Lfu(order) => {
                order.remove(&(position.hits, position.insertion_seq));
            }
            Self::Fifo(order) => {
                order.remove(&position.insertion_seq);
            }
            Self::TimeOnly => {}
        }
    }

    /// Moves `key` from `old` to `new`, skipping the work when the policy's
    /// ordering key did not change.
    pub(crate) fn reposition(&mut self, key: &K, old: Position, new: Position) {
        let unchanged = match self {
            Self::Lru(_) => old.recency == new.recency,
            Self::Lfu(_) => old.hits == new.hits && old.insertion_seq == new.insertion_seq,
            Self::Fifo(_) => old.insertion_seq == new.insertion_seq,
            Self::TimeOnly => true,
        };
        if unchanged {
            return;
        }
        self.remove(old);
        self.insert(key.clone(), new);
    }

    /// Next key to evict.
    pub(crate) fn victim(&self) -> Option<&K> {
        match self {
            Self::Lru(order) | Self::Fifo(order) => order.values().next(),
            Self::Lfu(order) => order.values().next(),
            Self::TimeOnly => None,
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Self::Lru(order) | Self::Fifo(order) => order.clear(),
            Self::Lfu(order) => order.clear(),
            Self::TimeOnly => {}
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Lru(order) | Self::Fifo(order) => order.len(),
            Self::Lfu(order) => order.len(),
            Self::TimeOnly => 0,
        }
    }
}
