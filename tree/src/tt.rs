use std::sync::{Arc, Weak};

use dashmap::DashMap;
use game::MoveToken;

use crate::node::LowNode;

/// Bounded cache from 64-bit position fingerprints to weak low-node
/// handles. Entries never keep a detached subtree alive, so any lookup may
/// miss, including right after an insert.
pub struct TranspositionTable<M: MoveToken> {
    map: DashMap<u64, Weak<LowNode<M>>>,
    capacity: usize,
}

impl<M: MoveToken> TranspositionTable<M> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            map: DashMap::new(),
            capacity,
        }
    }

    /// Upgrades the cached handle for `key`. A dead entry counts as a miss
    /// and is dropped on the way out.
    pub fn lookup(&self, key: u64) -> Option<Arc<LowNode<M>>> {
        let hit = self.map.get(&key).and_then(|entry| entry.value().upgrade());
        if hit.is_some() {
            return hit;
        }
        self.map.remove_if(&key, |_, weak| weak.strong_count() == 0);
        None
    }

    pub fn insert(&self, key: u64, low_node: &Arc<LowNode<M>>) {
        if self.map.len() >= self.capacity {
            self.evict_cold();
        }
        self.map.insert(key, Arc::downgrade(low_node));
    }

    /// Drops every entry whose low node has already died.
    pub fn evict_cold(&self) {
        self.map.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
