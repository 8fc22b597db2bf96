//! Cross-call memoization: cache diamond sub-results keyed by
//! `(diamond structural hash, induced prior vector hash)`.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use crate::graph::NodeId;
use crate::probability::Probability;

/// Default bound on the number of distinct conditioning states cached per
/// top-level query.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// `(diamond_hash, prior_vector_hash)`.
pub type DiamondCacheKey = (u64, u64);

/// Hash the *values* of an induced prior vector (one joint conditioning
/// state), in a canonical node-id order so two identical states hash equal
/// regardless of map iteration order.
pub fn prior_vector_hash(priors: &BTreeMap<NodeId, Probability>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (node, value) in priors {
        node.hash(&mut hasher);
        value.stable_hash().hash(&mut hasher);
    }
    hasher.finish()
}

/// Bounded, LRU-evicted cache from a diamond conditioning state to the full
/// induced belief map that state produced. Correctness never depends on
/// retention: a miss just re-invokes the engine.
pub struct ConditioningCache {
    capacity: usize,
    entries: HashMap<DiamondCacheKey, BTreeMap<NodeId, Probability>>,
    order: VecDeque<DiamondCacheKey>,
}

impl ConditioningCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, key: &DiamondCacheKey) -> Option<BTreeMap<NodeId, Probability>> {
        if let Some(value) = self.entries.get(key) {
            let value = value.clone();
            self.touch(key);
            Some(value)
        } else {
            None
        }
    }

    pub fn insert(&mut self, key: DiamondCacheKey, value: BTreeMap<NodeId, Probability>) {
        if self.entries.insert(key, value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        if self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn touch(&mut self, key: &DiamondCacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_back(*key);
        }
    }
}

impl Default for ConditioningCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
