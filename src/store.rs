//! The concurrent key/value store the policy engine consumes (spec §6).
//! Out of scope for the policy itself — this module exists so the crate
//! ships something usable, behind a trait seam so the engine never
//! depends on the concrete map.
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::node::PolicyNode;

/// The external collaborator spec §6 treats as a black box. Sharding
/// strategy and hash function are implementation-defined; the only
/// requirement is linearisability per key.
pub(crate) trait Store<K, V>: Send + Sync {
    /// Inserts `node` under `key` iff no entry is currently present.
    /// Returns the existing node when one was already there (and does
    /// not insert).
    fn put_if_absent(&self, key: Arc<K>, node: Arc<PolicyNode<K, V>>) -> Option<Arc<PolicyNode<K, V>>>;

    fn get(&self, key: &K) -> Option<Arc<PolicyNode<K, V>>>;

    fn remove(&self, key: &K) -> Option<Arc<PolicyNode<K, V>>>;

    fn contains(&self, key: &K) -> bool;

    fn len(&self) -> usize;
}

/// A `dashmap`-backed `Store`. `dashmap` shards internally the same way
/// `PaperCache` and `rusty-db` use it for their own concurrent maps.
pub(crate) struct DashMapStore<K, V> {
    map: DashMap<Arc<K>, Arc<PolicyNode<K, V>>>,
}

impl<K, V> DashMapStore<K, V>
where
    K: Eq + Hash,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity(capacity),
        }
    }
}

impl<K, V> Store<K, V> for DashMapStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Send + Sync,
{
    fn put_if_absent(&self, key: Arc<K>, node: Arc<PolicyNode<K, V>>) -> Option<Arc<PolicyNode<K, V>>> {
        use dashmap::mapref::entry::Entry;

        match self.map.entry(key) {
            Entry::Occupied(occupied) => Some(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                vacant.insert(node);
                None
            }
        }
    }

    fn get(&self, key: &K) -> Option<Arc<PolicyNode<K, V>>> {
        self.map.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn remove(&self, key: &K) -> Option<Arc<PolicyNode<K, V>>> {
        self.map.remove(key).map(|(_, node)| node)
    }

    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CacheRegion;

    fn node(n: u32) -> Arc<PolicyNode<u32, u32>> {
        PolicyNode::new(Arc::new(n), n as u64, Arc::new(n * 10), 1, CacheRegion::Window)
    }

    #[test]
    fn put_if_absent_only_inserts_once() {
        let store: DashMapStore<u32, u32> = DashMapStore::with_capacity(4);
        assert!(store.put_if_absent(Arc::new(1), node(1)).is_none());

        let prior = store.put_if_absent(Arc::new(1), node(99));
        assert!(prior.is_some());
        assert_eq!(*prior.unwrap().value(), 10);
    }

    #[test]
    fn remove_then_contains_is_false() {
        let store: DashMapStore<u32, u32> = DashMapStore::with_capacity(4);
        store.put_if_absent(Arc::new(1), node(1));
        assert!(store.contains(&1));
        assert!(store.remove(&1).is_some());
        assert!(!store.contains(&1));
        assert_eq!(store.len(), 0);
    }
}
