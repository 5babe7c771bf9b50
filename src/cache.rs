//! The public, thread-safe cache surface (spec §4.8).
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::common::tasks::WriteTask;
use crate::error::CacheError;
use crate::maintenance::Inner;
use crate::node::{CacheRegion, PolicyNode};
use crate::policy::Policy;
use crate::store::{DashMapStore, Store};

use crate::builder::CacheBuilder;

/// Default weight assigned to an entry when the caller doesn't specify
/// one (spec §6: "implementation may default to 1 per entry").
const DEFAULT_WEIGHT: u32 = 1;

/// A concurrent, in-process bounded cache with W-TinyLFU admission and
/// eviction.
///
/// Cloning a `Cache` is cheap: it shares the underlying store, policy
/// engine, and maintenance thread with the clone.
pub struct Cache<K, V, S = RandomState> {
    inner: Arc<Inner<K, V>>,
    hasher: S,
    worker: Arc<JoinHandle<()>>,
}

impl<K, V, S: Clone> Clone for Cache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            hasher: self.hasher.clone(),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<K, V> Cache<K, V, RandomState>
where
    K: Eq + Hash + AsRef<[u8]> + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Starts building a cache with the given total weight budget. See
    /// [`CacheBuilder`] for the rest of the configuration surface.
    pub fn builder(maximum: u64) -> CacheBuilder<K, V, RandomState> {
        CacheBuilder::new(maximum)
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Eq + Hash + AsRef<[u8]> + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn with_everything(
        maximum: u64,
        window_maximum: u64,
        main_protected_maximum: u64,
        sketch_capacity: u64,
        evict_enabled: bool,
        initial_capacity: usize,
        hasher: S,
    ) -> Self {
        let policy = Policy::new(
            maximum,
            window_maximum,
            main_protected_maximum,
            sketch_capacity,
            evict_enabled,
        );
        let store: Box<dyn Store<K, V>> = Box::new(DashMapStore::with_capacity(initial_capacity));
        let (inner, worker) = Inner::new(store, policy);

        Self {
            inner,
            hasher,
            worker: Arc::new(worker),
        }
    }

    fn hash_of(&self, key: &K) -> u64 {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// A read-only snapshot of this cache's configuration.
    pub fn policy(&self) -> &Policy {
        self.inner.policy()
    }

    /// Inserts `value` under `key`, replacing any existing entry in
    /// place. Empty keys are silently ignored (spec §4.8/§7).
    pub fn put(&self, key: K, value: V) {
        if key.as_ref().is_empty() {
            return;
        }
        let hash = self.hash_of(&key);
        let key = Arc::new(key);
        let value = Arc::new(value);

        if let Some(existing) = self.inner.store().get(key.as_ref()) {
            existing.set_value(value);
            self.inner.after_write(WriteTask::Update {
                node: existing,
                weight_diff: 0,
            });
            return;
        }

        let node = PolicyNode::new(Arc::clone(&key), hash, Arc::clone(&value), DEFAULT_WEIGHT, CacheRegion::Window);
        match self.inner.store().put_if_absent(key, Arc::clone(&node)) {
            None => self.inner.after_write(WriteTask::Add(node)),
            Some(existing) => {
                // Lost the race against a concurrent insert; fall back to
                // an in-place update of whatever landed first.
                existing.set_value(value);
                self.inner.after_write(WriteTask::Update {
                    node: existing,
                    weight_diff: 0,
                });
            }
        }
    }

    /// Inserts `value` under `key` only if absent. Returns the prior
    /// value when the key was already present (and does not overwrite
    /// it). Empty keys fail with [`CacheError::InvalidArgument`].
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<Arc<V>>, CacheError> {
        if key.as_ref().is_empty() {
            return Err(CacheError::InvalidArgument);
        }
        let hash = self.hash_of(&key);
        let key = Arc::new(key);

        if let Some(existing) = self.inner.store().get(key.as_ref()) {
            return Ok(Some(existing.value()));
        }

        let node = PolicyNode::new(Arc::clone(&key), hash, Arc::new(value), DEFAULT_WEIGHT, CacheRegion::Window);
        match self.inner.store().put_if_absent(key, Arc::clone(&node)) {
            None => {
                self.inner.after_write(WriteTask::Add(node));
                Ok(None)
            }
            Some(existing) => Ok(Some(existing.value())),
        }
    }

    /// Looks up `key`, recording a read-task on hit (spec §4.8).
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        if key.as_ref().is_empty() {
            return None;
        }
        let node = self.inner.store().get(key)?;
        let value = node.value();
        self.inner.after_read(node);
        Some(value)
    }

    /// Removes `key`, returning its prior value if present.
    pub fn delete(&self, key: &K) -> Option<Arc<V>> {
        if key.as_ref().is_empty() {
            return None;
        }
        let node = self.inner.store().remove(key)?;
        let value = node.value();
        self.inner.after_write(WriteTask::Delete(node));
        Some(value)
    }

    /// `true` if `key` is currently present.
    pub fn contains(&self, key: &K) -> bool {
        if key.as_ref().is_empty() {
            return false;
        }
        self.inner.store().contains(key)
    }

    /// Number of entries currently present.
    pub fn size(&self) -> u64 {
        self.inner.store().len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn settle() {
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        cache.put("a".to_string(), "1".to_string());
        assert_eq!(cache.get(&"a".to_string()).as_deref().map(String::as_str), Some("1"));
    }

    #[test]
    fn put_replaces_existing_value_in_place() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        cache.put("a".to_string(), "1".to_string());
        cache.put("a".to_string(), "2".to_string());
        assert_eq!(cache.get(&"a".to_string()).as_deref().map(String::as_str), Some("2"));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn put_if_absent_does_not_overwrite() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        let prior = cache.put_if_absent("a".to_string(), "1".to_string()).unwrap();
        assert!(prior.is_none());
        let prior = cache.put_if_absent("a".to_string(), "2".to_string()).unwrap();
        assert_eq!(prior.as_deref().map(String::as_str), Some("1"));
        assert_eq!(cache.get(&"a".to_string()).as_deref().map(String::as_str), Some("1"));
    }

    #[test]
    fn put_if_absent_rejects_empty_key() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        let err = cache.put_if_absent(String::new(), "1".to_string()).unwrap_err();
        assert_eq!(err, CacheError::InvalidArgument);
    }

    #[test]
    fn put_silently_ignores_empty_key() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        cache.put(String::new(), "1".to_string());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn delete_removes_and_returns_prior_value() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        cache.put("a".to_string(), "1".to_string());
        let prior = cache.delete(&"a".to_string());
        assert_eq!(prior.as_deref().map(String::as_str), Some("1"));
        assert!(!cache.contains(&"a".to_string()));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn contains_and_size_reflect_store_state() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        assert!(!cache.contains(&"a".to_string()));
        cache.put("a".to_string(), "1".to_string());
        assert!(cache.contains(&"a".to_string()));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn eviction_bounds_size_under_pressure() {
        let cache: Cache<String, u64> = Cache::builder(10).build().unwrap();
        for k in 0..200u64 {
            cache.put(k.to_string(), k);
            settle();
        }
        assert!(cache.size() <= 10, "size was {}", cache.size());
    }

    #[test]
    fn clone_shares_the_same_store() {
        let cache: Cache<String, String> = Cache::builder(100).build().unwrap();
        let handle = cache.clone();
        cache.put("a".to_string(), "1".to_string());
        assert_eq!(handle.get(&"a".to_string()).as_deref().map(String::as_str), Some("1"));
    }

    #[test]
    fn disabled_eviction_behaves_as_unbounded_map() {
        let cache: Cache<String, u64> = Cache::builder(4).evict_enabled(false).build().unwrap();
        for k in 0..50u64 {
            cache.put(k.to_string(), k);
        }
        settle();
        assert_eq!(cache.size(), 50);
    }
}
