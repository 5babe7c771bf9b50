//! Builds a [`Cache`] with various configuration knobs (spec §6).
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::cache::Cache;
use crate::error::CacheError;

/// Builds a [`Cache`] with various configuration knobs.
///
/// # Examples
///
/// ```ignore
/// use tinylfu_cache::Cache;
///
/// let cache: Cache<u64, String> = Cache::builder(10_000).build().unwrap();
/// cache.put(0, "zero".to_string());
/// cache.get(&0);
/// ```
#[must_use]
pub struct CacheBuilder<K, V, S> {
    maximum: u64,
    window_maximum: Option<u64>,
    main_protected_maximum: Option<u64>,
    sketch_capacity: Option<u64>,
    evict_enabled: bool,
    initial_capacity: Option<usize>,
    hasher: S,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> CacheBuilder<K, V, RandomState>
where
    K: Eq + Hash,
{
    /// Starts building a cache with the given total weight budget.
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            window_maximum: None,
            main_protected_maximum: None,
            sketch_capacity: None,
            evict_enabled: true,
            initial_capacity: None,
            hasher: RandomState::default(),
            _marker: PhantomData,
        }
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Eq + Hash + AsRef<[u8]> + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Sets the weight budget of the Window deque. Defaults to 1% of
    /// `maximum`, with a floor of 1.
    pub fn window_maximum(mut self, window_maximum: u64) -> Self {
        self.window_maximum = Some(window_maximum);
        self
    }

    /// Sets the weight budget of the Protected sub-segment of the main
    /// space. Defaults to 80% of whatever weight remains once the window
    /// budget is subtracted from `maximum`.
    pub fn main_protected_maximum(mut self, main_protected_maximum: u64) -> Self {
        self.main_protected_maximum = Some(main_protected_maximum);
        self
    }

    /// Sets the capacity the frequency sketch's table is sized for.
    /// Defaults to `maximum`.
    pub fn sketch_capacity(mut self, sketch_capacity: u64) -> Self {
        self.sketch_capacity = Some(sketch_capacity);
        self
    }

    /// Disables size-based eviction entirely; the cache then behaves as
    /// an unbounded map. Enabled by default.
    pub fn evict_enabled(mut self, evict_enabled: bool) -> Self {
        self.evict_enabled = evict_enabled;
        self
    }

    /// Sets the initial capacity (number of entries) the backing store
    /// is pre-sized for.
    pub fn initial_capacity(mut self, number_of_entries: usize) -> Self {
        self.initial_capacity = Some(number_of_entries);
        self
    }

    /// Uses the given hasher to compute the 64-bit key hashes the
    /// frequency sketch and admission policy consume.
    pub fn build_with_hasher<S2>(self, hasher: S2) -> CacheBuilder<K, V, S2>
    where
        S2: BuildHasher + Clone + Send + Sync + 'static,
    {
        CacheBuilder {
            maximum: self.maximum,
            window_maximum: self.window_maximum,
            main_protected_maximum: self.main_protected_maximum,
            sketch_capacity: self.sketch_capacity,
            evict_enabled: self.evict_enabled,
            initial_capacity: self.initial_capacity,
            hasher,
            _marker: PhantomData,
        }
    }

    /// Builds the `Cache`, spawning its dedicated maintenance thread.
    ///
    /// Fails with [`CacheError::InvalidArgument`] if a caller-supplied
    /// override violates spec §6's configuration bounds: `window_maximum`
    /// must not exceed `maximum`, and `main_protected_maximum` must not
    /// exceed `maximum - window_maximum`.
    pub fn build(self) -> Result<Cache<K, V, S>, CacheError> {
        let window_maximum = self
            .window_maximum
            .unwrap_or_else(|| (self.maximum / 100).max(1));
        if window_maximum > self.maximum {
            return Err(CacheError::InvalidArgument);
        }

        let remaining_main = self.maximum - window_maximum;
        let main_protected_maximum = self
            .main_protected_maximum
            .unwrap_or_else(|| (remaining_main * 4) / 5);
        if main_protected_maximum > remaining_main {
            return Err(CacheError::InvalidArgument);
        }

        let sketch_capacity = self.sketch_capacity.unwrap_or(self.maximum);

        Ok(Cache::with_everything(
            self.maximum,
            window_maximum,
            main_protected_maximum,
            sketch_capacity,
            self.evict_enabled,
            self.initial_capacity.unwrap_or(0),
            self.hasher,
        ))
    }
}
