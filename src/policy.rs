/// A read-only snapshot of a cache's configuration (spec §6).
///
/// At this time, cache policy cannot be modified after cache creation.
#[derive(Clone, Debug)]
pub struct Policy {
    maximum: u64,
    window_maximum: u64,
    main_protected_maximum: u64,
    sketch_capacity: u64,
    evict_enabled: bool,
}

impl Policy {
    pub(crate) fn new(
        maximum: u64,
        window_maximum: u64,
        main_protected_maximum: u64,
        sketch_capacity: u64,
        evict_enabled: bool,
    ) -> Self {
        Self {
            maximum,
            window_maximum,
            main_protected_maximum,
            sketch_capacity,
            evict_enabled,
        }
    }

    /// Total weight budget for the cache.
    pub fn maximum(&self) -> u64 {
        self.maximum
    }

    /// Weight budget for the Window deque.
    pub fn window_maximum(&self) -> u64 {
        self.window_maximum
    }

    /// Weight budget for the Protected sub-segment of the main space.
    ///
    /// Note: this bound is advisory only (spec §9's documented "protected
    /// overflow" omission) — `on_access` promotion from Probation to
    /// Protected is never demoted back down when it pushes the
    /// protected-weighted-size above this value.
    pub fn main_protected_maximum(&self) -> u64 {
        self.main_protected_maximum
    }

    /// Capacity the frequency sketch's table was sized for.
    pub fn sketch_capacity(&self) -> u64 {
        self.sketch_capacity
    }

    /// Whether size-based eviction is enabled. When `false`, the cache
    /// behaves as an unbounded map: Add/Update/Delete policy tasks are
    /// no-ops and nothing is ever evicted.
    pub fn evict_enabled(&self) -> bool {
        self.evict_enabled
    }
}
