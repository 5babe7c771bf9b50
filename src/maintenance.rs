//! The policy engine and the maintenance loop that runs it (spec §4.4
//! through §4.7): deques, frequency sketch, and weighted-size counters are
//! all owned here, and touched only from the single dedicated maintenance
//! thread.
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};
use log::{debug, trace};
use parking_lot::Mutex;
use rand::Rng;

use crate::common::deque::Deque;
use crate::common::drain::DrainStatus;
use crate::common::frequency_sketch::FrequencySketch;
use crate::common::ring_buffer::{OfferOutcome, RingBuffer};
use crate::common::tasks::{ReadTask, WriteTask};
use crate::error::CacheError;
use crate::node::{clone_from_raw, CacheRegion, PolicyNode};
use crate::policy::Policy;
use crate::store::Store;

/// Number of times `after_write` retries the write-buffer offer before
/// falling back to synchronous inline execution (spec §4.8).
const WRITE_RETRY_BUDGET: u32 = 100;
/// Admission floor below which a candidate is rejected outright (spec
/// §4.5); candidates at or below this frequency only get the random
/// tie-break.
const ADMIT_FREQUENCY_FLOOR: u8 = 5;
/// Mask used for the 1-in-128 random admission tie-break (spec §4.5).
const ADMIT_RANDOM_MASK: u8 = 0x7F;

fn apply_diff(current: u64, diff: i64) -> u64 {
    if diff >= 0 {
        current.saturating_add(diff as u64)
    } else {
        current.saturating_sub(diff.unsigned_abs())
    }
}

/// Which main-space queue the eviction victim cursor is currently walking
/// (spec §4.5's `victim_queue`).
#[derive(Clone, Copy, PartialEq, Eq)]
enum VictimQueue {
    Probation,
    Protected,
    Window,
}

/// All policy state: the three access-ordered deques, the frequency
/// sketch, and the weighted-size counters (spec §3). Exclusively owned
/// and mutated by the maintenance thread.
struct PolicyEngine<K, V> {
    window: Deque<K, V>,
    probation: Deque<K, V>,
    protected: Deque<K, V>,
    sketch: FrequencySketch,
    weighted_size: u64,
    window_weighted_size: u64,
    main_protected_weighted_size: u64,
}

impl<K, V> PolicyEngine<K, V>
where
    K: AsRef<[u8]>,
{
    fn new(sketch_capacity: u64) -> Self {
        let mut sketch = FrequencySketch::default();
        sketch.ensure_capacity(sketch_capacity as usize);
        Self {
            window: Deque::default(),
            probation: Deque::default(),
            protected: Deque::default(),
            sketch,
            weighted_size: 0,
            window_weighted_size: 0,
            main_protected_weighted_size: 0,
        }
    }

    /// Read-task consumer (spec §4.6).
    fn on_access(&mut self, node: &Arc<PolicyNode<K, V>>, policy: &Policy) {
        if !policy.evict_enabled() || node.is_tombstone() {
            return;
        }
        self.sketch.increment(node.hash);

        match node.tag() {
            CacheRegion::Window if self.window.contains(node) => {
                self.window.move_to_back(node);
            }
            CacheRegion::Probation if self.probation.contains(node) => {
                self.probation.remove(node);
                node.set_tag(CacheRegion::Protected);
                self.protected.push_back(node);
                self.main_protected_weighted_size += node.weight() as u64;
            }
            CacheRegion::Protected if self.protected.contains(node) => {
                self.protected.move_to_back(node);
            }
            _ => {}
        }
    }

    /// Write-task consumer (spec §4.7).
    fn run_write_task(&mut self, task: WriteTask<K, V>, policy: &Policy) {
        if !policy.evict_enabled() {
            return;
        }
        match task {
            WriteTask::Add(node) => {
                let w = node.weight() as u64;
                self.weighted_size += w;
                self.window_weighted_size += w;
                self.sketch.increment(node.hash);
                self.window.push_back(&node);
            }
            WriteTask::Update { node, weight_diff } => {
                match node.tag() {
                    CacheRegion::Window => {
                        self.window_weighted_size = apply_diff(self.window_weighted_size, weight_diff);
                    }
                    CacheRegion::Protected => {
                        self.main_protected_weighted_size =
                            apply_diff(self.main_protected_weighted_size, weight_diff);
                    }
                    CacheRegion::Probation => {}
                }
                self.weighted_size = apply_diff(self.weighted_size, weight_diff);
                self.on_access(&node, policy);
            }
            WriteTask::Delete(node) => {
                let w = node.weight() as u64;
                match node.tag() {
                    CacheRegion::Window => {
                        self.window.remove(&node);
                        self.window_weighted_size = self.window_weighted_size.saturating_sub(w);
                    }
                    CacheRegion::Probation => {
                        self.probation.remove(&node);
                    }
                    CacheRegion::Protected => {
                        self.protected.remove(&node);
                        self.main_protected_weighted_size = self.main_protected_weighted_size.saturating_sub(w);
                    }
                }
                self.weighted_size = self.weighted_size.saturating_sub(w);
            }
        }
    }

    /// `evict_entry` (spec §4.5): removes `node` from the store and from
    /// whichever deque/sub-counter its tag names.
    fn evict_entry(&mut self, node: &Arc<PolicyNode<K, V>>, store: &dyn Store<K, V>) {
        store.remove(node.key.as_ref());
        let w = node.weight() as u64;
        self.weighted_size = self.weighted_size.saturating_sub(w);
        match node.tag() {
            CacheRegion::Window => {
                self.window.remove(node);
                self.window_weighted_size = self.window_weighted_size.saturating_sub(w);
            }
            CacheRegion::Probation => {
                self.probation.remove(node);
            }
            CacheRegion::Protected => {
                self.protected.remove(node);
                self.main_protected_weighted_size = self.main_protected_weighted_size.saturating_sub(w);
            }
        }
    }

    /// `evict_from_window` (spec §4.5): demotes overflow from Window into
    /// Probation, returning the number of nodes demoted (the admission
    /// "candidates").
    fn evict_from_window(&mut self, policy: &Policy) -> u64 {
        let mut candidates = 0u64;
        while self.window_weighted_size > policy.window_maximum() {
            let Some(ptr) = self.window.remove_front() else {
                break;
            };
            let node = unsafe { clone_from_raw(ptr) };
            let w = node.weight() as u64;
            self.window_weighted_size = self.window_weighted_size.saturating_sub(w);
            node.set_tag(CacheRegion::Probation);
            self.probation.push_back(&node);
            candidates += 1;
        }
        candidates
    }

    /// `admit` (spec §4.5): decides whether a freshly promoted candidate
    /// displaces the current main-space victim.
    fn admit(&self, candidate_hash: u64, victim_hash: u64) -> bool {
        let candidate_freq = self.sketch.frequency(candidate_hash);
        let victim_freq = self.sketch.frequency(victim_hash);

        if candidate_freq > victim_freq {
            return true;
        }
        if candidate_freq <= ADMIT_FREQUENCY_FLOOR {
            return false;
        }
        rand::thread_rng().gen::<u8>() & ADMIT_RANDOM_MASK == 0
    }

    /// `evict_from_main` (spec §4.5): walks a victim cursor from the LRU
    /// end of Probation (spilling into Protected, then Window, once
    /// Probation is exhausted) against a candidate cursor walking
    /// backwards from the freshest promotion, admitting or evicting at
    /// each step until the cache is back within its weight budget.
    fn evict_from_main(&mut self, mut candidates: u64, policy: &Policy, store: &dyn Store<K, V>) {
        let mut victim_queue = VictimQueue::Probation;
        let mut victim = self.probation.peek_front();
        let mut candidate = self.probation.peek_back();

        while self.weighted_size > policy.maximum() {
            if candidates == 0 {
                candidate = None;
            }

            if victim.is_none() && candidate.is_none() {
                victim_queue = match victim_queue {
                    VictimQueue::Probation => {
                        victim = self.protected.peek_front();
                        VictimQueue::Protected
                    }
                    VictimQueue::Protected => {
                        victim = self.window.peek_front();
                        VictimQueue::Window
                    }
                    VictimQueue::Window => break,
                };
                continue;
            }

            if victim.is_none() || candidate.is_none() {
                if let Some(v) = victim {
                    let next = unsafe { (*v.as_ptr()).links().next };
                    let node = unsafe { clone_from_raw(v) };
                    self.evict_entry(&node, store);
                    victim = next;
                } else if let Some(c) = candidate {
                    let prev = unsafe { (*c.as_ptr()).links().prev };
                    let node = unsafe { clone_from_raw(c) };
                    self.evict_entry(&node, store);
                    candidates = candidates.saturating_sub(1);
                    candidate = prev;
                }
                continue;
            }

            let victim_node = unsafe { clone_from_raw(victim.unwrap()) };
            let candidate_node = unsafe { clone_from_raw(candidate.unwrap()) };

            if victim_node.is_tombstone() {
                let next = unsafe { victim_node.links().next };
                self.evict_entry(&victim_node, store);
                victim = next;
                continue;
            }
            if candidate_node.is_tombstone() {
                let prev = unsafe { candidate_node.links().prev };
                self.evict_entry(&candidate_node, store);
                candidates = candidates.saturating_sub(1);
                candidate = prev;
                continue;
            }

            if candidate_node.weight() as u64 > policy.maximum() {
                let prev = unsafe { candidate_node.links().prev };
                self.evict_entry(&candidate_node, store);
                candidates = candidates.saturating_sub(1);
                candidate = prev;
                continue;
            }

            candidates = candidates.saturating_sub(1);
            if self.admit(candidate_node.hash, victim_node.hash) {
                let next = unsafe { victim_node.links().next };
                let candidate_prev = unsafe { candidate_node.links().prev };
                self.evict_entry(&victim_node, store);
                victim = next;
                candidate = candidate_prev;
            } else {
                let prev = unsafe { candidate_node.links().prev };
                self.evict_entry(&candidate_node, store);
                candidate = prev;
            }
        }
    }

    fn maintenance(
        &mut self,
        store: &dyn Store<K, V>,
        policy: &Policy,
        read_buffer: &RingBuffer<ReadTask<K, V>>,
        write_buffer: &RingBuffer<WriteTask<K, V>>,
        drain_status: &DrainStatus,
    ) {
        drain_status.begin_maintenance();

        read_buffer.drain_to(|task| self.on_access(&task.node, policy));
        write_buffer.drain_to(|task| self.run_write_task(task, policy));

        if policy.evict_enabled() {
            let candidates = self.evict_from_window(policy);
            self.evict_from_main(candidates, policy, store);
        }

        drain_status.finish_maintenance();
    }
}

/// Shared cache state: the store, policy configuration, the deferred-work
/// ring buffers, the drain coordinator, and the policy engine behind a
/// lock that only the maintenance thread ever contends for.
pub(crate) struct Inner<K, V> {
    store: Box<dyn Store<K, V>>,
    policy: Policy,
    read_buffer: RingBuffer<ReadTask<K, V>>,
    write_buffer: RingBuffer<WriteTask<K, V>>,
    drain_status: DrainStatus,
    engine: Mutex<PolicyEngine<K, V>>,
    maintenance_tx: Sender<()>,
}

impl<K, V> Inner<K, V>
where
    K: AsRef<[u8]> + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builds the shared state and spawns its dedicated maintenance
    /// thread, returning a handle the `Cache` keeps alive for as long as
    /// it wants the worker running.
    pub(crate) fn new(store: Box<dyn Store<K, V>>, policy: Policy) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = bounded::<()>(1);
        let engine = Mutex::new(PolicyEngine::new(policy.sketch_capacity()));

        let inner = Arc::new(Self {
            store,
            policy,
            read_buffer: RingBuffer::new(),
            write_buffer: RingBuffer::new(),
            drain_status: DrainStatus::default(),
            engine,
            maintenance_tx: tx,
        });

        let worker_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("tinylfu-cache-maintenance".to_string())
            .spawn(move || {
                while rx.recv().is_ok() {
                    worker_inner.run_maintenance();
                    if worker_inner.drain_status.is_required() {
                        trace!("maintenance left state Required, rescheduling immediately");
                        let _ = worker_inner.maintenance_tx.try_send(());
                    }
                }
            })
            .expect("failed to spawn the cache's maintenance thread");

        (inner, handle)
    }

    pub(crate) fn store(&self) -> &dyn Store<K, V> {
        self.store.as_ref()
    }

    pub(crate) fn policy(&self) -> &Policy {
        &self.policy
    }

    fn run_maintenance(&self) {
        debug!("running maintenance pass");
        let mut engine = self.engine.lock();
        engine.maintenance(
            self.store.as_ref(),
            &self.policy,
            &self.read_buffer,
            &self.write_buffer,
            &self.drain_status,
        );
    }

    /// Hands a maintenance run to the dedicated worker thread. A `Full`
    /// channel is expected and harmless: the drain coordinator only ever
    /// lets one pending task exist at a time, so `Full` just means a run
    /// is already queued. `Disconnected` means the worker thread has
    /// died, which spec §7 treats the same as a drain-state invariant
    /// violation: an unrecoverable internal error that must never occur
    /// in a correct running cache.
    fn submit_maintenance(&self) {
        match self.maintenance_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                let err = CacheError::Internal(
                    "maintenance worker thread has exited; the executor channel is disconnected"
                        .to_string(),
                );
                panic!("{err}");
            }
        }
    }

    /// `after_read` (spec §4.8): a single offer to the read buffer,
    /// non-delayable only when the buffer was found full.
    pub(crate) fn after_read(&self, node: Arc<PolicyNode<K, V>>) {
        let delayable = !matches!(self.read_buffer.offer(ReadTask { node }), OfferOutcome::Full(_));
        if self.drain_status.should_drain_buffers(delayable) {
            self.drain_status.schedule_drain_buffers(|| self.submit_maintenance());
        }
    }

    /// `after_write` (spec §4.8): retries the write-buffer offer up to a
    /// fixed budget, falling back to a synchronous maintenance run plus
    /// inline execution of the task under sustained backpressure so a
    /// write is never silently dropped.
    pub(crate) fn after_write(&self, task: WriteTask<K, V>) {
        let mut pending = task;
        for _ in 0..WRITE_RETRY_BUDGET {
            match self.write_buffer.offer(pending) {
                OfferOutcome::Success => {
                    self.drain_status.schedule_after_write(|| self.submit_maintenance());
                    return;
                }
                OfferOutcome::Failed(returned) => {
                    pending = returned;
                    continue;
                }
                OfferOutcome::Full(returned) => {
                    pending = returned;
                    break;
                }
            }
        }

        debug!("write buffer under sustained backpressure, falling back to inline execution");
        self.submit_maintenance();
        let mut engine = self.engine.lock();
        engine.run_write_task(pending, &self.policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CacheRegion;
    use crate::store::DashMapStore;
    use std::thread::sleep;
    use std::time::Duration;

    fn policy(maximum: u64) -> Policy {
        Policy::new(maximum, (maximum / 4).max(1), maximum, maximum, true)
    }

    fn settle() {
        sleep(Duration::from_millis(50));
    }

    #[test]
    fn admit_prefers_the_more_frequent_candidate() {
        let mut engine: PolicyEngine<String, u64> = PolicyEngine::new(64);
        let candidate_hash = 1u64;
        let victim_hash = 2u64;

        for _ in 0..8 {
            engine.sketch.increment(candidate_hash);
        }
        assert!(engine.admit(candidate_hash, victim_hash));
    }

    #[test]
    fn admit_rejects_a_low_frequency_candidate() {
        let engine: PolicyEngine<String, u64> = PolicyEngine::new(64);
        // Neither hash has ever been incremented: both frequencies are 0,
        // so `cf > vf` is false and `cf <= floor` rejects outright.
        assert!(!engine.admit(1, 2));
    }

    #[test]
    fn add_below_window_maximum_stays_in_window() {
        let store: Box<dyn Store<String, u64>> = Box::new(DashMapStore::with_capacity(16));
        let (inner, _worker) = Inner::new(store, policy(100));

        for k in 0..3u64 {
            let key = Arc::new(k.to_string());
            let node = PolicyNode::new(Arc::clone(&key), k, Arc::new(k), 1, CacheRegion::Window);
            inner.store().put_if_absent(key, Arc::clone(&node));
            inner.after_write(WriteTask::Add(node));
        }
        settle();

        assert_eq!(inner.store().len(), 3);
        for k in 0..3u64 {
            let node = inner.store().get(&k.to_string()).unwrap();
            assert_eq!(node.tag(), CacheRegion::Window);
        }
    }

    #[test]
    fn eviction_keeps_size_within_maximum() {
        let store: Box<dyn Store<String, u64>> = Box::new(DashMapStore::with_capacity(16));
        let (inner, _worker) = Inner::new(store, policy(4));

        for k in 0..20u64 {
            let key = Arc::new(k.to_string());
            let node = PolicyNode::new(Arc::clone(&key), k, Arc::new(k), 1, CacheRegion::Window);
            let prior = inner.store().put_if_absent(key, Arc::clone(&node));
            assert!(prior.is_none());
            inner.after_write(WriteTask::Add(node));
            settle();
        }

        assert!(inner.store().len() <= 4, "store len was {}", inner.store().len());
    }

    #[test]
    fn delete_removes_node_from_its_deque() {
        let store: Box<dyn Store<String, u64>> = Box::new(DashMapStore::with_capacity(16));
        let (inner, _worker) = Inner::new(store, policy(100));

        let key = Arc::new("1".to_string());
        let node = PolicyNode::new(Arc::clone(&key), 1, Arc::new(1u64), 1, CacheRegion::Window);
        inner.store().put_if_absent(Arc::clone(&key), Arc::clone(&node));
        inner.after_write(WriteTask::Add(Arc::clone(&node)));
        settle();

        inner.store().remove(key.as_ref());
        inner.after_write(WriteTask::Delete(node));
        settle();

        assert_eq!(inner.store().len(), 0);
    }
}
