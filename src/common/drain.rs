//! The four-state drain coordinator (spec §4.4): governs when a
//! maintenance run is scheduled and guarantees at most one is in flight.
use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const REQUIRED: u8 = 1;
const PROCESSING_TO_IDLE: u8 = 2;
const PROCESSING_TO_REQUIRED: u8 = 3;

/// Single atomic word carrying one of the four legal drain states.
pub(crate) struct DrainStatus(AtomicU8);

impl Default for DrainStatus {
    fn default() -> Self {
        Self(AtomicU8::new(IDLE))
    }
}

impl DrainStatus {
    #[inline]
    fn load(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// `Idle` ⇒ `!delayable`; `Required` ⇒ `true`; any `Processing*` ⇒
    /// `false`.
    pub(crate) fn should_drain_buffers(&self, delayable: bool) -> bool {
        match self.load() {
            IDLE => !delayable,
            REQUIRED => true,
            PROCESSING_TO_IDLE | PROCESSING_TO_REQUIRED => false,
            other => panic!("drain coordinator observed an illegal state: {other}"),
        }
    }

    /// Used by the `after_read` path (and, indirectly, by anything that
    /// just wants "make sure a maintenance run is either in flight or
    /// about to be"). No-ops once a maintenance task is already in
    /// flight; otherwise CASes to `ProcessingToIdle` and calls `submit`
    /// exactly once.
    pub(crate) fn schedule_drain_buffers(&self, submit: impl FnOnce()) {
        loop {
            let cur = self.load();
            if cur >= PROCESSING_TO_IDLE {
                return;
            }
            match self.0.compare_exchange(
                cur,
                PROCESSING_TO_IDLE,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    submit();
                    return;
                }
                Err(_) => continue,
            }
        }
    }

    /// Used by `after_write`. Differs from `schedule_drain_buffers` in
    /// the `ProcessingToIdle` case: a write arriving mid-drain must force
    /// another maintenance round once the current one finishes, rather
    /// than being a no-op.
    pub(crate) fn schedule_after_write(&self, submit: impl FnOnce()) {
        loop {
            let cur = self.load();
            match cur {
                IDLE => match self.0.compare_exchange(
                    IDLE,
                    REQUIRED,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        submit();
                        return;
                    }
                    Err(_) => continue,
                },
                REQUIRED => {
                    submit();
                    return;
                }
                PROCESSING_TO_IDLE => match self.0.compare_exchange(
                    PROCESSING_TO_IDLE,
                    PROCESSING_TO_REQUIRED,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(_) => continue,
                },
                PROCESSING_TO_REQUIRED => return,
                other => panic!("drain coordinator observed an illegal state: {other}"),
            }
        }
    }

    /// Maintenance entry point, step 1: unconditionally mark this run as
    /// the authoritative `ProcessingToIdle` state. The executor only ever
    /// invokes maintenance after a `ProcessingToIdle` CAS succeeded (or
    /// after finding `Required` — see `take_required`), so this is a
    /// plain store, not a CAS.
    pub(crate) fn begin_maintenance(&self) {
        self.0.store(PROCESSING_TO_IDLE, Ordering::Release);
    }

    /// Maintenance terminal step (spec §4.4 step 5), run on every exit
    /// path including panics: if the state drifted away from
    /// `ProcessingToIdle`, or the idle CAS loses the race, land on
    /// `Required` instead of `Idle`.
    pub(crate) fn finish_maintenance(&self) {
        let cur = self.load();
        if cur != PROCESSING_TO_IDLE {
            self.0.store(REQUIRED, Ordering::Release);
            return;
        }
        if self
            .0
            .compare_exchange(
                PROCESSING_TO_IDLE,
                IDLE,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            self.0.store(REQUIRED, Ordering::Release);
        }
    }

    /// `true` if the coordinator landed on `Required` after the last
    /// maintenance run, meaning the worker should reschedule immediately.
    pub(crate) fn is_required(&self) -> bool {
        self.load() == REQUIRED
    }

    #[cfg(test)]
    pub(crate) fn set_required(&self) {
        self.0.store(REQUIRED, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn set_processing_to_idle(&self) {
        self.0.store(PROCESSING_TO_IDLE, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn state_name(&self) -> &'static str {
        match self.load() {
            IDLE => "Idle",
            REQUIRED => "Required",
            PROCESSING_TO_IDLE => "ProcessingToIdle",
            PROCESSING_TO_REQUIRED => "ProcessingToRequired",
            _ => "Illegal",
        }
    }
}
