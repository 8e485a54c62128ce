//! All-processor quiescence
//!
//! [`ProcessorLock::acquire`] parks every other processing unit in a busy
//! wait and returns a [`QuiesceToken`]; dropping the token lets them go.
//! While the token is held, the caller is the only code running on the
//! machine, which is what a live code patch needs.
//!
//! Each parked unit runs a deferred callback that increments the shared
//! `acquired` counter, spins on the release flag, then decrements the
//! counter and marks itself finished. Acquire waits for `acquired` to reach
//! N-1; release waits for every queued callback to finish.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::{Mutex, MutexGuard};
use ssmon_api::platform::{ExecutionLevel, ProcessorWork, Processors};
use ssmon_api::{Error, Result};

#[derive(Debug, Default)]
struct QuiesceState {
    acquired: AtomicUsize,
    finished: AtomicUsize,
    release: AtomicBool,
}

impl QuiesceState {
    fn park(&self) {
        self.acquired.fetch_add(1, Ordering::AcqRel);
        while !self.release.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
        self.acquired.fetch_sub(1, Ordering::AcqRel);
        self.finished.fetch_add(1, Ordering::AcqRel);
    }

    fn wait_released(&self, queued: usize) {
        while self.acquired.load(Ordering::Acquire) != 0
            || self.finished.load(Ordering::Acquire) != queued
        {
            core::hint::spin_loop();
        }
    }
}

/// Mutual exclusion against every other processing unit
pub struct ProcessorLock {
    processors: Arc<dyn Processors>,
    guard: Mutex<()>,
    state: Arc<QuiesceState>,
}

impl ProcessorLock {
    pub fn new(processors: Arc<dyn Processors>) -> Self {
        Self {
            processors,
            guard: Mutex::new(()),
            state: Arc::new(QuiesceState::default()),
        }
    }

    /// Freezes all other units
    ///
    /// Blocks while another caller holds the lock. Fails with
    /// `InsufficientResources` if the per-unit callbacks cannot be
    /// allocated, and with the platform's error if one cannot be queued; in
    /// both cases no unit is left parked.
    pub fn acquire(&self) -> Result<QuiesceToken<'_>> {
        let guard = self.guard.lock();
        let count = self.processors.count();

        if count <= 1 {
            let previous = self.processors.raise_level();
            return Ok(QuiesceToken { lock: self, _guard: guard, previous, queued: 0 });
        }

        let current = self.processors.current();
        let others = count - 1;

        let mut callbacks: Vec<(usize, ProcessorWork)> = Vec::new();
        callbacks
            .try_reserve_exact(others)
            .map_err(|_| Error::InsufficientResources("quiescence callbacks"))?;

        self.state.acquired.store(0, Ordering::Release);
        self.state.finished.store(0, Ordering::Release);
        self.state.release.store(false, Ordering::Release);

        for index in (0..count).filter(|&index| index != current) {
            let state = Arc::clone(&self.state);
            callbacks.push((index, Box::new(move || state.park())));
        }

        let previous = self.processors.raise_level();
        let mut queued = 0;
        for (index, work) in callbacks {
            if let Err(err) = self.processors.queue_on(index, work) {
                ss_warn!("quiesce: could not queue on processor {}: {}", index, err);
                self.state.release.store(true, Ordering::Release);
                self.state.wait_released(queued);
                self.processors.lower_level(previous);
                return Err(err);
            }
            queued += 1;
        }

        while self.state.acquired.load(Ordering::Acquire) != others {
            core::hint::spin_loop();
        }

        Ok(QuiesceToken { lock: self, _guard: guard, previous, queued })
    }

    /// Number of units currently parked
    pub fn acquired_count(&self) -> usize {
        self.state.acquired.load(Ordering::Acquire)
    }
}

/// Proof that every other unit is parked
///
/// Dropping the token releases the units and waits until all of them have
/// left the busy wait.
pub struct QuiesceToken<'a> {
    lock: &'a ProcessorLock,
    _guard: MutexGuard<'a, ()>,
    previous: ExecutionLevel,
    queued: usize,
}

impl QuiesceToken<'_> {
    /// Units parked under this token
    pub fn parked(&self) -> usize {
        self.queued
    }

    /// Releases the other units
    pub fn release(self) {}
}

impl Drop for QuiesceToken<'_> {
    fn drop(&mut self) {
        if self.queued > 0 {
            self.lock.state.release.store(true, Ordering::Release);
            self.lock.state.wait_released(self.queued);
        }
        self.lock.processors.lower_level(self.previous);
    }
}
