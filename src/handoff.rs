//! Snapshot handoff between the control path and the stream callback.
//!
//! The control path publishes a new immutable snapshot and, while the
//! stream runs, waits until the callback confirms it. The callback only
//! ever *tries* the processing lock: when it is contended, confirmation is
//! deferred to the next cycle and the callback carries on.

use arc_swap::{ArcSwap, Guard};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::processor::ProcReg;

/// Immutable ordered list of registrations the callback may iterate.
pub(crate) struct Snapshot {
    pub epoch: u64,
    pub entries: Box<[Arc<ProcReg>]>,
}

impl Snapshot {
    pub fn empty(epoch: u64) -> Self {
        Self {
            epoch,
            entries: Box::new([]),
        }
    }
}

pub(crate) struct Handoff {
    published: ArcSwap<Snapshot>,
    /// Epoch of the snapshot the callback last confirmed. Guarded by the
    /// processing lock.
    confirmed: Mutex<u64>,
    cv: Condvar,
    shutdown: AtomicBool,
    severe: AtomicBool,
}

impl Handoff {
    pub fn new(initial: Arc<Snapshot>) -> Self {
        let epoch = initial.epoch;
        Self {
            published: ArcSwap::new(initial),
            confirmed: Mutex::new(epoch),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            severe: AtomicBool::new(false),
        }
    }

    /// Publish `snapshot`. With `running` set this blocks until the callback
    /// has adopted it or shutdown was requested.
    pub fn publish(&self, snapshot: Arc<Snapshot>, running: bool) {
        let epoch = snapshot.epoch;
        let mut confirmed = self.confirmed.lock();
        self.published.store(snapshot);
        if running {
            while !self.shutdown.load(Ordering::Acquire) && *confirmed != epoch {
                self.cv.wait(&mut confirmed);
            }
        }
        *confirmed = epoch;
    }

    /// Current snapshot, wait-free.
    #[inline]
    pub fn load(&self) -> Guard<Arc<Snapshot>> {
        self.published.load()
    }

    /// Callback side: mark `epoch` as in use. Returns false when the lock
    /// was contended and nothing changed.
    #[inline]
    pub fn try_confirm(&self, epoch: u64) -> bool {
        match self.confirmed.try_lock() {
            Some(mut confirmed) => {
                *confirmed = epoch;
                self.cv.notify_all();
                true
            }
            None => false,
        }
    }

    pub fn confirmed_epoch(&self) -> u64 {
        *self.confirmed.lock()
    }

    /// Stop the callback and release any waiting publisher.
    pub fn signal_shutdown(&self, severe: bool) {
        let _confirmed = self.confirmed.lock();
        if severe {
            self.severe.store(true, Ordering::Release);
        }
        self.shutdown.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn is_severe(&self) -> bool {
        self.severe.load(Ordering::Acquire)
    }
}
