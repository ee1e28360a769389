//! Cross-task signalling: per-task cancellation, the process-wide shutdown
//! flag, and the single-slot completion rendezvous.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Cooperative cancellation for one background task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Process-wide shutdown flag. Running -> ShuttingDown, never back.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the call that flipped the flag.
    pub fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why a completion wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Completed,
    Interrupted,
}

/// Single-slot set/wait/clear rendezvous between the workflow and the main loop.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    done: Mutex<bool>,
    cv: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self) {
        *self.slot() = true;
        self.cv.notify_all();
    }

    pub fn clear(&self) {
        *self.slot() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.slot()
    }

    /// Wake waiters so they re-check `shutdown` without setting the slot.
    pub fn interrupt(&self) {
        let _slot = self.slot();
        self.cv.notify_all();
    }

    /// Block until set, or until `shutdown` is observed after an `interrupt`.
    pub fn wait(&self, shutdown: &ShutdownFlag) -> Wake {
        let mut done = self.slot();
        loop {
            if *done {
                return Wake::Completed;
            }
            if shutdown.is_set() {
                return Wake::Interrupted;
            }
            done = self.cv.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait`, giving up after `timeout`.
    pub fn wait_timeout(&self, shutdown: &ShutdownFlag, timeout: Duration) -> Option<Wake> {
        let done = self.slot();
        let (done, _) = self
            .cv
            .wait_timeout_while(done, timeout, |d| !*d && !shutdown.is_set())
            .unwrap_or_else(PoisonError::into_inner);
        if *done {
            Some(Wake::Completed)
        } else if shutdown.is_set() {
            Some(Wake::Interrupted)
        } else {
            None
        }
    }
}

/// Sets the completion signal when dropped, so a cycle always signals once.
pub(crate) struct CompletionGuard<'a>(&'a CompletionSignal);

impl<'a> CompletionGuard<'a> {
    pub(crate) fn new(signal: &'a CompletionSignal) -> Self {
        Self(signal)
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.set();
    }
}
