//! Background task lifecycle: at most one live task per kind.
//!
//! Each kind has a slot guarded by two locks. `lifecycle` serializes start
//! and joining stops so a start never races the join of its predecessor;
//! `current` is held only briefly so a task can cancel itself without
//! waiting on a caller that is joining it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::signal::{CancelToken, ShutdownFlag};
use crate::status::StopOutcome;

const JOIN_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ScaleListening,
    LightAnimation,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::ScaleListening, TaskKind::LightAnimation];

    #[inline]
    fn index(self) -> usize {
        match self {
            TaskKind::ScaleListening => 0,
            TaskKind::LightAnimation => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::ScaleListening => "scale-listener",
            TaskKind::LightAnimation => "light-animation",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("shutdown in progress; not starting {0}")]
    ShuttingDown(TaskKind),
    #[error("failed to spawn {kind} thread: {source}")]
    Spawn {
        kind: TaskKind,
        #[source]
        source: std::io::Error,
    },
}

/// Identifies one started task. Stale once the task has been stopped.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    kind: TaskKind,
    id: u64,
    cancel: CancelToken,
    thread: ThreadId,
}

impl TaskHandle {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl Eq for TaskHandle {}

struct Running {
    handle: TaskHandle,
    join: JoinHandle<()>,
}

impl Running {
    fn is_live(&self) -> bool {
        !self.handle.is_cancelled() && !self.join.is_finished()
    }
}

#[derive(Default)]
struct Slot {
    lifecycle: Mutex<()>,
    current: Mutex<Option<Running>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TaskSupervisor {
    slots: [Slot; 2],
    next_id: AtomicU64,
    shutdown: ShutdownFlag,
}

impl fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("scale_listening", &self.is_running(TaskKind::ScaleListening))
            .field("light_animation", &self.is_running(TaskKind::LightAnimation))
            .field("shutting_down", &self.shutdown.is_set())
            .finish()
    }
}

impl TaskSupervisor {
    pub fn new(shutdown: ShutdownFlag) -> Self {
        Self {
            slots: Default::default(),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    fn slot(&self, kind: TaskKind) -> &Slot {
        &self.slots[kind.index()]
    }

    /// Handle of the live task of `kind`, if any.
    pub fn current(&self, kind: TaskKind) -> Option<TaskHandle> {
        lock(&self.slot(kind).current)
            .as_ref()
            .filter(|r| r.is_live())
            .map(|r| r.handle.clone())
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.current(kind).is_some()
    }

    /// Start `job` on a fresh thread unless a live task of `kind` exists, in
    /// which case its handle is returned and `job` is dropped.
    ///
    /// A cancelled or finished predecessor is joined first.
    pub fn start<F>(&self, kind: TaskKind, job: F) -> Result<TaskHandle, SupervisorError>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let slot = self.slot(kind);
        let _life = lock(&slot.lifecycle);
        if self.shutdown.is_set() {
            debug!(%kind, "start refused during shutdown");
            return Err(SupervisorError::ShuttingDown(kind));
        }

        let stale = {
            let mut cur = lock(&slot.current);
            match cur.as_ref() {
                Some(r) if r.is_live() => {
                    debug!(%kind, id = r.handle.id, "task already running");
                    return Ok(r.handle.clone());
                }
                _ => cur.take(),
            }
        };
        if let Some(old) = stale {
            if old.handle.thread == thread::current().id() {
                debug!(%kind, id = old.handle.id, "restarted from inside old task; detaching it");
            } else {
                finish(old);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        let token = cancel.clone();
        // Held across spawn so the new task cannot look itself up before it is registered.
        let mut cur = lock(&slot.current);
        let join = thread::Builder::new()
            .name(format!("{kind}-{id}"))
            .spawn(move || job(token))
            .map_err(|source| SupervisorError::Spawn { kind, source })?;
        let handle = TaskHandle {
            kind,
            id,
            cancel,
            thread: join.thread().id(),
        };
        *cur = Some(Running {
            handle: handle.clone(),
            join,
        });
        drop(cur);
        debug!(%kind, id, "task started");
        Ok(handle)
    }

    /// Cancel and join the task. From the task's own thread this only signals.
    pub fn stop(&self, handle: &TaskHandle) -> StopOutcome {
        self.stop_inner(handle, None)
    }

    /// Like `stop`, detaching the task if it has not exited within `timeout`.
    pub fn stop_within(&self, handle: &TaskHandle, timeout: Duration) -> StopOutcome {
        self.stop_inner(handle, Some(timeout))
    }

    /// Stop whatever task of `kind` is current, live or not.
    pub fn stop_kind(&self, kind: TaskKind, timeout: Option<Duration>) -> StopOutcome {
        let handle = lock(&self.slot(kind).current)
            .as_ref()
            .map(|r| r.handle.clone());
        match handle {
            Some(h) => self.stop_inner(&h, timeout),
            None => StopOutcome::NotRunning,
        }
    }

    fn stop_inner(&self, handle: &TaskHandle, timeout: Option<Duration>) -> StopOutcome {
        let slot = self.slot(handle.kind);
        {
            let cur = lock(&slot.current);
            if !cur.as_ref().is_some_and(|r| r.handle == *handle) {
                debug!(kind = %handle.kind, id = handle.id, "stop on stale handle ignored");
                return StopOutcome::NotRunning;
            }
        }
        handle.cancel.cancel();
        if handle.thread == thread::current().id() {
            debug!(kind = %handle.kind, id = handle.id, "stop requested from inside task");
            return StopOutcome::Signalled;
        }

        let _life = lock(&slot.lifecycle);
        let running = {
            let mut cur = lock(&slot.current);
            match cur.take() {
                Some(r) if r.handle == *handle => r,
                other => {
                    *cur = other;
                    return StopOutcome::NotRunning;
                }
            }
        };

        if let Some(timeout) = timeout {
            let exited =
                crate::util::wait_until(|| running.join.is_finished(), timeout, JOIN_POLL);
            if !exited {
                warn!(
                    kind = %handle.kind,
                    id = handle.id,
                    timeout_ms = crate::util::millis(timeout),
                    "task did not stop in time; detaching"
                );
                return StopOutcome::TimedOut;
            }
        }
        finish(running)
    }
}

fn finish(running: Running) -> StopOutcome {
    let Running { handle, join } = running;
    match join.join() {
        Ok(()) => {
            debug!(kind = %handle.kind, id = handle.id, "task joined");
            StopOutcome::Joined
        }
        Err(e) => {
            warn!(kind = %handle.kind, id = handle.id, ?e, "task panicked");
            StopOutcome::Panicked
        }
    }
}
