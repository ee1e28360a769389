//! Orderly teardown, reachable from any thread exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as xch;
use sorter_traits::LightChannel;
use tracing::{debug, info, warn};

use crate::config::TeardownCfg;
use crate::lights::SharedLights;
use crate::signal::{CompletionSignal, ShutdownFlag};
use crate::status::StopOutcome;
use crate::supervisor::{TaskKind, TaskSupervisor};
use crate::workflow::{SharedCamera, lock_camera_within};

/// What a `shutdown` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReport {
    /// This call ran the teardown.
    Completed {
        scale: StopOutcome,
        lights: StopOutcome,
    },
    /// Another call got there first; its teardown has finished (or this
    /// call gave up waiting for it).
    AlreadyRequested,
}

pub struct ShutdownCoordinator {
    flag: ShutdownFlag,
    supervisor: Arc<TaskSupervisor>,
    camera: SharedCamera,
    lights: SharedLights,
    completion: Arc<CompletionSignal>,
    cfg: TeardownCfg,
    claimed: AtomicBool,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl ShutdownCoordinator {
    pub fn new(
        flag: ShutdownFlag,
        supervisor: Arc<TaskSupervisor>,
        camera: SharedCamera,
        lights: SharedLights,
        completion: Arc<CompletionSignal>,
        cfg: TeardownCfg,
    ) -> Self {
        Self {
            flag,
            supervisor,
            camera,
            lights,
            completion,
            cfg,
            claimed: AtomicBool::new(false),
            finished: Mutex::new(false),
            finished_cv: Condvar::new(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.flag.is_set()
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the shutdown flag, stop both tasks within the join timeout,
    /// release the camera and turn the lights off.
    ///
    /// Each wait is bounded by the join timeout, so a hung collaborator
    /// delays this by at most three of them.
    ///
    /// Only the first call tears down. Later calls wait (bounded) for it.
    pub fn shutdown(&self) -> ShutdownReport {
        self.flag.trigger();
        self.completion.interrupt();
        if self.claimed.swap(true, Ordering::AcqRel) {
            debug!("shutdown already in progress");
            self.wait_finished();
            return ShutdownReport::AlreadyRequested;
        }

        info!("shutting down");
        let timeout = self.cfg.join_timeout;
        let scale = self
            .supervisor
            .stop_kind(TaskKind::ScaleListening, Some(timeout));
        let lights = self
            .supervisor
            .stop_kind(TaskKind::LightAnimation, Some(timeout));
        debug!(?scale, ?lights, "background tasks stopped");

        match lock_camera_within(&self.camera, timeout) {
            Some(mut camera) => camera.release(),
            None => warn!(
                timeout_ms = crate::util::millis(timeout),
                "camera busy with a capture; leaving release to the workflow"
            ),
        }
        self.lights.off(LightChannel::All);

        // Logged first: waiters may exit the process as soon as they wake.
        info!("shutdown complete");
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.finished_cv.notify_all();
        ShutdownReport::Completed { scale, lights }
    }

    fn wait_finished(&self) {
        // Two joins and the camera lock, plus slack for the lights.
        let bound = self.cfg.join_timeout * 3 + Duration::from_secs(1);
        let done = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .finished_cv
            .wait_timeout_while(done, bound, |d| !*d)
            .unwrap_or_else(PoisonError::into_inner);
        if !*done {
            warn!("gave up waiting for in-progress shutdown");
        }
    }

    /// Spawn a thread that runs `shutdown` on the first termination request,
    /// then hands the report to `on_done`.
    pub fn spawn_watcher<F>(self: &Arc<Self>, on_done: F) -> std::io::Result<TerminationWatcher>
    where
        F: FnOnce(ShutdownReport) + Send + 'static,
    {
        let (tx, rx) = xch::bounded::<()>(1);
        let coord = Arc::clone(self);
        let join = thread::Builder::new()
            .name("termination-watcher".into())
            .spawn(move || {
                if rx.recv().is_ok() {
                    info!("termination requested");
                    on_done(coord.shutdown());
                }
            })?;
        Ok(TerminationWatcher {
            tx,
            join: Some(join),
        })
    }
}

/// Sender side of the termination watcher. Safe to use from signal handlers.
pub struct TerminationWatcher {
    tx: xch::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl TerminationWatcher {
    /// A cloneable trigger, e.g. for a Ctrl-C handler.
    pub fn trigger(&self) -> TerminationTrigger {
        TerminationTrigger(self.tx.clone())
    }

    /// Request termination. Extra requests are ignored.
    pub fn request(&self) {
        let _ = self.tx.try_send(());
    }

    /// Wait for the watcher to finish handling a request.
    pub fn join(mut self) {
        if let Some(j) = self.join.take()
            && j.join().is_err()
        {
            warn!("termination watcher panicked");
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminationTrigger(xch::Sender<()>);

impl TerminationTrigger {
    pub fn request(&self) {
        let _ = self.0.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{CountingCamera, LightCall, RecordingLights};
    use crate::signal::{CancelToken, Wake};

    struct Rig {
        coord: Arc<ShutdownCoordinator>,
        supervisor: Arc<TaskSupervisor>,
        lights: Arc<RecordingLights>,
        camera: crate::mocks::CameraCounters,
        completion: Arc<CompletionSignal>,
        flag: ShutdownFlag,
    }

    fn rig() -> Rig {
        let flag = ShutdownFlag::new();
        let supervisor = Arc::new(TaskSupervisor::new(flag.clone()));
        let lights = Arc::new(RecordingLights::new());
        let cam = CountingCamera::new();
        let camera = cam.counters();
        let completion = Arc::new(CompletionSignal::new());
        let coord = Arc::new(ShutdownCoordinator::new(
            flag.clone(),
            supervisor.clone(),
            Arc::new(Mutex::new(Box::new(cam))),
            lights.clone(),
            completion.clone(),
            TeardownCfg {
                join_timeout: Duration::from_millis(200),
            },
        ));
        Rig {
            coord,
            supervisor,
            lights,
            camera,
            completion,
            flag,
        }
    }

    fn spin(cancel: CancelToken) {
        while !cancel.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn tears_down_tasks_camera_and_lights() {
        let r = rig();
        r.supervisor.start(TaskKind::ScaleListening, spin).unwrap();
        r.supervisor.start(TaskKind::LightAnimation, spin).unwrap();
        let report = r.coord.shutdown();
        assert_eq!(
            report,
            ShutdownReport::Completed {
                scale: StopOutcome::Joined,
                lights: StopOutcome::Joined,
            }
        );
        assert!(r.flag.is_set());
        assert_eq!(r.camera.releases(), 1);
        assert_eq!(r.lights.last(), Some(LightCall::Off(LightChannel::All)));
        assert!(!r.supervisor.is_running(TaskKind::ScaleListening));
        assert!(r.coord.is_finished());
    }

    #[test]
    fn concurrent_requests_release_camera_once() {
        let r = rig();
        r.supervisor.start(TaskKind::ScaleListening, spin).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = r.coord.clone();
                thread::spawn(move || c.shutdown())
            })
            .collect();
        let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let completed = reports
            .iter()
            .filter(|r| matches!(r, ShutdownReport::Completed { .. }))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(r.camera.releases(), 1);
        assert!(r.coord.is_finished());
    }

    #[test]
    fn wakes_main_loop_waiter() {
        let r = rig();
        let (completion, flag) = (r.completion.clone(), r.flag.clone());
        let waiter = thread::spawn(move || completion.wait(&flag));
        thread::sleep(Duration::from_millis(10));
        r.coord.shutdown();
        assert_eq!(waiter.join().unwrap(), Wake::Interrupted);
    }

    #[test]
    fn stuck_task_does_not_block_teardown() {
        let r = rig();
        r.supervisor
            .start(TaskKind::ScaleListening, |_| {
                thread::sleep(Duration::from_millis(800));
            })
            .unwrap();
        let report = r.coord.shutdown();
        assert!(matches!(
            report,
            ShutdownReport::Completed {
                scale: StopOutcome::TimedOut,
                ..
            }
        ));
        assert_eq!(r.camera.releases(), 1);
    }

    #[test]
    fn watcher_runs_shutdown_on_request() {
        let r = rig();
        let (tx, rx) = xch::bounded(1);
        let watcher = r
            .coord
            .spawn_watcher(move |report| {
                let _ = tx.send(report);
            })
            .unwrap();
        watcher.trigger().request();
        watcher.request();
        let report = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(report, ShutdownReport::Completed { .. }));
        watcher.join();
        assert_eq!(r.camera.releases(), 1);
    }
}
