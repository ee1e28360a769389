//! Light animations run as a supervised background task.

use std::sync::Arc;

use sorter_traits::{Clock, LightChannel, LightColor, LightDriver};
use tracing::debug;

use crate::config::{Animation, Pattern};
use crate::signal::CancelToken;
use crate::supervisor::{SupervisorError, TaskHandle, TaskKind, TaskSupervisor};

pub type SharedLights = Arc<dyn LightDriver + Send + Sync>;

const RED: LightChannel = LightChannel::Color(LightColor::Red);
const GREEN: LightChannel = LightChannel::Color(LightColor::Green);
const BLUE: LightChannel = LightChannel::Color(LightColor::Blue);

const FLASH: &[(LightChannel, bool)] = &[(LightChannel::All, true), (LightChannel::All, false)];
const WAVE: &[(LightChannel, bool)] = &[
    (RED, true),
    (GREEN, true),
    (BLUE, true),
    (RED, false),
    (GREEN, false),
    (BLUE, false),
];

fn steps(pattern: Pattern) -> &'static [(LightChannel, bool)] {
    match pattern {
        Pattern::Flash => FLASH,
        Pattern::Wave => WAVE,
    }
}

/// Loop `animation` until cancelled, then leave every light off.
///
/// Cancellation is checked before each step, so a stop takes effect within
/// one interval.
pub fn animate(
    lights: &dyn LightDriver,
    animation: Animation,
    cancel: &CancelToken,
    clock: &dyn Clock,
) {
    debug!(pattern = ?animation.pattern, "animation started");
    'outer: loop {
        for &(channel, on) in steps(animation.pattern) {
            if cancel.is_cancelled() {
                break 'outer;
            }
            if on {
                lights.on(channel);
            } else {
                lights.off(channel);
            }
            clock.sleep(animation.interval);
        }
    }
    lights.off(LightChannel::All);
    debug!("animation stopped");
}

/// Start `animation` as the light-animation task (or return the running one).
pub fn start_animation(
    supervisor: &TaskSupervisor,
    lights: &SharedLights,
    animation: Animation,
    clock: &Arc<dyn Clock + Send + Sync>,
) -> Result<TaskHandle, SupervisorError> {
    let lights = lights.clone();
    let clock = clock.clone();
    supervisor.start(TaskKind::LightAnimation, move |cancel| {
        animate(lights.as_ref(), animation, &cancel, clock.as_ref());
    })
}
