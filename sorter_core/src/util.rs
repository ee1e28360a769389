//! Common polling helpers for sorter_core.

use std::time::{Duration, Instant};

/// Poll `done` until it returns true or `timeout` elapses.
/// Returns whether `done` was observed true.
pub fn wait_until<F>(mut done: F, timeout: Duration, poll: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(poll.min(deadline - now));
    }
}

/// Milliseconds in `d`, saturating at `u64::MAX`. For log fields.
#[inline]
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
