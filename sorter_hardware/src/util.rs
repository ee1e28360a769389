use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

const CHILD_POLL: Duration = Duration::from_millis(10);

/// Wait until the provided `is_high` predicate becomes false (i.e., line goes low),
/// or a timeout expires. Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_low_with_timeout(
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_high() {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Expand `{key}` placeholders in an argv template.
///
/// Arguments without placeholders pass through untouched; unknown
/// placeholders are left as-is so the external program can report them.
pub fn expand_args(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        })
        .collect()
}

/// Run `program args..` to completion, killing it if it outlives `timeout`.
///
/// Stdout and stderr are drained on helper threads so a chatty child cannot
/// block on a full pipe while it is being polled.
pub fn output_within(program: &str, args: &[String], timeout: Duration) -> Result<Output> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                tracing::warn!(program, error = %e, "failed to kill overdue child");
            }
            let _ = child.wait();
            return Err(HwError::Command {
                program: program.to_string(),
                detail: format!("timed out after {} ms", timeout.as_millis()),
            });
        }
        thread::sleep(CHILD_POLL);
    };

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_every_occurrence() {
        let tpl: Vec<String> = ["cap", "-d", "{device}", "{path}", "--out={path}"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let out = expand_args(&tpl, &[("device", "/dev/video0"), ("path", "/tmp/a.jpg")]);
        assert_eq!(
            out,
            ["cap", "-d", "/dev/video0", "/tmp/a.jpg", "--out=/tmp/a.jpg"]
        );
    }

    #[test]
    fn unknown_placeholders_survive() {
        let tpl = vec!["{model}".to_string()];
        assert_eq!(expand_args(&tpl, &[("image", "x")]), ["{model}"]);
    }
}
