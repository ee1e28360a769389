//! Still capture through an external program (fswebcam, libcamera-still, ...).
//!
//! Files are named `pi_image_NNN.jpg` and numbering resumes from the most
//! recently written image so restarts never overwrite earlier captures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sorter_traits::{Camera, DriverError};

use crate::error::{HwError, Result};
use crate::util::{expand_args, output_within};

const PREFIX: &str = "pi_image_";
const EXT: &str = "jpg";

/// Sequential image file names inside one directory.
#[derive(Debug)]
pub struct ImageSequence {
    dir: PathBuf,
    next: u32,
}

impl ImageSequence {
    /// Create the directory if needed and continue after its newest image.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let next = newest_number(&dir)?.map_or(1, |n| n.saturating_add(1));
        tracing::debug!(dir = %dir.display(), next, "image numbering initialised");
        Ok(Self { dir, next })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve the next file name.
    pub fn next_path(&mut self) -> PathBuf {
        let path = self.dir.join(format!("{PREFIX}{:03}.{EXT}", self.next));
        self.next = self.next.saturating_add(1);
        path
    }
}

/// Number embedded in the most recently modified `pi_image_NNN.jpg`, if any.
fn newest_number(dir: &Path) -> Result<Option<u32>> {
    let mut newest: Option<(std::time::SystemTime, u32)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(n) = name
            .to_str()
            .and_then(|s| s.strip_prefix(PREFIX))
            .and_then(|s| s.strip_suffix(&format!(".{EXT}")))
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };
        let modified = entry.metadata()?.modified()?;
        if newest.is_none_or(|(t, _)| modified >= t) {
            newest = Some((modified, n));
        }
    }
    Ok(newest.map(|(_, n)| n))
}

/// Camera that shells out once per frame.
pub struct CommandCamera {
    device: String,
    command: Vec<String>,
    images: ImageSequence,
    timeout: Duration,
    open: bool,
}

impl CommandCamera {
    /// A capture that has not finished within `timeout` is killed and reported as failed.
    pub fn new(
        device: impl Into<String>,
        command: Vec<String>,
        images: ImageSequence,
        timeout: Duration,
    ) -> Self {
        Self {
            device: device.into(),
            command,
            images,
            timeout,
            open: false,
        }
    }

    fn capture_to(&mut self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        let argv = expand_args(
            &self.command,
            &[("device", self.device.as_str()), ("path", path_str.as_ref())],
        );
        let (program, args) = argv.split_first().ok_or_else(|| HwError::Command {
            program: String::new(),
            detail: "empty capture command".into(),
        })?;
        tracing::debug!(program, ?args, "running capture command");
        let output = output_within(program, args, self.timeout)?;
        if !output.status.success() {
            return Err(HwError::Command {
                program: program.clone(),
                detail: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        if !path.exists() {
            return Err(HwError::Command {
                program: program.clone(),
                detail: format!("no image written to {}", path.display()),
            });
        }
        Ok(())
    }
}

impl Camera for CommandCamera {
    fn capture(&mut self) -> std::result::Result<PathBuf, DriverError> {
        self.open = true;
        let path = self.images.next_path();
        tracing::info!(device = %self.device, "taking photo");
        self.capture_to(&path)?;
        tracing::info!(path = %path.display(), "image saved");
        Ok(path)
    }

    fn release(&mut self) {
        if self.open {
            tracing::info!(device = %self.device, "releasing camera");
            self.open = false;
        }
    }
}
