use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

/// Existence-only marker the plugin manager creates once its injection-time
/// setup is done. The launcher never reads it, it only watches for it.
pub struct ReadyFile {
    path: PathBuf,
    max_attempts: u32,
    interval: Duration,
}

impl ReadyFile {
    pub fn new(path: impl Into<PathBuf>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            path: path.into(),
            max_attempts,
            interval,
        }
    }

    /// Remove a marker left behind by a previous run.
    ///
    /// A leftover marker would count as ready before the dll even loads, so
    /// this runs before anything else. Failure to remove is logged, not fatal.
    pub fn clear(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(
                    "could not remove stale ready file {}: {err}",
                    self.path.display()
                );
            }
        }
    }

    /// Block until the marker exists, checking once per interval.
    ///
    /// Returns false once the attempt budget is spent without a sighting.
    pub fn wait(&self) -> bool {
        for attempt in 0..self.max_attempts {
            if self.path.exists() {
                debug!("ready file observed after {attempt} polls");
                return true;
            }

            thread::sleep(self.interval);
        }

        false
    }
}
