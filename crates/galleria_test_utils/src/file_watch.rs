//! Recording cache file-watch sink

use galleria_scan::FileWatchSink;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Remembers every path it was notified about.
#[derive(Debug, Default)]
pub struct RecordingFileWatch {
    paths: Mutex<Vec<PathBuf>>,
    cv: Condvar,
}

impl RecordingFileWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` notifications arrived; returns them.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<PathBuf> {
        let deadline = Instant::now() + timeout;
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        while paths.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            paths = self
                .cv
                .wait_timeout(paths, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        paths.clone()
    }
}

impl FileWatchSink for RecordingFileWatch {
    fn notify_file_changed(&self, path: &Path) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        self.cv.notify_all();
    }
}
