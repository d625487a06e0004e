//! Collection scanner collaborator interface
//!
//! The scanner performs the actual directory and file inspection and the
//! database writes. The controller creates a fresh scanner for every unit of
//! work through a [`ScannerFactory`], configured with [`ScannerOptions`].

use crate::events::ScanProgress;
use crate::hints::HintContainer;
use crate::observer::CancellationObserver;
use crate::types::{ItemId, ItemInfo};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// How thoroughly a single file is scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Skip the file if size and modification time are unchanged.
    NormalScan,
    /// Re-read metadata that may have changed on disk.
    ModifiedScan,
    /// Read everything from scratch.
    Rescan,
}

/// Configuration for one scanner instance
#[derive(Clone)]
pub struct ScannerOptions {
    /// Pending hints shared with every other scanner
    pub hints: Arc<HintContainer>,
    /// Polled at checkpoints; `None` means run to completion
    pub observer: Option<Arc<dyn CancellationObserver>>,
    /// Progress relay; `None` for scans nobody watches
    pub progress: Option<ScanProgress>,
    /// Count files up front so progress can be shown as a fraction
    pub need_file_count: bool,
    /// Discover albums only and postpone per-file scanning
    pub deferred_file_scanning: bool,
}

impl ScannerOptions {
    /// Options with only the hint container set.
    pub fn new(hints: Arc<HintContainer>) -> Self {
        Self {
            hints,
            observer: None,
            progress: None,
            need_file_count: false,
            deferred_file_scanning: false,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CancellationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_progress(mut self, progress: ScanProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_need_file_count(mut self, need: bool) -> Self {
        self.need_file_count = need;
        self
    }

    pub fn with_deferred_file_scanning(mut self, defer: bool) -> Self {
        self.deferred_file_scanning = defer;
        self
    }

    /// Whether the running operation may continue.
    pub fn should_continue(&self) -> bool {
        self.observer
            .as_ref()
            .map(|observer| observer.should_continue())
            .unwrap_or(true)
    }
}

impl fmt::Debug for ScannerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerOptions")
            .field("observer", &self.observer.as_ref().map(|_| "<observer>"))
            .field("progress", &self.progress.is_some())
            .field("need_file_count", &self.need_file_count)
            .field("deferred_file_scanning", &self.deferred_file_scanning)
            .finish()
    }
}

/// Scans the collection and writes the results to the database.
pub trait CollectionScanner {
    /// Full pass over every collection root.
    fn complete_scan(&mut self);

    /// Albums whose file scan was postponed by the last deferred complete scan.
    fn deferred_album_paths(&self) -> Vec<String>;

    /// Scan the files of albums postponed by a deferred complete scan.
    fn finish_complete_scan(&mut self, album_paths: &[String]);

    /// Scan one directory or album path.
    fn partial_scan(&mut self, path: &str);

    /// Scan a single file, returning its item id if it is in the database afterwards.
    fn scan_file(&mut self, path: &Path, mode: ScanMode) -> Option<ItemId>;

    /// Scan a single item already known to the database.
    fn scan_item(&mut self, item: &ItemInfo, mode: ScanMode) -> Option<ItemId>;
}

/// Creates scanner instances. Called from the worker and from callers of the
/// direct-scan entry points, so implementations must be thread-safe.
pub trait ScannerFactory: Send + Sync {
    fn create(&self, options: ScannerOptions) -> Box<dyn CollectionScanner>;
}
