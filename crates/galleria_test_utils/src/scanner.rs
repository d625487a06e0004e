//! Recording scanner factory
//!
//! Scanners created by [`RecordingScannerFactory`] log every call, can be held
//! at a [`Gate`] so tests can line up requests behind a running scan, report
//! a fixed number of files to their progress relay, and stop early when their
//! observer says so.

use galleria_scan::{
    CollectionScanner, ItemId, ItemInfo, ScanMode, ScannerFactory, ScannerOptions,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// One call made on a scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCall {
    CompleteScan {
        deferred: bool,
        need_file_count: bool,
    },
    FinishCompleteScan(Vec<String>),
    PartialScan(String),
    ScanFile {
        path: PathBuf,
        mode: ScanMode,
    },
    ScanItem {
        id: ItemId,
        mode: ScanMode,
    },
}

#[derive(Debug)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// Barrier that holds scanners until opened.
#[derive(Debug)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            state: Mutex::new(GateState {
                open: true,
                waiting: 0,
            }),
            cv: Condvar::new(),
        }
    }
}

impl Gate {
    pub fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open = false;
    }

    pub fn open(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open = true;
        self.cv.notify_all();
    }

    fn pass(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.waiting += 1;
        self.cv.notify_all();
        while !state.open {
            state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting -= 1;
    }

    /// Wait until `count` scanners are held at the gate.
    pub fn wait_for_waiters(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.waiting < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .cv
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[derive(Debug, Default)]
struct FactoryInner {
    calls: Mutex<Vec<ScanCall>>,
    gate: Gate,
    deferred_albums: Mutex<Vec<String>>,
    files_per_scan: AtomicUsize,
    interrupted: AtomicUsize,
    next_id: AtomicI64,
}

/// Factory whose scanners record what they were asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingScannerFactory {
    inner: Arc<FactoryInner>,
}

impl RecordingScannerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Albums a deferred complete scan reports as postponed.
    pub fn with_deferred_albums(self, albums: &[&str]) -> Self {
        *self
            .inner
            .deferred_albums
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            albums.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Number of files each complete or finish pass walks through.
    pub fn with_files_per_scan(self, count: usize) -> Self {
        self.inner.files_per_scan.store(count, Ordering::SeqCst);
        self
    }

    pub fn gate(&self) -> &Gate {
        &self.inner.gate
    }

    pub fn calls(&self) -> Vec<ScanCall> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of operations that stopped because their observer said so.
    pub fn interrupted(&self) -> usize {
        self.inner.interrupted.load(Ordering::SeqCst)
    }
}

impl ScannerFactory for RecordingScannerFactory {
    fn create(&self, options: ScannerOptions) -> Box<dyn CollectionScanner> {
        Box::new(RecordingScanner {
            inner: Arc::clone(&self.inner),
            options,
        })
    }
}

struct RecordingScanner {
    inner: Arc<FactoryInner>,
    options: ScannerOptions,
}

impl RecordingScanner {
    fn record(&self, call: ScanCall) {
        debug!(?call, "Recording scanner call");
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn interrupted(&self) -> bool {
        if self.options.should_continue() {
            return false;
        }
        self.inner.interrupted.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn walk_files(&self) {
        let files = self.inner.files_per_scan.load(Ordering::SeqCst);
        if let Some(progress) = &self.options.progress {
            if self.options.need_file_count {
                progress.total_files_to_scan(files as u64);
            }
        }

        for _ in 0..files {
            if self.interrupted() {
                return;
            }
            if let Some(progress) = &self.options.progress {
                progress.scanned_files(1);
            }
        }
    }
}

impl CollectionScanner for RecordingScanner {
    fn complete_scan(&mut self) {
        self.record(ScanCall::CompleteScan {
            deferred: self.options.deferred_file_scanning,
            need_file_count: self.options.need_file_count,
        });
        self.inner.gate.pass();
        if self.interrupted() {
            return;
        }

        if let Some(progress) = &self.options.progress {
            progress.started_complete_scan();
            progress.started_album_roots();
        }
        self.walk_files();
    }

    fn deferred_album_paths(&self) -> Vec<String> {
        self.inner
            .deferred_albums
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finish_complete_scan(&mut self, album_paths: &[String]) {
        self.record(ScanCall::FinishCompleteScan(album_paths.to_vec()));
        self.inner.gate.pass();
        if self.interrupted() {
            return;
        }
        self.walk_files();
    }

    fn partial_scan(&mut self, path: &str) {
        self.record(ScanCall::PartialScan(path.to_string()));
        self.inner.gate.pass();
        self.interrupted();
    }

    fn scan_file(&mut self, path: &Path, mode: ScanMode) -> Option<ItemId> {
        self.record(ScanCall::ScanFile {
            path: path.to_path_buf(),
            mode,
        });
        Some(ItemId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn scan_item(&mut self, item: &ItemInfo, mode: ScanMode) -> Option<ItemId> {
        self.record(ScanCall::ScanItem { id: item.id, mode });
        Some(item.id)
    }
}
