//! Event types emitted by the scan controller
//!
//! Events are broadcast to every subscriber (progress UI, logging, tests).
//! Delivery is queued: the emitting thread never waits for a subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

/// Events emitted by the scan controller and relayed from its collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    // ========================================================================
    // Completion Events
    // ========================================================================
    /// Database initialization finished
    DatabaseInitialized { success: bool },

    /// A complete scan, deferred finish pass or unique-hash update finished
    CompleteScanDone,

    /// A pending complete scan was cancelled
    CompleteScanCanceled,

    /// The deferred finish pass started
    CollectionScanStarted { label: String },

    /// The deferred finish pass finished
    CollectionScanFinished,

    /// A queued partial scan finished
    PartialScanDone { path: String },

    // ========================================================================
    // Progress Events (relayed from the collection scanner)
    // ========================================================================
    StartedCompleteScan,
    StartedAlbumRoots,
    StartedAlbumRoot { root: String },
    StartedAlbum { root: String, album: String },
    StartedStaleAlbumScan,
    FinishedStaleAlbumScan,
    TotalFilesToScan(u64),
    FilesScanned(u64),
    /// Fraction in 0..=1 of files scanned, once a total is known
    ScanningProgress(f64),

    // ========================================================================
    // Initialization Events (relayed from the storage layer)
    // ========================================================================
    InitializationError { message: String },
    InitializationProgress { message: String, steps: u32 },
    MoreSchemaUpdateSteps(u32),
}

/// Fan-out of [`ScanEvent`]s to any number of subscribers.
///
/// Clone is cheap and shares the subscriber list. Subscribers whose receiver
/// was dropped are pruned on the next emit.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<ScanEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn emit(&self, event: ScanEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Progress sink handed to a collection scanner.
///
/// Translates scanner callbacks into [`ScanEvent`]s. `scanned_files` takes
/// increments and reports the running total; the fraction is only emitted once
/// a non-zero total is known.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    events: EventBus,
    total: Arc<AtomicU64>,
    scanned: Arc<AtomicU64>,
}

impl ScanProgress {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            total: Arc::new(AtomicU64::new(0)),
            scanned: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn started_complete_scan(&self) {
        self.total.store(0, Ordering::SeqCst);
        self.scanned.store(0, Ordering::SeqCst);
        self.events.emit(ScanEvent::StartedCompleteScan);
    }

    pub fn total_files_to_scan(&self, count: u64) {
        self.total.store(count, Ordering::SeqCst);
        self.events.emit(ScanEvent::TotalFilesToScan(count));
    }

    pub fn started_album_roots(&self) {
        self.events.emit(ScanEvent::StartedAlbumRoots);
    }

    pub fn started_album_root(&self, root: &str) {
        self.events.emit(ScanEvent::StartedAlbumRoot {
            root: root.to_string(),
        });
    }

    pub fn started_album(&self, root: &str, album: &str) {
        self.events.emit(ScanEvent::StartedAlbum {
            root: root.to_string(),
            album: album.to_string(),
        });
    }

    pub fn scanned_files(&self, count: u64) {
        let scanned = self.scanned.fetch_add(count, Ordering::SeqCst) + count;
        let total = self.total.load(Ordering::SeqCst);
        if total == 0 {
            return;
        }
        self.events.emit(ScanEvent::FilesScanned(scanned));
        let fraction = (scanned as f64 / total as f64).min(1.0);
        self.events.emit(ScanEvent::ScanningProgress(fraction));
    }

    pub fn started_stale_album_scan(&self) {
        self.events.emit(ScanEvent::StartedStaleAlbumScan);
    }

    pub fn finished_stale_album_scan(&self) {
        self.events.emit(ScanEvent::FinishedStaleAlbumScan);
    }
}
