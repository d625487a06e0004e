//! In-memory collection store
//!
//! Readiness and schema-update outcomes are scripted up front; the database
//! change channel is driven by [`MemoryStore::publish_change`].

use galleria_scan::{
    CollectionLocation, CollectionStore, ImageChangeset, InitializationObserver, ItemId, ItemInfo,
    SchemaUpdateResult,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub struct MemoryStore {
    ready: bool,
    schema_result: Option<SchemaUpdateResult>,
    errors: Vec<String>,
    progress: Vec<(String, u32)>,
    initial_scan_done: AtomicBool,
    items: Vec<ItemInfo>,
    locations: Vec<CollectionLocation>,
    changes_tx: Mutex<Option<Sender<ImageChangeset>>>,
    changes_rx: Mutex<Option<Receiver<ImageChangeset>>>,
    check_ready_calls: AtomicUsize,
    unique_hash_calls: AtomicUsize,
    check_until_cancelled: bool,
    checking: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A ready store with no items and no locations.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            ready: true,
            schema_result: None,
            errors: Vec::new(),
            progress: Vec::new(),
            initial_scan_done: AtomicBool::new(false),
            items: Vec::new(),
            locations: Vec::new(),
            changes_tx: Mutex::new(Some(tx)),
            changes_rx: Mutex::new(Some(rx)),
            check_ready_calls: AtomicUsize::new(0),
            unique_hash_calls: AtomicUsize::new(0),
            check_until_cancelled: false,
            checking: AtomicBool::new(false),
        }
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Result reported through `finished_schema_update` during the readiness check.
    pub fn with_schema_result(mut self, result: SchemaUpdateResult) -> Self {
        self.schema_result = Some(result);
        self
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.errors.push(message.to_string());
        self
    }

    pub fn with_progress(mut self, message: &str, steps: u32) -> Self {
        self.progress.push((message.to_string(), steps));
        self
    }

    pub fn with_initial_scan_done(self, done: bool) -> Self {
        self.initial_scan_done.store(done, Ordering::SeqCst);
        self
    }

    pub fn with_item(mut self, item: ItemInfo) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_location(mut self, location: CollectionLocation) -> Self {
        self.locations.push(location);
        self
    }

    /// Make the readiness check run until it is cancelled, then fail.
    pub fn with_check_until_cancelled(mut self) -> Self {
        self.check_until_cancelled = true;
        self
    }

    /// True while a readiness check is in progress.
    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::SeqCst)
    }

    /// Send a change notification as the database would after a write.
    pub fn publish_change(&self, changeset: ImageChangeset) -> bool {
        self.changes_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tx| tx.send(changeset).is_ok())
            .unwrap_or(false)
    }

    /// Close the change channel.
    pub fn close_changes(&self) {
        self.changes_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn check_ready_calls(&self) -> usize {
        self.check_ready_calls.load(Ordering::SeqCst)
    }

    pub fn unique_hash_calls(&self) -> usize {
        self.unique_hash_calls.load(Ordering::SeqCst)
    }

    fn replay(&self, observer: &dyn InitializationObserver) {
        for (message, steps) in &self.progress {
            observer.schema_update_progress(message, *steps);
        }
        for message in &self.errors {
            observer.error(message);
        }
    }
}

impl CollectionStore for MemoryStore {
    fn check_ready_for_use(&self, observer: &dyn InitializationObserver) -> bool {
        self.check_ready_calls.fetch_add(1, Ordering::SeqCst);
        if self.check_until_cancelled {
            self.checking.store(true, Ordering::SeqCst);
            while observer.should_continue() {
                thread::sleep(Duration::from_millis(2));
            }
            self.checking.store(false, Ordering::SeqCst);
            debug!("Readiness check cancelled");
            return false;
        }
        self.replay(observer);
        if let Some(result) = self.schema_result {
            observer.finished_schema_update(result);
        }
        self.ready
    }

    fn update_unique_hash(&self, observer: &dyn InitializationObserver) {
        self.unique_hash_calls.fetch_add(1, Ordering::SeqCst);
        observer.more_schema_update_steps(self.items.len() as u32);
        for item in &self.items {
            if !observer.should_continue() {
                return;
            }
            observer.schema_update_progress(&format!("Hashing {}", item.file_path.display()), 1);
        }
    }

    fn initial_scan_done(&self) -> bool {
        self.initial_scan_done.load(Ordering::SeqCst)
    }

    fn item_for_path(&self, path: &Path) -> Option<ItemInfo> {
        self.items.iter().find(|item| item.file_path == path).cloned()
    }

    fn item_path(&self, id: ItemId) -> Option<PathBuf> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.file_path.clone())
    }

    fn location_for_path(&self, path: &Path) -> Option<CollectionLocation> {
        self.locations
            .iter()
            .find(|location| path.starts_with(&location.root_path))
            .cloned()
    }

    fn watch_image_changes(&self) -> Option<Receiver<ImageChangeset>> {
        self.changes_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
