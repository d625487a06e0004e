//! In-memory catalog standing in for the collection database

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use galleria_scan::{
    AlbumRootId, CollectionLocation, CollectionStore, DatabaseField, ImageChangeset,
    InitializationObserver, ItemId, ItemInfo, SchemaUpdateResult,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// What the catalog knows about one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub unique_hash: Option<String>,
}

/// Outcome of recording a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added(ItemId),
    Updated(ItemId),
    Unchanged(ItemId),
}

impl Upsert {
    pub fn id(self) -> ItemId {
        match self {
            Upsert::Added(id) | Upsert::Updated(id) | Upsert::Unchanged(id) => id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub roots: Vec<PathBuf>,
    pub albums: usize,
    pub items: usize,
    pub total_size: u64,
    pub hashed: usize,
}

#[derive(Debug, Default)]
struct CatalogData {
    items: BTreeMap<PathBuf, ItemRecord>,
    albums: BTreeSet<String>,
}

pub struct Catalog {
    locations: Vec<CollectionLocation>,
    data: Mutex<CatalogData>,
    next_id: AtomicI64,
    initial_scan_done: AtomicBool,
    changes_tx: Sender<ImageChangeset>,
    changes_rx: Mutex<Option<Receiver<ImageChangeset>>>,
}

impl Catalog {
    /// Catalog over the given collection roots.
    pub fn new(roots: &[PathBuf]) -> Result<Self> {
        let mut locations = Vec::with_capacity(roots.len());
        for (idx, root) in roots.iter().enumerate() {
            let root = root
                .canonicalize()
                .with_context(|| format!("Collection root not found: {}", root.display()))?;
            locations.push(CollectionLocation::new(AlbumRootId(idx as i32 + 1), root));
        }

        let (changes_tx, changes_rx) = mpsc::channel();
        Ok(Self {
            locations,
            data: Mutex::new(CatalogData::default()),
            next_id: AtomicI64::new(1),
            initial_scan_done: AtomicBool::new(false),
            changes_tx,
            changes_rx: Mutex::new(Some(changes_rx)),
        })
    }

    fn data(&self) -> MutexGuard<'_, CatalogData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn locations(&self) -> &[CollectionLocation] {
        &self.locations
    }

    pub fn mark_initial_scan_done(&self) {
        self.initial_scan_done.store(true, Ordering::SeqCst);
    }

    pub fn add_album(&self, album_path: &str) {
        self.data().albums.insert(album_path.to_string());
    }

    pub fn record(&self, path: &Path) -> Option<ItemRecord> {
        self.data().items.get(path).cloned()
    }

    /// Record `path` with its current size and modification time.
    ///
    /// With `force`, an unchanged file still counts as updated.
    pub fn upsert(
        &self,
        path: &Path,
        size: u64,
        modified: Option<DateTime<Utc>>,
        force: bool,
    ) -> Upsert {
        let mut data = self.data();
        if let Some(record) = data.items.get_mut(path) {
            let id = record.id;
            let mut changes = Vec::new();
            if record.modified != modified {
                changes.push(DatabaseField::ModificationDate);
            }
            if record.size != size {
                changes.push(DatabaseField::FileSize);
            }
            if changes.is_empty() && !force {
                return Upsert::Unchanged(id);
            }

            record.size = size;
            record.modified = modified;
            record.unique_hash = None;
            drop(data);

            if !changes.is_empty() {
                let _ = self.changes_tx.send(ImageChangeset::new(vec![id], changes));
            }
            return Upsert::Updated(id);
        }

        let id = ItemId(self.next_id.fetch_add(1, Ordering::SeqCst));
        data.items.insert(
            path.to_path_buf(),
            ItemRecord {
                id,
                size,
                modified,
                unique_hash: None,
            },
        );
        Upsert::Added(id)
    }

    /// Drop records whose file is gone. Returns how many were removed.
    pub fn remove_missing(&self) -> usize {
        let mut data = self.data();
        let before = data.items.len();
        data.items.retain(|path, _| path.is_file());
        before - data.items.len()
    }

    pub fn summary(&self) -> CatalogSummary {
        let data = self.data();
        CatalogSummary {
            roots: self
                .locations
                .iter()
                .map(|location| location.root_path.clone())
                .collect(),
            albums: data.albums.len(),
            items: data.items.len(),
            total_size: data.items.values().map(|record| record.size).sum(),
            hashed: data
                .items
                .values()
                .filter(|record| record.unique_hash.is_some())
                .count(),
        }
    }
}

fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

impl CollectionStore for Catalog {
    fn check_ready_for_use(&self, observer: &dyn InitializationObserver) -> bool {
        observer.schema_update_progress("Opening catalog", 1);
        for location in &self.locations {
            if !location.root_path.is_dir() {
                observer.error(&format!(
                    "Collection root {} is not a directory",
                    location.root_path.display()
                ));
                observer.finished_schema_update(SchemaUpdateResult::Error);
                return false;
            }
        }
        observer.finished_schema_update(SchemaUpdateResult::Success);
        info!(roots = self.locations.len(), "Catalog ready");
        true
    }

    fn update_unique_hash(&self, observer: &dyn InitializationObserver) {
        let paths: Vec<PathBuf> = self.data().items.keys().cloned().collect();
        observer.more_schema_update_steps(paths.len() as u32);

        for path in paths {
            if !observer.should_continue() {
                debug!("Unique hash update interrupted");
                return;
            }
            match content_hash(&path) {
                Ok(hash) => {
                    if let Some(record) = self.data().items.get_mut(&path) {
                        record.unique_hash = Some(hash);
                    }
                    observer.schema_update_progress(&format!("Hashed {}", path.display()), 1);
                }
                Err(e) => observer.error(&format!("Cannot hash {}: {}", path.display(), e)),
            }
        }
    }

    fn initial_scan_done(&self) -> bool {
        self.initial_scan_done.load(Ordering::SeqCst)
    }

    fn item_for_path(&self, path: &Path) -> Option<ItemInfo> {
        self.data()
            .items
            .get(path)
            .map(|record| ItemInfo::new(record.id, path))
    }

    fn item_path(&self, id: ItemId) -> Option<PathBuf> {
        self.data()
            .items
            .iter()
            .find(|(_, record)| record.id == id)
            .map(|(path, _)| path.clone())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_tracks_changes() {
        let temp = tempfile::TempDir::new().unwrap();
        let catalog = Catalog::new(&[temp.path().to_path_buf()]).unwrap();
        let changes = catalog.watch_image_changes().unwrap();
        let path = temp.path().join("a.jpg");

        let id = catalog.upsert(&path, 10, None, false).id();
        assert_eq!(catalog.upsert(&path, 10, None, false), Upsert::Unchanged(id));
        assert_eq!(catalog.upsert(&path, 10, None, true), Upsert::Updated(id));
        assert!(changes.try_recv().is_err());

        assert_eq!(catalog.upsert(&path, 12, None, false), Upsert::Updated(id));
        assert_eq!(
            changes.try_recv().unwrap(),
            ImageChangeset::new(vec![id], vec![DatabaseField::FileSize])
        );
    }

    #[test]
    fn test_content_hash_is_blake3_of_file_bytes() {
        let temp = tempfile::TempDir::new().unwrap();
        let a = temp.path().join("a.jpg");
        let b = temp.path().join("b.jpg");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let hash = content_hash(&a).unwrap();
        assert_eq!(hash, blake3::hash(b"same bytes").to_hex().to_string());
        assert_eq!(hash.len(), 64);
        assert_eq!(content_hash(&b).unwrap(), hash);

        std::fs::write(&b, b"other bytes").unwrap();
        assert_ne!(content_hash(&b).unwrap(), hash);
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(Catalog::new(&[temp.path().join("nope")]).is_err());
    }

    #[test]
    fn test_remove_missing() {
        let temp = tempfile::TempDir::new().unwrap();
        let kept = temp.path().join("kept.jpg");
        std::fs::write(&kept, b"x").unwrap();

        let catalog = Catalog::new(&[temp.path().to_path_buf()]).unwrap();
        catalog.upsert(&kept, 1, None, false);
        catalog.upsert(&temp.path().join("gone.jpg"), 1, None, false);

        assert_eq!(catalog.remove_missing(), 1);
        assert_eq!(catalog.summary().items, 1);
    }
}
