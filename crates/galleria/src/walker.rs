//! Directory scanner backed by `walkdir`
//!
//! Albums are directories below a collection root; items are image files
//! directly inside them.

use crate::catalog::{Catalog, Upsert};
use chrono::{DateTime, Utc};
use galleria_scan::{
    CollectionLocation, CollectionScanner, CollectionStore, ItemId, ItemInfo, ScanMode,
    ScannerFactory, ScannerOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "tif", "tiff", "webp", "heic", "heif", "bmp", "dng", "cr2",
    "nef", "arw", "orf", "raf",
];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct DirectoryScannerFactory {
    catalog: Arc<Catalog>,
}

impl DirectoryScannerFactory {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

impl ScannerFactory for DirectoryScannerFactory {
    fn create(&self, options: ScannerOptions) -> Box<dyn CollectionScanner> {
        Box::new(DirectoryScanner {
            catalog: Arc::clone(&self.catalog),
            options,
            deferred: Vec::new(),
        })
    }
}

pub struct DirectoryScanner {
    catalog: Arc<Catalog>,
    options: ScannerOptions,
    deferred: Vec<String>,
}

impl DirectoryScanner {
    fn count_files(&self) -> u64 {
        self.catalog
            .locations()
            .iter()
            .flat_map(|location| WalkDir::new(&location.root_path).into_iter())
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
            .count() as u64
    }

    fn album_dirs(location: &CollectionLocation) -> Vec<PathBuf> {
        WalkDir::new(&location.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Scan the image files directly inside `dir`. Returns false if interrupted.
    fn scan_album_files(&mut self, dir: &Path) -> bool {
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        for file in files {
            if !self.options.should_continue() {
                return false;
            }
            self.scan_file(&file, ScanMode::NormalScan);
            if let Some(progress) = &self.options.progress {
                progress.scanned_files(1);
            }
        }
        true
    }

    fn scan_location(&mut self, location: &CollectionLocation) -> bool {
        let root = location.root_path.display().to_string();
        if let Some(progress) = &self.options.progress {
            progress.started_album_root(&root);
        }

        for dir in Self::album_dirs(location) {
            if !self.options.should_continue() {
                return false;
            }
            let Some(album) = location.album_path_for(&dir) else {
                continue;
            };
            self.catalog.add_album(&album);
            if let Some(progress) = &self.options.progress {
                progress.started_album(&root, &album);
            }

            if self.options.deferred_file_scanning {
                self.deferred.push(album);
            } else if !self.scan_album_files(&dir) {
                return false;
            }
        }
        true
    }

    fn remove_stale_items(&self) {
        if let Some(progress) = &self.options.progress {
            progress.started_stale_album_scan();
        }
        let removed = self.catalog.remove_missing();
        if removed > 0 {
            info!(removed, "Removed items whose files are gone");
        }
        if let Some(progress) = &self.options.progress {
            progress.finished_stale_album_scan();
        }
    }

    /// Directories named by `album` under every root.
    fn album_dirs_for(&self, album: &str) -> Vec<PathBuf> {
        let relative = album.trim_start_matches('/');
        self.catalog
            .locations()
            .iter()
            .map(|location| location.root_path.join(relative))
            .filter(|dir| dir.is_dir())
            .collect()
    }

    fn file_stamp(path: &Path) -> Option<(u64, Option<DateTime<Utc>>)> {
        let meta = std::fs::metadata(path).ok()?;
        Some((meta.len(), meta.modified().ok().map(DateTime::<Utc>::from)))
    }
}

impl CollectionScanner for DirectoryScanner {
    fn complete_scan(&mut self) {
        if let Some(progress) = &self.options.progress {
            progress.started_complete_scan();
            if self.options.need_file_count {
                progress.total_files_to_scan(self.count_files());
            }
            progress.started_album_roots();
        }

        self.deferred.clear();
        let locations = self.catalog.locations().to_vec();
        for location in &locations {
            if !self.scan_location(location) {
                info!("Complete scan interrupted");
                return;
            }
        }

        self.remove_stale_items();
        self.catalog.mark_initial_scan_done();
    }

    fn deferred_album_paths(&self) -> Vec<String> {
        self.deferred.clone()
    }

    fn finish_complete_scan(&mut self, album_paths: &[String]) {
        if let Some(progress) = &self.options.progress {
            if self.options.need_file_count {
                progress.total_files_to_scan(self.count_files());
            }
        }

        for album in album_paths {
            for dir in self.album_dirs_for(album) {
                if !self.scan_album_files(&dir) {
                    info!("Deferred file scan interrupted");
                    return;
                }
            }
        }
    }

    fn partial_scan(&mut self, path: &str) {
        let dir = PathBuf::from(path);
        let Some(location) = self.catalog.location_for_path(&dir) else {
            warn!(path = %path, "Partial scan path is not inside a collection root");
            return;
        };

        for album_dir in WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
        {
            if let Some(album) = location.album_path_for(&album_dir) {
                self.catalog.add_album(&album);
            }
            if !self.scan_album_files(&album_dir) {
                debug!(path = %path, "Partial scan interrupted");
                return;
            }
        }
    }

    fn scan_file(&mut self, path: &Path, mode: ScanMode) -> Option<ItemId> {
        let (size, modified) = Self::file_stamp(path)?;

        // a pending modification or rescan hint forces an update
        let known = self.catalog.record(path).map(|record| record.id);
        let hinted = known
            .map(|id| {
                self.options.hints.take_modification_hint(id)
                    | self.options.hints.take_rescan_hint(id)
            })
            .unwrap_or(false);
        if let Some(id) = known {
            if self.options.hints.take_metadata_adjusted(id).is_some() {
                debug!(item = %id, "Metadata edit acknowledged");
            }
        }

        let force = hinted || mode != ScanMode::NormalScan;
        let outcome = self.catalog.upsert(path, size, modified, force);
        if let Upsert::Added(id) | Upsert::Updated(id) = outcome {
            debug!(item = %id, path = %path.display(), ?mode, "Scanned file");
        }
        Some(outcome.id())
    }

    fn scan_item(&mut self, item: &ItemInfo, mode: ScanMode) -> Option<ItemId> {
        self.scan_file(&item.file_path, mode)
    }
}
