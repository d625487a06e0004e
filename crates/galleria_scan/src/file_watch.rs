//! Bridge from database change notifications to the metadata cache
//!
//! The cache keeps decoded thumbnails and previews keyed by file path. When
//! the database reports that an item's modification date or orientation
//! changed, the cached content for that file is stale and the cache is told so.
//! Delivery runs on its own thread, so the database side never waits for the
//! cache.

use crate::error::{Result, ScanError};
use crate::store::{CollectionStore, ImageChangeset};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

const BRIDGE_THREAD_NAME: &str = "scan-file-watch";

/// Cache side of the bridge.
pub trait FileWatchSink: Send + Sync {
    fn notify_file_changed(&self, path: &Path);
}

/// Start forwarding `changes` to `sink` until the sending side is dropped.
pub(crate) fn install(
    changes: Receiver<ImageChangeset>,
    store: Arc<dyn CollectionStore>,
    sink: Arc<dyn FileWatchSink>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(BRIDGE_THREAD_NAME.to_string())
        .spawn(move || {
            for changeset in changes {
                forward(&changeset, store.as_ref(), sink.as_ref());
            }
            debug!("Database change channel closed, file-watch bridge exiting");
        })
        .map_err(|source| ScanError::Spawn {
            name: BRIDGE_THREAD_NAME.to_string(),
            source,
        })?;

    info!("File-watch bridge installed");
    Ok(handle)
}

fn forward(changeset: &ImageChangeset, store: &dyn CollectionStore, sink: &dyn FileWatchSink) {
    if !changeset.affects_file_content() {
        return;
    }

    for &id in &changeset.ids {
        match store.item_path(id) {
            Some(path) => sink.notify_file_changed(&path),
            None => debug!(item = %id, "No path for changed item, skipping"),
        }
    }
}
