//! Hint recording through the controller, metadata edit guards and the
//! file-watch bridge.

use anyhow::Result;
use galleria_scan::{
    AlbumId, AlbumRootId, CollectionLocation, DatabaseField, DstPath, FileMetadataWrite,
    ImageChangeset, ItemId, ItemInfo, PhysicalAlbum, ScanCollaborators, ScanController,
    ScanControllerConfig, ScanMode,
};
use galleria_test_utils::{
    wait_for, MemoryStore, RecordingFileWatch, RecordingScannerFactory, ScanCall,
};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn start_with(
    config: ScanControllerConfig,
    scanners: &RecordingScannerFactory,
    store: MemoryStore,
) -> Result<ScanController> {
    Ok(ScanController::new(
        config,
        ScanCollaborators::new(Arc::new(scanners.clone()), Arc::new(store)),
    )?)
}

fn trips_album() -> PhysicalAlbum {
    PhysicalAlbum::new(AlbumId(10), AlbumRootId(2), "/Trips", "Trips")
        .with_child(PhysicalAlbum::new(AlbumId(11), AlbumRootId(2), "/Trips/2019", "2019"))
}

#[test]
fn test_idle_worker_drops_stale_hints() -> Result<()> {
    let config = ScanControllerConfig {
        hint_quiescence_secs: 0,
        ..ScanControllerConfig::default()
    };
    let scanners = RecordingScannerFactory::new();
    let controller = start_with(config, &scanners, MemoryStore::new())?;
    assert!(wait_for(WAIT, || controller.is_idle()));

    controller.hint_at_modification_of_item(ItemId(1));
    thread::sleep(Duration::from_millis(20));
    controller.hint_at_modification_of_item(ItemId(2));

    assert_eq!(controller.hints().len(), 1);
    assert!(controller.hints().has_modification_hint(ItemId(2)));
    assert!(!controller.hints().has_modification_hint(ItemId(1)));

    // a busy worker keeps everything
    scanners.gate().close();
    controller.schedule_collection_scan("/x");
    assert!(scanners.gate().wait_for_waiters(1, WAIT));

    controller.hint_at_modification_of_item(ItemId(3));
    thread::sleep(Duration::from_millis(20));
    controller.hint_at_modification_of_item(ItemId(4));
    assert_eq!(controller.hints().len(), 3);

    scanners.gate().open();
    Ok(())
}

#[test]
fn test_hints_survive_within_quiescence_window() -> Result<()> {
    let scanners = RecordingScannerFactory::new();
    let controller = start_with(ScanControllerConfig::default(), &scanners, MemoryStore::new())?;
    assert!(wait_for(WAIT, || controller.is_idle()));

    controller.hint_at_modification_of_items(vec![ItemId(1), ItemId(2)]);
    controller.hint_at_modification_of_item(ItemId(3));

    assert_eq!(controller.hints().len(), 2);
    assert!(controller.hints().has_modification_hint(ItemId(1)));
    assert!(controller.hints().has_modification_hint(ItemId(3)));
    Ok(())
}

#[test]
fn test_album_hint_to_filesystem_path() -> Result<()> {
    let scanners = RecordingScannerFactory::new();
    let store =
        MemoryStore::new().with_location(CollectionLocation::new(AlbumRootId(1), "/photos"));
    let controller = start_with(ScanControllerConfig::default(), &scanners, store)?;

    controller.hint_at_move_or_copy_of_album(
        &trips_album(),
        Path::new("/photos/Archive"),
        Some("Old"),
    );

    let hints = controller.hints();
    let parent = hints
        .album_hint_for(&DstPath::new(AlbumRootId(1), "/Archive/Old"))
        .expect("hint for the moved album");
    assert_eq!(parent.src_album_id, AlbumId(10));
    assert_eq!(parent.src_root_id, AlbumRootId(2));

    let child = hints
        .album_hint_for(&DstPath::new(AlbumRootId(1), "/Archive/Old/2019"))
        .expect("hint for the sub-album");
    assert_eq!(child.src_album_id, AlbumId(11));
    assert_eq!(hints.album_hints().len(), 2);
    Ok(())
}

#[test]
fn test_album_hint_outside_collection_is_ignored() -> Result<()> {
    let scanners = RecordingScannerFactory::new();
    let store =
        MemoryStore::new().with_location(CollectionLocation::new(AlbumRootId(1), "/photos"));
    let controller = start_with(ScanControllerConfig::default(), &scanners, store)?;

    controller.hint_at_move_or_copy_of_album(&trips_album(), Path::new("/tmp/elsewhere"), None);

    assert!(!controller.hints().has_album_hints());
    Ok(())
}

#[test]
fn test_album_hint_to_root_album_keeps_title() -> Result<()> {
    let scanners = RecordingScannerFactory::new();
    let controller = start_with(ScanControllerConfig::default(), &scanners, MemoryStore::new())?;
    let root = PhysicalAlbum::new(AlbumId(1), AlbumRootId(3), "/", "Backup");

    controller.hint_at_move_or_copy_of_album_to(&trips_album(), &root, None);

    let dsts: Vec<DstPath> = controller
        .hints()
        .album_hints()
        .into_iter()
        .map(|hint| hint.dst)
        .collect();
    assert_eq!(
        dsts,
        vec![
            DstPath::new(AlbumRootId(3), "/Trips"),
            DstPath::new(AlbumRootId(3), "/Trips/2019"),
        ]
    );
    Ok(())
}

#[test]
fn test_item_copy_hints() -> Result<()> {
    let scanners = RecordingScannerFactory::new();
    let controller = start_with(ScanControllerConfig::default(), &scanners, MemoryStore::new())?;
    let dst = PhysicalAlbum::new(AlbumId(5), AlbumRootId(1), "/Inbox", "Inbox");

    controller.hint_at_move_or_copy_of_items(
        vec![ItemId(1), ItemId(2)],
        &dst,
        vec!["a.jpg".to_string(), "b.jpg".to_string()],
    );
    controller.hint_at_move_or_copy_of_item(ItemId(9), &dst, "c.jpg");
    // names must line up with ids
    controller.hint_at_move_or_copy_of_items(vec![ItemId(3)], &dst, Vec::new());

    let hints = controller.hints();
    assert_eq!(hints.source_item_for(AlbumId(5), "b.jpg"), Some(ItemId(2)));
    assert_eq!(hints.source_item_for(AlbumId(5), "c.jpg"), Some(ItemId(9)));
    assert_eq!(hints.source_item_for(AlbumId(6), "a.jpg"), None);
    assert_eq!(hints.len(), 2);
    Ok(())
}

#[test]
fn test_metadata_write_records_finished_edit() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let path = temp.path().join("photo.jpg");
    std::fs::write(&path, b"jpeg!")?;

    let scanners = RecordingScannerFactory::new();
    let controller = start_with(ScanControllerConfig::default(), &scanners, MemoryStore::new())?;
    let item = ItemInfo::new(ItemId(7), &path);

    {
        let mut write = FileMetadataWrite::new(&controller, item.clone());
        let before = controller
            .hints()
            .metadata_about_to_adjust(ItemId(7))
            .expect("about-to-edit stamp");
        assert_eq!(before.file_size, 5);
        assert!(before.modified.is_some());

        std::fs::write(&path, b"jpeg with exif")?;
        write.changed(true);
    }

    let hints = controller.hints();
    assert!(hints.metadata_about_to_adjust(ItemId(7)).is_none());
    let after = hints
        .metadata_adjusted(ItemId(7))
        .expect("finished-edit stamp");
    assert_eq!(after.file_size, 14);
    assert_eq!(
        scanners.calls(),
        vec![ScanCall::ScanItem {
            id: ItemId(7),
            mode: ScanMode::NormalScan
        }]
    );
    Ok(())
}

#[test]
fn test_metadata_write_releases_file_lock() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let path = temp.path().join("photo.jpg");
    std::fs::write(&path, b"jpeg!")?;

    let scanners = RecordingScannerFactory::new();
    let controller = start_with(ScanControllerConfig::default(), &scanners, MemoryStore::new())?;

    let write = FileMetadataWrite::new(&controller, ItemInfo::new(ItemId(7), &path));
    // the writer can take the file while the guard is alive
    let writer = std::fs::OpenOptions::new().write(true).open(&path)?;
    writer.try_lock_exclusive()?;
    writer.unlock()?;
    drop(write);
    Ok(())
}

#[test]
fn test_metadata_write_without_change_is_aborted() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let path = temp.path().join("photo.jpg");
    std::fs::write(&path, b"jpeg!")?;

    let scanners = RecordingScannerFactory::new();
    let controller = start_with(ScanControllerConfig::default(), &scanners, MemoryStore::new())?;

    drop(FileMetadataWrite::new(
        &controller,
        ItemInfo::new(ItemId(7), &path),
    ));

    assert!(!controller.hints().has_any_item_hint(ItemId(7)));
    assert_eq!(scanners.calls().len(), 1);
    Ok(())
}

#[test]
fn test_file_watch_bridge_forwards_content_changes() -> Result<()> {
    let scanners = RecordingScannerFactory::new();
    let store = Arc::new(
        MemoryStore::new()
            .with_item(ItemInfo::new(ItemId(1), "/photos/a.jpg"))
            .with_item(ItemInfo::new(ItemId(2), "/photos/b.jpg")),
    );
    let sink = Arc::new(RecordingFileWatch::new());
    let controller = ScanController::new(
        ScanControllerConfig::default(),
        ScanCollaborators::new(Arc::new(scanners.clone()), store.clone())
            .with_file_watch(sink.clone()),
    )?;

    controller.initialize_database()?;
    assert!(controller.file_watch_bridge_running());

    // tags do not touch cached file content
    store.publish_change(ImageChangeset::new(vec![ItemId(2)], vec![DatabaseField::Tags]));
    // unknown ids are skipped
    store.publish_change(ImageChangeset::new(
        vec![ItemId(99), ItemId(1)],
        vec![DatabaseField::Orientation],
    ));

    assert_eq!(sink.wait_for(1, WAIT), vec![PathBuf::from("/photos/a.jpg")]);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.paths().len(), 1);

    store.close_changes();
    assert!(wait_for(WAIT, || !controller.file_watch_bridge_running()));
    Ok(())
}

#[test]
fn test_failed_initialization_installs_no_bridge() -> Result<()> {
    let scanners = RecordingScannerFactory::new();
    let sink = Arc::new(RecordingFileWatch::new());
    let controller = ScanController::new(
        ScanControllerConfig::default(),
        ScanCollaborators::new(
            Arc::new(scanners.clone()),
            Arc::new(MemoryStore::new().with_ready(false)),
        )
        .with_file_watch(sink),
    )?;

    controller.initialize_database()?;
    assert!(!controller.file_watch_bridge_running());
    Ok(())
}
