use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn galleria_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_galleria"))
}

fn run_cli(args: &[String], home: &Path) -> Output {
    let mut cmd = Command::new(galleria_bin());
    cmd.args(args);
    cmd.env("GALLERIA_HOME", home);
    cmd.env_remove("GALLERIA_SCAN_CONFIG");
    cmd.output().expect("failed to execute galleria CLI")
}

fn run_cli_json(args: &[String], home: &Path) -> Summary {
    let output = run_cli(args, home);
    assert!(
        output.status.success(),
        "command failed: {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "failed to parse JSON output: {}\nstdout:\n{}\nstderr:\n{}",
            err,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[derive(Debug, Deserialize)]
struct Summary {
    roots: Vec<PathBuf>,
    albums: usize,
    items: usize,
    total_size: u64,
    hashed: usize,
}

/// root/Trips/a.jpg, root/Trips/2019/b.JPG and a non-image file.
fn photo_tree() -> TempDir {
    let root = TempDir::new().expect("create collection root");
    fs::create_dir_all(root.path().join("Trips/2019")).expect("create albums");
    fs::write(root.path().join("Trips/a.jpg"), b"abc").expect("write a.jpg");
    fs::write(root.path().join("Trips/2019/b.JPG"), b"abcd").expect("write b.JPG");
    fs::write(root.path().join("notes.txt"), b"not a photo").expect("write notes");
    root
}

fn arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_scan_json_counts_albums_and_images() {
    let home = TempDir::new().expect("create temp home");
    let root = photo_tree();

    let summary = run_cli_json(
        &["scan".to_string(), arg(root.path()), "--json".to_string()],
        home.path(),
    );

    assert_eq!(summary.roots.len(), 1);
    assert_eq!(summary.albums, 3);
    assert_eq!(summary.items, 2);
    assert_eq!(summary.total_size, 7);
    assert_eq!(summary.hashed, 0);
}

#[test]
fn test_deferred_scan_finds_the_same_items() {
    let home = TempDir::new().expect("create temp home");
    let root = photo_tree();

    let summary = run_cli_json(
        &[
            "scan".to_string(),
            arg(root.path()),
            "--defer".to_string(),
            "--json".to_string(),
        ],
        home.path(),
    );

    assert_eq!(summary.albums, 3);
    assert_eq!(summary.items, 2);
}

#[test]
fn test_scan_with_hash_update() {
    let home = TempDir::new().expect("create temp home");
    let root = photo_tree();

    let summary = run_cli_json(
        &[
            "scan".to_string(),
            arg(root.path()),
            "--update-hashes".to_string(),
            "--json".to_string(),
        ],
        home.path(),
    );

    assert_eq!(summary.hashed, 2);
}

#[test]
fn test_rescan_of_one_directory() {
    let home = TempDir::new().expect("create temp home");
    let root = photo_tree();

    let summary = run_cli_json(
        &[
            "rescan".to_string(),
            arg(root.path()),
            "--path".to_string(),
            arg(&root.path().join("Trips")),
            "--json".to_string(),
        ],
        home.path(),
    );

    assert_eq!(summary.items, 2);
    assert_eq!(summary.albums, 3);
}

#[test]
fn test_missing_root_fails() {
    let home = TempDir::new().expect("create temp home");
    let root = TempDir::new().expect("create temp dir");

    let output = run_cli(
        &["scan".to_string(), arg(&root.path().join("missing"))],
        home.path(),
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Collection root not found"));
}
