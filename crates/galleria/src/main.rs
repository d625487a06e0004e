//! Galleria - command-line driver for the collection scanner
//!
//! Wires a [`ScanController`] to a `walkdir` directory scanner and an
//! in-memory catalog so the coordinator can be run against a real tree.

mod catalog;
mod walker;

use anyhow::{bail, Context, Result};
use catalog::Catalog;
use clap::{Parser, Subcommand};
use galleria_logging::{init_logging, LogConfig};
use galleria_scan::{Advice, ScanCollaborators, ScanController, ScanControllerConfig, ScanEvent};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use walker::DirectoryScannerFactory;

#[derive(Parser, Debug)]
#[command(name = "galleria", about = "Scan photo collections into the Galleria catalog")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Scan controller configuration file (TOML)
    #[arg(long, global = true, env = "GALLERIA_SCAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a complete scan over the collection roots
    Scan {
        /// Collection root directories
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Discover albums first and scan their files in a second pass
        #[arg(long)]
        defer: bool,

        /// Recompute content hashes after scanning
        #[arg(long)]
        update_hashes: bool,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan the collection, then rescan one directory through the scan queue
    Rescan {
        /// Collection root directories
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Directory to rescan
        #[arg(long)]
        path: PathBuf,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

/// A running controller over one catalog
struct Session {
    controller: ScanController,
    catalog: Arc<Catalog>,
    events: Receiver<ScanEvent>,
    reporter: JoinHandle<()>,
}

impl Session {
    fn open(roots: &[PathBuf], config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => ScanControllerConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ScanControllerConfig::default(),
        };

        let catalog = Arc::new(Catalog::new(roots)?);
        let scanners = Arc::new(DirectoryScannerFactory::new(Arc::clone(&catalog)));
        let controller = ScanController::new(
            config,
            ScanCollaborators::new(scanners, catalog.clone()),
        )
        .context("Failed to start scan controller")?;

        let progress = controller.subscribe();
        let reporter = thread::Builder::new()
            .name("scan-reporter".to_string())
            .spawn(move || report(progress))
            .context("Failed to spawn progress reporter")?;
        let events = controller.subscribe();

        Ok(Self {
            controller,
            catalog,
            events,
            reporter,
        })
    }

    fn initialize(&self) -> Result<()> {
        match self.controller.initialize_database()? {
            Advice::Success => Ok(()),
            advice => bail!("Catalog is not usable ({:?})", advice),
        }
    }

    /// Block until an event matching `done` arrives.
    fn wait_for_event<F>(&self, mut done: F) -> Result<()>
    where
        F: FnMut(&ScanEvent) -> bool,
    {
        loop {
            let event = self
                .events
                .recv()
                .context("Scan controller stopped unexpectedly")?;
            if done(&event) {
                return Ok(());
            }
        }
    }

    fn finish(self, json: bool) -> Result<()> {
        let summary = self.catalog.summary();
        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            for root in &summary.roots {
                println!("Root:   {}", root.display());
            }
            println!("Albums: {}", summary.albums);
            println!("Items:  {} ({} bytes)", summary.items, summary.total_size);
            if summary.hashed > 0 {
                println!("Hashed: {}", summary.hashed);
            }
        }

        self.controller.shut_down();
        drop(self.controller);
        if self.reporter.join().is_err() {
            warn!("Progress reporter panicked");
        }
        Ok(())
    }
}

fn report(events: Receiver<ScanEvent>) {
    let mut last_percent = 0;
    for event in events {
        match event {
            ScanEvent::DatabaseInitialized { success } => info!(success, "Catalog initialized"),
            ScanEvent::InitializationError { message } => error!("{}", message),
            ScanEvent::StartedAlbumRoot { root } => info!(root = %root, "Scanning collection root"),
            ScanEvent::TotalFilesToScan(total) => info!(files = total, "Counted files"),
            ScanEvent::ScanningProgress(fraction) => {
                let percent = (fraction * 100.0) as u32;
                if percent / 10 > last_percent / 10 {
                    info!("{}% scanned", percent);
                }
                last_percent = percent;
            }
            ScanEvent::StartedCompleteScan => last_percent = 0,
            ScanEvent::CollectionScanStarted { label } => info!("{}", label),
            ScanEvent::CompleteScanDone => info!("Scan pass finished"),
            ScanEvent::PartialScanDone { path } => info!(path = %path, "Partial scan finished"),
            other => debug!(event = ?other, "Scan event"),
        }
    }
}

fn run_scan(
    roots: &[PathBuf],
    config: Option<&Path>,
    defer: bool,
    update_hashes: bool,
    json: bool,
) -> Result<()> {
    let session = Session::open(roots, config)?;
    session.initialize()?;

    session.controller.complete_collection_scan(defer)?;
    if defer && !session.controller.deferred_albums().is_empty() {
        session.controller.allow_to_scan_deferred_files();
        session.wait_for_event(|e| *e == ScanEvent::CollectionScanFinished)?;
    }

    if update_hashes {
        session.controller.update_unique_hash()?;
    }

    session.finish(json)
}

fn run_rescan(roots: &[PathBuf], config: Option<&Path>, path: &Path, json: bool) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Path not found: {}", path.display()))?;
    let path = path.to_string_lossy().into_owned();

    let session = Session::open(roots, config)?;
    session.initialize()?;
    session.controller.complete_collection_scan_in_background(false)?;

    session.controller.schedule_collection_scan(&path);
    session.wait_for_event(|e| matches!(e, ScanEvent::PartialScanDone { path: p } if *p == path))?;

    session.finish(json)
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Scan {
            roots,
            defer,
            update_hashes,
            json,
        } => run_scan(&roots, config, defer, update_hashes, json),
        Commands::Rescan { roots, path, json } => run_rescan(&roots, config, &path, json),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "galleria",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
