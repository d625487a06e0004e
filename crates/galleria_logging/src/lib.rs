//! Shared logging setup for Galleria binaries.
//!
//! Log lines go to a size-rotated file under `~/.galleria/logs` and to stderr.
//! `RUST_LOG` overrides the default filter for both sinks.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "galleria=info,galleria_scan=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by Galleria binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// Without `verbose`, stderr only carries warnings so progress output stays readable.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = LogWriter::open(&log_dir, config.app_name)?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_names(true)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Get the Galleria home directory: ~/.galleria
pub fn galleria_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("GALLERIA_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".galleria")
}

/// Get the logs directory: ~/.galleria/logs
pub fn logs_dir() -> PathBuf {
    galleria_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Size-capped log file. Older generations are kept as `<stem>.log.N`.
struct LogFile {
    dir: PathBuf,
    stem: String,
    generations: usize,
    limit: u64,
    file: File,
    written: u64,
}

impl LogFile {
    fn open(dir: &Path, app_name: &str, generations: usize, limit: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = file_stem(app_name);
        let path = dir.join(format!("{}.log", stem));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();

        let mut log = Self {
            dir: dir.to_path_buf(),
            stem,
            generations: generations.max(1),
            limit,
            file,
            written,
        };
        if log.written > log.limit {
            log.roll()?;
        }
        Ok(log)
    }

    /// Generation 0 is the file being written.
    fn generation(&self, n: usize) -> PathBuf {
        match n {
            0 => self.dir.join(format!("{}.log", self.stem)),
            n => self.dir.join(format!("{}.log.{}", self.stem, n)),
        }
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = self.generations - 1;
        if oldest > 0 {
            let last = self.generation(oldest);
            if last.exists() {
                fs::remove_file(&last)?;
            }
            for n in (0..oldest).rev() {
                let from = self.generation(n);
                if from.exists() {
                    fs::rename(&from, self.generation(n + 1))?;
                }
            }
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.generation(0))?;
        self.written = 0;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.limit {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Cloneable handle to the log file, one per formatted event.
#[derive(Clone)]
struct LogWriter(Arc<Mutex<LogFile>>);

impl LogWriter {
    fn open(dir: &Path, app_name: &str) -> Result<Self> {
        let log = LogFile::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", app_name))?;
        Ok(Self(Arc::new(Mutex::new(log))))
    }

    fn file(&self) -> MutexGuard<'_, LogFile> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file().flush()
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("galleria scan/1"), "galleria_scan_1");
        assert_eq!(file_stem("ok-name_2"), "ok-name_2");
    }

    #[test]
    fn test_roll_keeps_bounded_generations() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut log = LogFile::open(temp.path(), "galleria", 3, 16).unwrap();

        for _ in 0..10 {
            log.write_all(b"0123456789").unwrap();
        }
        log.flush().unwrap();

        assert!(temp.path().join("galleria.log").exists());
        assert!(temp.path().join("galleria.log.1").exists());
        assert!(temp.path().join("galleria.log.2").exists());
        assert!(!temp.path().join("galleria.log.3").exists());
        assert_eq!(fs::read(temp.path().join("galleria.log")).unwrap().len(), 10);
    }

    #[test]
    fn test_single_generation_truncates() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut log = LogFile::open(temp.path(), "one", 1, 8).unwrap();

        log.write_all(b"aaaaaa").unwrap();
        log.write_all(b"bbbbbb").unwrap();
        log.flush().unwrap();

        assert_eq!(fs::read(temp.path().join("one.log")).unwrap(), b"bbbbbb");
        assert!(!temp.path().join("one.log.1").exists());
    }

    #[test]
    fn test_reopen_appends_to_existing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        {
            let mut log = LogFile::open(temp.path(), "app", 2, 1024).unwrap();
            log.write_all(b"first\n").unwrap();
        }
        let log = LogFile::open(temp.path(), "app", 2, 1024).unwrap();
        assert_eq!(log.written, 6);
    }

    #[test]
    fn test_home_override() {
        let temp = tempfile::TempDir::new().unwrap();
        std::env::set_var("GALLERIA_HOME", temp.path());
        assert_eq!(logs_dir(), temp.path().join("logs"));
        assert!(ensure_logs_dir().unwrap().is_dir());
        std::env::remove_var("GALLERIA_HOME");
    }
}
