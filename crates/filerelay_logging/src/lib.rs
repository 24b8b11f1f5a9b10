//! Logging setup for filerelay binaries.
//!
//! Installs a `tracing` registry with two layers: a plain-text rolling log
//! file under `$FILERELAY_HOME/logs` and a stderr layer.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "filerelay=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for a filerelay binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of only warnings.
    pub verbose: bool,
    /// Skip the rolling file layer entirely.
    pub stderr_only: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    if config.stderr_only {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .init();
        return Ok(());
    }

    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = RollingLog::open(log_dir, config.app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
        .map(Mutex::new)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Get the filerelay home directory: ~/.filerelay
///
/// `FILERELAY_HOME` overrides the location.
pub fn filerelay_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("FILERELAY_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".filerelay"))
        .context("Could not determine home directory; set FILERELAY_HOME")
}

/// Get the logs directory: ~/.filerelay/logs
pub fn logs_dir() -> Result<PathBuf> {
    Ok(filerelay_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Size-capped log file that shifts full files to `name.log.1`, `name.log.2`, ...
struct RollingLog {
    dir: PathBuf,
    stem: String,
    keep: usize,
    limit: u64,
    current: Option<File>,
    written: u64,
}

impl RollingLog {
    fn open(dir: PathBuf, app_name: &str, keep: usize, limit: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut log = Self {
            dir,
            stem: sanitize_name(app_name),
            keep: keep.max(1),
            limit,
            current: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.limit {
            log.roll()?;
        }
        Ok(log)
    }

    fn path(&self, generation: usize) -> PathBuf {
        match generation {
            0 => self.dir.join(format!("{}.log", self.stem)),
            n => self.dir.join(format!("{}.log.{}", self.stem, n)),
        }
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(0))?;
        self.written = file.metadata()?.len();
        self.current = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.current.take() {
            let _ = file.flush();
        }

        // With a single generation the current file itself is the oldest.
        let oldest = self.keep - 1;
        match fs::remove_file(self.path(oldest)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        for generation in (0..oldest).rev() {
            let from = self.path(generation);
            if from.exists() {
                fs::rename(from, self.path(generation + 1))?;
            }
        }
        self.reopen()
    }
}

impl Write for RollingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.limit {
            self.roll()?;
        }
        let Some(file) = self.current.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "log file unavailable"));
        };
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
