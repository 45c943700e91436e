//! Log output setup for the binaries.
//!
//! Always logs to stdout; `RUST_LOG` overrides the default `info` filter.
//! With a log directory configured, every line is also appended to
//! `<dir>/<prefix>_log_<YYYYmmdd_HHMMSS>.log`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};

/// Build the log file path for a run started now.
pub fn log_file_path(dir: &Path, prefix: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_log_{}.log", prefix, stamp))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::config(format!("cannot open log file {}: {}", path.display(), e)))
}

/// Install the global subscriber.
///
/// Returns the log file path when file output is enabled.
pub fn init(prefix: &str, dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(false);

    let (file_layer, path) = match dir {
        Some(dir) => {
            let path = log_file_path(dir, prefix);
            let file = open_log_file(&path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("logging already initialized: {}", e)))?;

    Ok(path)
}
