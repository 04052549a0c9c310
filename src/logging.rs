//! Log file setup.
//!
//! Stdout carries responses, so tracing output always goes to a file.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use dlvctl_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Maximum size of a single log file before rotation (10 MiB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to retain.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Install the global subscriber writing to the configured log file.
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
/// Returns the path being logged to.
pub fn init(config: &LogConfig) -> Result<PathBuf> {
    let path = config.file.clone().unwrap_or_else(default_log_file_path);
    ensure_log_dir(&path)
        .with_context(|| format!("cannot create log directory for {}", path.display()))?;
    rotate_log_files(&path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)
        .with_context(|| format!("cannot rotate {}", path.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("cannot install log subscriber: {e}"))?;
    Ok(path)
}

/// Platform-specific default log file.
///
/// * macOS: `$HOME/Library/Logs/dlvctl/dlvctl.log`
/// * Linux: `$HOME/.local/share/dlvctl/dlvctl.log`
/// * Windows: `%APPDATA%/dlvctl/logs/dlvctl.log`
/// * Fallback: `/tmp/dlvctl/dlvctl.log`
pub fn default_log_file_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Logs/dlvctl/dlvctl.log");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".local/share/dlvctl/dlvctl.log");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("dlvctl\\logs\\dlvctl.log");
        }
    }
    PathBuf::from("/tmp/dlvctl/dlvctl.log")
}

fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Shift `dlvctl.log` to `dlvctl.log.1`, `.1` to `.2` and so on once it
/// reaches `max_size` bytes, dropping `.<max_files>`.
fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let len = match fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if len < max_size {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}
