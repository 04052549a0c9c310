use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing-subscriber`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How the debugger server is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Path or name of the `dlv` executable.
    #[serde(default = "default_dlv_path")]
    pub dlv_path: PathBuf,
    /// Seconds to wait for the server to announce its listen address.
    #[serde(default = "default_listen_timeout")]
    pub listen_timeout_secs: u64,
}

fn default_dlv_path() -> PathBuf {
    PathBuf::from("dlv")
}

fn default_listen_timeout() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            dlv_path: default_dlv_path(),
            listen_timeout_secs: default_listen_timeout(),
        }
    }
}

/// How debuggable artifacts are compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Path or name of the `go` executable.
    #[serde(default = "default_go_path")]
    pub go_path: PathBuf,
    /// Compiler flags; must keep optimizations and inlining disabled.
    #[serde(default = "default_gcflags")]
    pub gcflags: String,
}

fn default_go_path() -> PathBuf {
    PathBuf::from("go")
}

fn default_gcflags() -> String {
    "all=-N -l".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            go_path: default_go_path(),
            gcflags: default_gcflags(),
        }
    }
}

/// Bounds on session teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds allowed for detaching from the target.
    #[serde(default = "default_teardown_timeout")]
    pub detach_timeout_secs: u64,
    /// Seconds allowed for the server process to exit before it is killed.
    #[serde(default = "default_teardown_timeout")]
    pub stop_timeout_secs: u64,
}

fn default_teardown_timeout() -> u64 {
    5
}

impl SessionConfig {
    pub fn detach_timeout(&self) -> Duration {
        Duration::from_secs(self.detach_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detach_timeout_secs: default_teardown_timeout(),
            stop_timeout_secs: default_teardown_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

/// Top-level dlvctl configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Debugger server settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Build tool settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Session teardown settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}
