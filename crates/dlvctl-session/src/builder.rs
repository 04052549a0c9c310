//! Compiling debuggable artifacts.
//!
//! Artifacts go to uniquely named temporary files and are built with
//! optimizations and inlining disabled so breakpoints and locals line up
//! with the source.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use dlvctl_config::BuildConfig;
use tempfile::TempPath;
use tokio::process::Command;

use crate::error::DebugError;

/// A compiled binary owned by a session. Dropping it deletes the file.
#[derive(Debug)]
pub struct Artifact {
    path: TempPath,
}

impl Artifact {
    /// Reserve a fresh, uniquely named artifact path.
    pub fn reserve() -> io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("dlvctl-")
            .suffix(std::env::consts::EXE_SUFFIX)
            .tempfile()?
            .into_temp_path();
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the artifact, reporting failure.
    pub fn remove(self) -> io::Result<()> {
        self.path.close()
    }
}

/// Produces debuggable artifacts.
#[allow(async_fn_in_trait)]
pub trait BuildTool {
    /// Build the program at `source`, a package directory or a single file.
    async fn build_program(&self, source: &Path) -> Result<Artifact, DebugError>;

    /// Build the test binary of the package containing `test_file`.
    async fn build_test(&self, test_file: &Path) -> Result<Artifact, DebugError>;
}

/// Builds with the Go toolchain.
#[derive(Debug, Clone)]
pub struct GoBuilder {
    go_path: PathBuf,
    gcflags: String,
}

impl GoBuilder {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            go_path: config.go_path.clone(),
            gcflags: config.gcflags.clone(),
        }
    }

    fn build_args(&self, artifact: &Path, target: &str) -> Vec<OsString> {
        vec![
            "build".into(),
            format!("-gcflags={}", self.gcflags).into(),
            "-o".into(),
            artifact.into(),
            target.into(),
        ]
    }

    fn test_args(&self, artifact: &Path) -> Vec<OsString> {
        vec![
            "test".into(),
            "-c".into(),
            format!("-gcflags={}", self.gcflags).into(),
            "-o".into(),
            artifact.into(),
        ]
    }

    async fn run(&self, dir: &Path, args: Vec<OsString>) -> Result<(), DebugError> {
        tracing::debug!(dir = %dir.display(), ?args, "running go");
        let output = Command::new(&self.go_path)
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DebugError::BuildFailed(format!("cannot run {}: {e}", self.go_path.display()))
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("go exited with {}", output.status),
            text => text.to_string(),
        };
        Err(DebugError::BuildFailed(message))
    }
}

impl BuildTool for GoBuilder {
    async fn build_program(&self, source: &Path) -> Result<Artifact, DebugError> {
        let (dir, target) = build_target(source)?;
        let artifact = reserve()?;
        self.run(&dir, self.build_args(artifact.path(), &target))
            .await?;
        tracing::info!(source = %source.display(), artifact = %artifact.path().display(), "built program");
        Ok(artifact)
    }

    async fn build_test(&self, test_file: &Path) -> Result<Artifact, DebugError> {
        let dir = if test_file.is_dir() {
            test_file.to_path_buf()
        } else {
            parent_dir(test_file)
        };
        if !dir.is_dir() {
            return Err(DebugError::BuildFailed(format!(
                "no package directory for {}",
                test_file.display()
            )));
        }
        let artifact = reserve()?;
        self.run(&dir, self.test_args(artifact.path())).await?;
        tracing::info!(package = %dir.display(), artifact = %artifact.path().display(), "built test binary");
        Ok(artifact)
    }
}

fn reserve() -> Result<Artifact, DebugError> {
    Artifact::reserve().map_err(|e| DebugError::BuildFailed(format!("cannot create artifact: {e}")))
}

/// Working directory and build target for `source`.
///
/// A directory builds its package in place; a file builds alone from its
/// parent directory.
fn build_target(source: &Path) -> Result<(PathBuf, String), DebugError> {
    if source.is_dir() {
        return Ok((source.to_path_buf(), ".".to_string()));
    }
    if !source.is_file() {
        return Err(DebugError::BuildFailed(format!(
            "{} does not exist",
            source.display()
        )));
    }
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DebugError::BuildFailed(format!("{} has no file name", source.display())))?;
    Ok((parent_dir(source), name))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Arguments that make a test binary run exactly `test_name`, verbosely,
/// followed by any caller flags.
pub fn test_filter_args(test_name: &str, flags: &[String]) -> Vec<String> {
    let mut args = vec![
        "-test.run".to_string(),
        format!("^{}$", regex::escape(test_name)),
        "-test.v".to_string(),
    ];
    args.extend(flags.iter().cloned());
    args
}
