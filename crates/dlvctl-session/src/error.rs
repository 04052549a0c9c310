//! Session error types.

use std::fmt;

use dlvctl_rpc::RpcError;
use serde::Serialize;
use thiserror::Error;

/// Errors returned by debug controller operations.
#[derive(Debug, Error)]
pub enum DebugError {
    /// The operation needs an active session and there is none.
    #[error("no debug session is active")]
    SessionNotActive,

    /// A session is already active; close it first.
    #[error("a debug session is already active")]
    SessionAlreadyActive,

    /// The target is running and cannot serve this request.
    #[error("the target process is running")]
    ProcessRunning,

    /// The target has exited.
    #[error("the target process has exited")]
    ProcessExited,

    /// A breakpoint already exists at the requested location.
    #[error("a breakpoint already exists at {file}:{line}")]
    BreakpointConflict {
        /// Requested file.
        file: String,
        /// Requested line.
        line: i64,
    },

    /// No user breakpoint with this id.
    #[error("breakpoint {0} not found")]
    BreakpointNotFound(i64),

    /// The debugger could not resolve a breakpoint location.
    #[error("cannot set breakpoint at {file}:{line}: {message}")]
    InvalidLocation {
        /// Requested file.
        file: String,
        /// Requested line.
        line: i64,
        /// Reason reported by the debugger.
        message: String,
    },

    /// An expression could not be evaluated in the current scope.
    #[error("evaluation failed: {0}")]
    ScopeError(String),

    /// The debugger server failed, timed out, or could not be started.
    #[error("debugger backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Compiling the debuggable artifact failed.
    #[error("build failed: {0}")]
    BuildFailed(String),

    /// The request could not be understood.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DebugError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DebugError::SessionNotActive => "SessionNotActive",
            DebugError::SessionAlreadyActive => "SessionAlreadyActive",
            DebugError::ProcessRunning => "ProcessRunning",
            DebugError::ProcessExited => "ProcessExited",
            DebugError::BreakpointConflict { .. } => "BreakpointConflict",
            DebugError::BreakpointNotFound(_) => "BreakpointNotFound",
            DebugError::InvalidLocation { .. } => "InvalidLocation",
            DebugError::ScopeError(_) => "ScopeError",
            DebugError::BackendUnavailable(_) => "BackendUnavailable",
            DebugError::BuildFailed(_) => "BuildFailed",
            DebugError::InvalidRequest(_) => "InvalidRequest",
        }
    }
}

impl From<RpcError> for DebugError {
    fn from(err: RpcError) -> Self {
        DebugError::BackendUnavailable(err.to_string())
    }
}

/// A teardown step of `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CleanupStep {
    Detach,
    StopServer,
    RemoveArtifact,
    StopOutput,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanupStep::Detach => "detach",
            CleanupStep::StopServer => "stop server",
            CleanupStep::RemoveArtifact => "remove artifact",
            CleanupStep::StopOutput => "stop output capture",
        };
        f.write_str(name)
    }
}

/// A teardown step that failed. Teardown carries on past it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{step}: {message}")]
pub struct CleanupError {
    /// The step that failed.
    pub step: CleanupStep,
    /// What went wrong.
    pub message: String,
}

impl CleanupError {
    pub fn new(step: CleanupStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}
