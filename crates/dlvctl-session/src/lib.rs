//! Debug session control over a headless Delve server.
//!
//! The [`DebugController`] owns at most one session: a built artifact, a
//! debugger server, an RPC connection, and the capture of the target's
//! output. Managers for breakpoints, execution, and variables operate on the
//! session's backend, and every outcome is reported through a uniform
//! [`Envelope`].

pub mod backend;
pub mod breakpoint;
pub mod builder;
pub mod controller;
pub mod error;
pub mod execution;
pub mod format;
pub mod inspect;
pub mod operation;
pub mod output;
pub mod server;
pub mod session;

#[cfg(test)]
mod fake;

// Re-export key types for convenience.
pub use backend::Backend;
pub use breakpoint::{BreakpointInfo, BreakpointManager, BreakpointStatus};
pub use builder::{Artifact, BuildTool, GoBuilder};
pub use controller::{CloseReport, DebugController, EvalResult, SessionStatus};
pub use error::{CleanupError, CleanupStep, DebugError};
pub use execution::{ExecutionController, Resume};
pub use format::{Context, Envelope, HaltState, Payload, Status, StopReason};
pub use inspect::{VariableInspector, VariableScope, VariableView};
pub use operation::Operation;
pub use output::{OutputCapture, OutputSnapshot};
pub use server::{DlvLauncher, DlvServer, Launcher, ServerProcess};
pub use session::{Origin, SessionState, TeardownLimits};
