//! Response envelopes.
//!
//! Every operation answers with the same shape:
//!
//! ```json
//! {
//!   "status": "success",
//!   "context": { "timestamp": "...", "operation": "continue", ... },
//!   ...operation payload fields...
//! }
//! ```
//!
//! Payload types describe themselves into the context through [`Payload`],
//! so a halt fills in the location, locals and stop reason once, here,
//! instead of in every operation.

use std::fmt;

use dlvctl_rpc::{DebuggerState, Thread};
use serde::{Serialize, Serializer};

use crate::error::DebugError;
use crate::inspect::VariableView;

/// Outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Metadata attached to every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// RFC 3339 time the response was produced.
    pub timestamp: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub local_variables: Vec<VariableView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl Context {
    pub fn new(operation: &str) -> Self {
        Self {
            timestamp: now_rfc3339(),
            operation: operation.to_string(),
            current_location: None,
            local_variables: Vec::new(),
            stop_reason: None,
            error: None,
            error_kind: None,
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "<unknown>".to_owned())
}

/// An operation result that can be flattened into an [`Envelope`].
pub trait Payload: Serialize {
    /// Copy whatever belongs in the shared context out of the payload.
    fn describe(&self, _context: &mut Context) {}
}

/// A uniform response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: Status,
    pub context: Context,
    #[serde(flatten)]
    pub payload: Option<T>,
}

impl<T: Payload> Envelope<T> {
    pub fn success(operation: &str, payload: T) -> Self {
        let mut context = Context::new(operation);
        payload.describe(&mut context);
        Self {
            status: Status::Success,
            context,
            payload: Some(payload),
        }
    }

    pub fn failure(operation: &str, err: &DebugError) -> Self {
        let mut context = Context::new(operation);
        context.error = Some(err.to_string());
        context.error_kind = Some(err.kind());
        Self {
            status: Status::Error,
            context,
            payload: None,
        }
    }

    pub fn from_result(operation: &str, result: Result<T, DebugError>) -> Self {
        match result {
            Ok(payload) => Self::success(operation, payload),
            Err(err) => Self::failure(operation, &err),
        }
    }
}

// ---------------------------------------------------------------------------
// Halts
// ---------------------------------------------------------------------------

/// Why the target stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Halted at program entry after a launch.
    Entry,
    /// Halted after attaching to a running process.
    Attached,
    Breakpoint,
    ConditionalBreakpoint(String),
    StepComplete,
    Exited,
    /// Unrecovered panic or fatal runtime error; carries the description.
    Fault(String),
    /// Stopped without a recognizable cause.
    Halted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Entry => f.write_str("entry"),
            StopReason::Attached => f.write_str("attached"),
            StopReason::Breakpoint => f.write_str("breakpoint"),
            StopReason::ConditionalBreakpoint(cond) => write!(f, "conditional breakpoint: {cond}"),
            StopReason::StepComplete => f.write_str("step complete"),
            StopReason::Exited => f.write_str("process exited"),
            StopReason::Fault(_) => f.write_str("fault"),
            StopReason::Halted => f.write_str("halted"),
        }
    }
}

impl Serialize for StopReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where and why the target stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HaltState {
    pub pid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goroutine_id: Option<i64>,
    pub frame: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoint_id: Option<i64>,
    /// Arguments and locals of the halted frame, reported in the context.
    #[serde(skip)]
    pub locals: Vec<VariableView>,
}

impl HaltState {
    /// Project a debugger state.
    pub fn from_state(state: &DebuggerState, stop_reason: StopReason) -> Self {
        let thread = state.current_thread.as_ref().filter(|_| !state.exited);
        Self {
            pid: state.pid,
            thread_id: thread.map(|t| t.id),
            goroutine_id: thread.map(|t| t.goroutine_id).filter(|gid| *gid > 0),
            frame: 0,
            file: thread.map(|t| t.file.clone()).filter(|f| !f.is_empty()),
            line: thread.map(|t| t.line).filter(|l| *l > 0),
            function: thread.map(function_name),
            stop_reason,
            exit_code: state.exited.then_some(state.exit_status),
            breakpoint_id: thread.and_then(|t| t.breakpoint.as_ref()).map(|bp| bp.id),
            locals: Vec::new(),
        }
    }

    pub fn with_locals(mut self, locals: Vec<VariableView>) -> Self {
        self.locals = locals;
        self
    }

    pub fn is_exited(&self) -> bool {
        self.stop_reason == StopReason::Exited
    }

    /// `At <file>:<line> in <function>`, when the target has a location.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        let line = self.line.unwrap_or(0);
        let function = self.function.as_deref().unwrap_or(UNKNOWN_FUNCTION);
        Some(location_string(file, line, function))
    }
}

impl Payload for HaltState {
    fn describe(&self, context: &mut Context) {
        context.current_location = self.location();
        context.local_variables = self.locals.clone();
        context.stop_reason = Some(match (&self.stop_reason, self.exit_code) {
            (StopReason::Exited, Some(code)) => format!("process exited with status {code}"),
            (reason, _) => reason.to_string(),
        });
        if let StopReason::Fault(description) = &self.stop_reason {
            context.error = Some(format!("fault: {description}"));
        }
    }
}

const UNKNOWN_FUNCTION: &str = "unknown";

/// Function name of a thread, `unknown` when there is no symbol.
pub fn function_name(thread: &Thread) -> String {
    thread
        .function
        .as_ref()
        .map(|f| f.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_FUNCTION)
        .to_string()
}

pub fn location_string(file: &str, line: i64, function: &str) -> String {
    format!("At {file}:{line} in {function}")
}
