//! Named operations and their dispatch.
//!
//! A request names an operation and carries its parameters:
//!
//! ```json
//! {"operation": "setBreakpoint", "params": {"file": "main.go", "line": 14}}
//! ```
//!
//! Operations without parameters may omit `params` or send `{}`.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::builder::BuildTool;
use crate::controller::DebugController;
use crate::error::DebugError;
use crate::format::{Envelope, Payload};
use crate::server::Launcher;

/// Operation name used when a request cannot be parsed.
pub const UNKNOWN_OPERATION: &str = "unknown";

/// A request to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "operation", content = "params", rename_all = "camelCase")]
pub enum Operation {
    Debug {
        path: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
    Attach {
        pid: u32,
    },
    #[serde(rename_all = "camelCase")]
    DebugTest {
        test_file: PathBuf,
        test_name: String,
        #[serde(default)]
        flags: Vec<String>,
    },
    Close,
    Status,
    SetBreakpoint {
        file: String,
        line: i64,
        #[serde(default)]
        condition: Option<String>,
    },
    ListBreakpoints,
    RemoveBreakpoint {
        id: i64,
    },
    Continue,
    Step,
    StepOver,
    StepOut,
    EvalVariable {
        #[serde(alias = "name")]
        expression: String,
        #[serde(default)]
        depth: Option<u32>,
    },
    GetDebuggerOutput,
}

impl Operation {
    /// Parse one request line.
    pub fn parse(line: &str) -> Result<Self, DebugError> {
        let mut request: Value = serde_json::from_str(line)
            .map_err(|e| DebugError::InvalidRequest(format!("malformed JSON: {e}")))?;
        let Some(fields) = request.as_object_mut() else {
            return Err(DebugError::InvalidRequest(
                "request must be a JSON object".into(),
            ));
        };
        // Parameterless operations accept a missing, null, or empty params.
        let empty = match fields.get("params") {
            Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            _ => false,
        };
        if empty {
            fields.remove("params");
        }
        serde_json::from_value(request).map_err(|e| DebugError::InvalidRequest(e.to_string()))
    }

    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Debug { .. } => "debug",
            Operation::Attach { .. } => "attach",
            Operation::DebugTest { .. } => "debugTest",
            Operation::Close => "close",
            Operation::Status => "status",
            Operation::SetBreakpoint { .. } => "setBreakpoint",
            Operation::ListBreakpoints => "listBreakpoints",
            Operation::RemoveBreakpoint { .. } => "removeBreakpoint",
            Operation::Continue => "continue",
            Operation::Step => "step",
            Operation::StepOver => "stepOver",
            Operation::StepOut => "stepOut",
            Operation::EvalVariable { .. } => "evalVariable",
            Operation::GetDebuggerOutput => "getDebuggerOutput",
        }
    }
}

/// Render a failure that happened before any operation ran.
pub fn rejection(err: &DebugError) -> Value {
    let envelope: Envelope<Value> = Envelope::failure(UNKNOWN_OPERATION, err);
    to_json(&envelope)
}

impl Payload for Value {}

fn to_json<T: serde::Serialize>(envelope: &Envelope<T>) -> Value {
    serde_json::to_value(envelope).unwrap_or_else(|e| {
        tracing::error!("cannot serialize response: {e}");
        serde_json::json!({
            "status": "error",
            "context": {
                "operation": envelope.context.operation,
                "timestamp": envelope.context.timestamp,
                "error": format!("cannot serialize response: {e}"),
            }
        })
    })
}

impl<L: Launcher, T: BuildTool> DebugController<L, T> {
    /// Run an operation and wrap its outcome in an envelope.
    pub async fn execute(&mut self, operation: Operation) -> Value {
        let name = operation.name();
        tracing::debug!(operation = name, "executing");
        match operation {
            Operation::Debug { path, args } => {
                let result = self.debug(&path, &args).await;
                self.respond(name, result)
            }
            Operation::Attach { pid } => {
                let result = self.attach(pid).await;
                self.respond(name, result)
            }
            Operation::DebugTest {
                test_file,
                test_name,
                flags,
            } => {
                let result = self.debug_test(&test_file, &test_name, &flags).await;
                self.respond(name, result)
            }
            Operation::Close => {
                let report = self.close().await;
                self.respond(name, Ok(report))
            }
            Operation::Status => {
                let status = self.status();
                self.respond(name, Ok(status))
            }
            Operation::SetBreakpoint {
                file,
                line,
                condition,
            } => {
                let result = self.set_breakpoint(&file, line, condition.as_deref()).await;
                self.respond(name, result)
            }
            Operation::ListBreakpoints => {
                let result = self.list_breakpoints().await;
                self.respond(name, result)
            }
            Operation::RemoveBreakpoint { id } => {
                let result = self.remove_breakpoint(id).await;
                self.respond(name, result)
            }
            Operation::Continue => {
                let result = self.continue_execution().await;
                self.respond(name, result)
            }
            Operation::Step => {
                let result = self.step().await;
                self.respond(name, result)
            }
            Operation::StepOver => {
                let result = self.step_over().await;
                self.respond(name, result)
            }
            Operation::StepOut => {
                let result = self.step_out().await;
                self.respond(name, result)
            }
            Operation::EvalVariable { expression, depth } => {
                let result = self.eval(&expression, depth).await;
                self.respond(name, result)
            }
            Operation::GetDebuggerOutput => {
                let result = self.output();
                self.respond(name, result)
            }
        }
    }

    /// Parse and run one request line.
    pub async fn handle_line(&mut self, line: &str) -> Value {
        match Operation::parse(line) {
            Ok(operation) => self.execute(operation).await,
            Err(err) => {
                tracing::warn!("rejected request: {err}");
                rejection(&err)
            }
        }
    }

    fn respond<P: Payload>(&self, operation: &str, result: Result<P, DebugError>) -> Value {
        if let Err(err) = &result {
            tracing::debug!(operation, kind = err.kind(), "operation failed: {err}");
        }
        let mut envelope = Envelope::from_result(operation, result);
        if envelope.context.current_location.is_none() {
            envelope.context.current_location = self.current_location();
        }
        to_json(&envelope)
    }
}
