//! Resuming and stepping the target.

use dlvctl_rpc::{DebuggerCommand, DebuggerState, EvalScope, FATAL_THROW, UNRECOVERED_PANIC};

use crate::backend::Backend;
use crate::error::DebugError;
use crate::format::{HaltState, StopReason};
use crate::inspect::{VariableInspector, DEFAULT_DEPTH};

/// The ways a stopped target can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Run until a breakpoint, fault, or exit.
    Continue,
    /// One source line, entering calls.
    Step,
    /// One source line, stepping over calls.
    StepOver,
    /// Run until the current function returns to its caller.
    StepOut,
}

impl Resume {
    pub fn command(self) -> DebuggerCommand {
        match self {
            Resume::Continue => DebuggerCommand::Continue,
            Resume::Step => DebuggerCommand::Step,
            Resume::StepOver => DebuggerCommand::Next,
            Resume::StepOut => DebuggerCommand::StepOut,
        }
    }

    fn is_step(self) -> bool {
        !matches!(self, Resume::Continue)
    }
}

/// Work out why the target stopped after `resume`.
pub fn classify(state: &DebuggerState, resume: Resume) -> StopReason {
    if state.exited {
        return StopReason::Exited;
    }
    let breakpoint = state
        .current_thread
        .as_ref()
        .and_then(|t| t.breakpoint.as_ref());
    match breakpoint {
        Some(bp) if bp.name == UNRECOVERED_PANIC => StopReason::Fault("unrecovered panic".into()),
        Some(bp) if bp.name == FATAL_THROW => StopReason::Fault("fatal error".into()),
        Some(bp) if !bp.cond.is_empty() => StopReason::ConditionalBreakpoint(bp.cond.clone()),
        Some(_) => StopReason::Breakpoint,
        None if resume.is_step() => StopReason::StepComplete,
        None => StopReason::Halted,
    }
}

/// Drives execution commands against one backend.
pub struct ExecutionController<'a, B> {
    backend: &'a mut B,
}

impl<'a, B: Backend> ExecutionController<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    /// Resume and wait for the next halt.
    ///
    /// Blocks until the target stops. The returned halt carries the
    /// arguments and locals of the innermost frame unless the target exited.
    pub async fn resume(&mut self, resume: Resume) -> Result<HaltState, DebugError> {
        tracing::debug!(command = resume.command().as_str(), "resuming target");
        let state = self.backend.command(resume.command()).await?;
        let reason = classify(&state, resume);
        tracing::info!(%reason, pid = state.pid, "target halted");
        let halt = HaltState::from_state(&state, reason);
        Ok(self.with_frame_variables(halt).await)
    }

    /// Attach the halted frame's variables. A frame without readable
    /// variables (runtime code, no goroutine) just reports none.
    pub async fn with_frame_variables(&mut self, halt: HaltState) -> HaltState {
        if halt.is_exited() || halt.file.is_none() {
            return halt;
        }
        let scope = EvalScope::top(halt.goroutine_id.unwrap_or(-1));
        match VariableInspector::new(&mut *self.backend)
            .frame_variables(scope, DEFAULT_DEPTH)
            .await
        {
            Ok(locals) => halt.with_locals(locals),
            Err(e) => {
                tracing::debug!("no frame variables at halt: {e}");
                halt
            }
        }
    }
}
