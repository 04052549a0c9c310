//! The active debug session and its teardown.

use std::time::Duration;

use dlvctl_config::SessionConfig;
use dlvctl_rpc::EvalScope;
use serde::Serialize;

use crate::backend::Backend;
use crate::builder::Artifact;
use crate::error::{CleanupError, CleanupStep, DebugError};
use crate::format::HaltState;
use crate::output::OutputCapture;
use crate::server::ServerProcess;

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session.
    Idle,
    /// The target is executing.
    Running,
    /// The target is halted and can be inspected.
    Stopped,
    /// The target exited; the session stays open until closed.
    Exited,
}

/// How the target came under the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Launched by the session; killed on close.
    Launched,
    /// Attached to; left running on close.
    Attached,
}

/// Bounds on each teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownLimits {
    pub detach: Duration,
    pub stop: Duration,
    pub output_grace: Duration,
}

impl TeardownLimits {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            detach: config.detach_timeout(),
            stop: config.stop_timeout(),
            output_grace: Duration::from_secs(1),
        }
    }
}

impl Default for TeardownLimits {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Everything one debug session owns.
pub struct Session<B, S> {
    pub(crate) backend: B,
    pub(crate) server: S,
    pub(crate) artifact: Option<Artifact>,
    pub(crate) output: OutputCapture,
    pub(crate) origin: Origin,
    pub(crate) pid: i64,
    pub(crate) state: SessionState,
    pub(crate) last_halt: Option<HaltState>,
}

impl<B: Backend, S: ServerProcess> Session<B, S> {
    /// Record a halt and the state it implies.
    pub(crate) fn record_halt(&mut self, halt: &HaltState) {
        self.state = if halt.is_exited() {
            SessionState::Exited
        } else {
            SessionState::Stopped
        };
        self.last_halt = Some(halt.clone());
    }

    /// Fail unless the target is halted.
    pub(crate) fn require_stopped(&self) -> Result<(), DebugError> {
        match self.state {
            SessionState::Stopped => Ok(()),
            SessionState::Running => Err(DebugError::ProcessRunning),
            SessionState::Exited => Err(DebugError::ProcessExited),
            SessionState::Idle => Err(DebugError::SessionNotActive),
        }
    }

    /// Innermost frame of the goroutine that last stopped.
    pub(crate) fn scope(&self) -> EvalScope {
        let goroutine = self
            .last_halt
            .as_ref()
            .and_then(|h| h.goroutine_id)
            .unwrap_or(-1);
        EvalScope::top(goroutine)
    }

    pub(crate) fn location(&self) -> Option<String> {
        self.last_halt.as_ref().and_then(HaltState::location)
    }

    /// Ask the server where the target is after a failed request.
    pub(crate) async fn resync(&mut self) {
        match self.backend.state(true).await {
            Ok(state) if state.exited => self.state = SessionState::Exited,
            Ok(state) if state.running => self.state = SessionState::Running,
            Ok(_) => self.state = SessionState::Stopped,
            Err(e) => tracing::warn!("cannot resync session state: {e}"),
        }
    }

    /// Release every resource, in order, continuing past failures.
    ///
    /// Launched targets are killed; attached ones are left running.
    pub(crate) async fn teardown(mut self, limits: &TeardownLimits) -> Vec<CleanupError> {
        let mut errors = Vec::new();

        let kill = self.origin == Origin::Launched;
        match tokio::time::timeout(limits.detach, self.backend.detach(kill)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(CleanupError::new(CleanupStep::Detach, e.to_string())),
            Err(_) => errors.push(CleanupError::new(
                CleanupStep::Detach,
                format!("timed out after {:?}", limits.detach),
            )),
        }

        if let Err(e) = self.server.stop(limits.stop).await {
            errors.push(CleanupError::new(CleanupStep::StopServer, e));
        }

        if let Some(artifact) = self.artifact.take() {
            let path = artifact.path().display().to_string();
            if let Err(e) = artifact.remove() {
                errors.push(CleanupError::new(
                    CleanupStep::RemoveArtifact,
                    format!("{path}: {e}"),
                ));
            }
        }

        if let Err(e) = self.output.stop(limits.output_grace).await {
            errors.push(CleanupError::new(CleanupStep::StopOutput, e));
        }

        for err in &errors {
            tracing::warn!(pid = self.pid, "teardown step failed: {err}");
        }
        errors
    }
}
