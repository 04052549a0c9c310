//! The debug session controller.
//!
//! Owns at most one [`Session`]. Every public method takes `&mut self`, so
//! operations on a session are serialized by construction; only the output
//! readers run alongside.

use std::path::Path;

use dlvctl_config::Config;
use serde::Serialize;

use crate::backend::Backend;
use crate::breakpoint::{BreakpointInfo, BreakpointList, BreakpointManager, RemovedBreakpoint};
use crate::builder::{test_filter_args, Artifact, BuildTool, GoBuilder};
use crate::error::{CleanupError, DebugError};
use crate::execution::{ExecutionController, Resume};
use crate::format::{Context, HaltState, Payload, StopReason};
use crate::inspect::{VariableInspector, VariableView, DEFAULT_DEPTH};
use crate::output::{OutputCapture, OutputSnapshot};
use crate::server::{Connection, DlvLauncher, Launcher};
use crate::session::{Origin, Session, SessionState, TeardownLimits};

/// Payload of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub active: bool,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl Payload for SessionStatus {
    fn describe(&self, context: &mut Context) {
        context.current_location = self.location.clone();
    }
}

/// Payload of `close`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseReport {
    /// Whether there was a session to close.
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<CleanupError>,
}

impl Payload for CloseReport {}

/// Payload of `evalVariable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalResult {
    pub expression: String,
    pub depth: u32,
    pub variable: VariableView,
}

impl Payload for EvalResult {}

/// Drives one debug session at a time.
pub struct DebugController<L: Launcher, T: BuildTool> {
    launcher: L,
    builder: T,
    limits: TeardownLimits,
    session: Option<Session<L::Backend, L::Server>>,
}

impl DebugController<DlvLauncher, GoBuilder> {
    /// A controller using `dlv` and the Go toolchain as configured.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            DlvLauncher::new(&config.backend),
            GoBuilder::new(&config.build),
            TeardownLimits::from_config(&config.session),
        )
    }
}

impl<L: Launcher, T: BuildTool> DebugController<L, T> {
    pub fn new(launcher: L, builder: T, limits: TeardownLimits) -> Self {
        Self {
            launcher,
            builder,
            limits,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state)
    }

    /// Location of the last halt, if a session has one.
    pub fn current_location(&self) -> Option<String> {
        self.session.as_ref().and_then(Session::location)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Build `source` and start it under the debugger, halted at entry.
    pub async fn debug(&mut self, source: &Path, args: &[String]) -> Result<HaltState, DebugError> {
        self.require_idle()?;
        let artifact = self.builder.build_program(source).await?;
        self.launch(artifact, args).await
    }

    /// Build the test binary for `test_file` and start it filtered to
    /// exactly `test_name`, halted at entry.
    pub async fn debug_test(
        &mut self,
        test_file: &Path,
        test_name: &str,
        flags: &[String],
    ) -> Result<HaltState, DebugError> {
        self.require_idle()?;
        if test_name.trim().is_empty() {
            return Err(DebugError::InvalidRequest("test name is empty".into()));
        }
        let artifact = self.builder.build_test(test_file).await?;
        let args = test_filter_args(test_name, flags);
        self.launch(artifact, &args).await
    }

    /// Attach to a running process. The target halts as a side effect and
    /// stays halted until resumed.
    pub async fn attach(&mut self, pid: u32) -> Result<HaltState, DebugError> {
        self.require_idle()?;
        if pid == 0 {
            return Err(DebugError::InvalidRequest("pid must be positive".into()));
        }
        let conn = self.launcher.attach(pid).await?;
        self.open(conn, None, Origin::Attached).await
    }

    /// Tear the session down. Succeeds with nothing to do when idle.
    pub async fn close(&mut self) -> CloseReport {
        let Some(session) = self.session.take() else {
            return CloseReport::default();
        };
        let pid = session.pid;
        let cleanup_errors = session.teardown(&self.limits).await;
        tracing::info!(pid, failed_steps = cleanup_errors.len(), "debug session closed");
        CloseReport {
            closed: true,
            pid: Some(pid),
            cleanup_errors,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &self.session {
            None => SessionStatus {
                active: false,
                state: SessionState::Idle,
                pid: None,
                origin: None,
                location: None,
                stop_reason: None,
            },
            Some(session) => SessionStatus {
                active: true,
                state: session.state,
                pid: Some(session.pid),
                origin: Some(session.origin),
                location: session.location(),
                stop_reason: session.last_halt.as_ref().map(|h| h.stop_reason.clone()),
            },
        }
    }

    async fn launch(&mut self, artifact: Artifact, args: &[String]) -> Result<HaltState, DebugError> {
        let launched = self.launcher.exec(artifact.path(), args).await;
        match launched {
            Ok(conn) => self.open(conn, Some(artifact), Origin::Launched).await,
            Err(e) => {
                if let Err(rm) = artifact.remove() {
                    tracing::warn!("cannot remove artifact after failed launch: {rm}");
                }
                Err(e)
            }
        }
    }

    async fn open(
        &mut self,
        conn: Connection<L::Backend, L::Server>,
        artifact: Option<Artifact>,
        origin: Origin,
    ) -> Result<HaltState, DebugError> {
        let mut session = Session {
            backend: conn.backend,
            server: conn.server,
            artifact,
            output: OutputCapture::start(conn.stdout, conn.stderr),
            origin,
            pid: 0,
            state: SessionState::Stopped,
            last_halt: None,
        };

        let state = match session.backend.state(false).await {
            Ok(state) => state,
            Err(e) => {
                session.teardown(&self.limits).await;
                return Err(e.into());
            }
        };
        let reason = match origin {
            _ if state.exited => StopReason::Exited,
            Origin::Launched => StopReason::Entry,
            Origin::Attached => StopReason::Attached,
        };
        session.pid = state.pid;
        let halt = HaltState::from_state(&state, reason);
        let halt = ExecutionController::new(&mut session.backend)
            .with_frame_variables(halt)
            .await;
        session.record_halt(&halt);

        tracing::info!(pid = session.pid, ?origin, "debug session started");
        self.session = Some(session);
        Ok(halt)
    }

    // -----------------------------------------------------------------------
    // Breakpoints
    // -----------------------------------------------------------------------

    pub async fn set_breakpoint(
        &mut self,
        file: &str,
        line: i64,
        condition: Option<&str>,
    ) -> Result<BreakpointInfo, DebugError> {
        let session = self.stopped_session()?;
        if file.trim().is_empty() || line <= 0 {
            return Err(DebugError::InvalidRequest(format!(
                "invalid breakpoint location {file}:{line}"
            )));
        }
        BreakpointManager::new(&mut session.backend)
            .set(file, line, condition)
            .await
    }

    pub async fn list_breakpoints(&mut self) -> Result<BreakpointList, DebugError> {
        let session = self.stopped_session()?;
        let breakpoints = BreakpointManager::new(&mut session.backend).list().await?;
        Ok(BreakpointList { breakpoints })
    }

    pub async fn remove_breakpoint(&mut self, id: i64) -> Result<RemovedBreakpoint, DebugError> {
        let session = self.stopped_session()?;
        let removed = BreakpointManager::new(&mut session.backend)
            .remove(id)
            .await?;
        Ok(RemovedBreakpoint { removed })
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    pub async fn continue_execution(&mut self) -> Result<HaltState, DebugError> {
        self.resume(Resume::Continue).await
    }

    pub async fn step(&mut self) -> Result<HaltState, DebugError> {
        self.resume(Resume::Step).await
    }

    pub async fn step_over(&mut self) -> Result<HaltState, DebugError> {
        self.resume(Resume::StepOver).await
    }

    pub async fn step_out(&mut self) -> Result<HaltState, DebugError> {
        self.resume(Resume::StepOut).await
    }

    async fn resume(&mut self, resume: Resume) -> Result<HaltState, DebugError> {
        let session = self.stopped_session()?;
        session.state = SessionState::Running;
        let result = ExecutionController::new(&mut session.backend)
            .resume(resume)
            .await;
        match result {
            Ok(halt) => {
                session.record_halt(&halt);
                Ok(halt)
            }
            Err(e) => {
                session.state = SessionState::Stopped;
                session.resync().await;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Evaluate `expression` in the innermost frame of the halted goroutine.
    pub async fn eval(
        &mut self,
        expression: &str,
        depth: Option<u32>,
    ) -> Result<EvalResult, DebugError> {
        let session = self.active()?;
        match session.state {
            SessionState::Running => return Err(DebugError::ProcessRunning),
            SessionState::Exited => {
                return Err(DebugError::ScopeError(
                    "the process has exited; there is no frame to evaluate in".into(),
                ))
            }
            SessionState::Stopped | SessionState::Idle => {}
        }
        if expression.trim().is_empty() {
            return Err(DebugError::InvalidRequest("expression is empty".into()));
        }
        let depth = depth.unwrap_or(DEFAULT_DEPTH);
        let scope = session.scope();
        let variable = VariableInspector::new(&mut session.backend)
            .eval(scope, expression, depth)
            .await?;
        Ok(EvalResult {
            expression: expression.to_string(),
            depth,
            variable,
        })
    }

    /// Everything the target has written so far.
    pub fn output(&self) -> Result<OutputSnapshot, DebugError> {
        self.session
            .as_ref()
            .map(|s| s.output.snapshot())
            .ok_or(DebugError::SessionNotActive)
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    fn require_idle(&self) -> Result<(), DebugError> {
        match self.session {
            Some(_) => Err(DebugError::SessionAlreadyActive),
            None => Ok(()),
        }
    }

    fn active(&mut self) -> Result<&mut Session<L::Backend, L::Server>, DebugError> {
        self.session.as_mut().ok_or(DebugError::SessionNotActive)
    }

    fn stopped_session(&mut self) -> Result<&mut Session<L::Backend, L::Server>, DebugError> {
        let session = self.active()?;
        session.require_stopped()?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::breakpoint::BreakpointStatus;
    use crate::error::CleanupStep;
    use crate::fake::{
        controller, int, string, strukt, FakeController, Program, HANDLER_LINE, MAIN_FILE,
    };
    use crate::format::Envelope;
    use crate::inspect::VariableScope;
    use crate::operation::Operation;

    fn src() -> PathBuf {
        PathBuf::from("/src/app")
    }

    async fn started(program: Program) -> (FakeController, Arc<Mutex<Program>>) {
        let (mut ctl, handle) = controller(program);
        ctl.debug(&src(), &[]).await.unwrap();
        (ctl, handle)
    }

    #[tokio::test]
    async fn debug_halts_at_entry() {
        let (mut ctl, handle) = controller(Program::handler(1));
        let halt = ctl.debug(&src(), &["--port".into(), "8080".into()]).await.unwrap();

        assert_eq!(halt.stop_reason, StopReason::Entry);
        assert_eq!(halt.pid, 4242);
        assert_eq!(ctl.state(), SessionState::Stopped);

        let program = handle.lock().await;
        assert_eq!(program.launches.len(), 1);
        assert_eq!(program.launches[0].1, ["--port", "8080"]);
        assert_eq!(program.launches[0].0, program.artifacts[0]);
    }

    #[tokio::test]
    async fn second_session_is_rejected() {
        let (mut ctl, _handle) = started(Program::handler(1)).await;
        let err = ctl.debug(&src(), &[]).await.unwrap_err();
        assert!(matches!(err, DebugError::SessionAlreadyActive));
        let err = ctl.attach(77).await.unwrap_err();
        assert!(matches!(err, DebugError::SessionAlreadyActive));
    }

    #[tokio::test]
    async fn operations_without_session_fail() {
        let (mut ctl, _handle) = controller(Program::handler(1));
        assert!(matches!(
            ctl.continue_execution().await,
            Err(DebugError::SessionNotActive)
        ));
        assert!(matches!(
            ctl.set_breakpoint(MAIN_FILE, 10, None).await,
            Err(DebugError::SessionNotActive)
        ));
        assert!(matches!(
            ctl.eval("x", None).await,
            Err(DebugError::SessionNotActive)
        ));
        assert!(matches!(ctl.output(), Err(DebugError::SessionNotActive)));
        assert!(!ctl.status().active);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_everything() {
        let (mut ctl, handle) = controller(Program::handler(1));
        assert_eq!(ctl.close().await, CloseReport::default());

        ctl.debug(&src(), &[]).await.unwrap();
        let artifact = handle.lock().await.artifacts[0].clone();
        assert!(artifact.exists());

        let report = ctl.close().await;
        assert!(report.closed);
        assert_eq!(report.pid, Some(4242));
        assert!(report.cleanup_errors.is_empty());
        assert_eq!(ctl.state(), SessionState::Idle);
        assert!(!artifact.exists());
        {
            let program = handle.lock().await;
            assert_eq!(program.detached, Some(true));
            assert!(program.server_stopped);
        }

        let again = ctl.close().await;
        assert!(!again.closed);
        assert_eq!(ctl.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn close_continues_past_failed_steps() {
        let mut program = Program::handler(1);
        program.fail_detach = true;
        let (mut ctl, handle) = started(program).await;
        let artifact = handle.lock().await.artifacts[0].clone();

        let report = ctl.close().await;
        assert_eq!(report.cleanup_errors.len(), 1);
        assert_eq!(report.cleanup_errors[0].step, CleanupStep::Detach);
        assert!(handle.lock().await.server_stopped);
        assert!(!artifact.exists());
        assert_eq!(ctl.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn attached_targets_are_not_killed() {
        let (mut ctl, handle) = controller(Program::handler(1));
        let halt = ctl.attach(5150).await.unwrap();
        assert_eq!(halt.stop_reason, StopReason::Attached);
        assert_eq!(halt.pid, 5150);
        assert_eq!(ctl.status().origin, Some(Origin::Attached));

        ctl.close().await;
        let program = handle.lock().await;
        assert_eq!(program.attached_to, Some(5150));
        assert_eq!(program.detached, Some(false));
        assert!(program.artifacts.is_empty());
    }

    #[tokio::test]
    async fn build_failure_leaves_controller_idle() {
        let mut program = Program::handler(1);
        program.fail_build = true;
        let (mut ctl, handle) = controller(program);
        let err = ctl.debug(&src(), &[]).await.unwrap_err();
        assert_eq!(err.kind(), "BuildFailed");
        assert!(err.to_string().contains("syntax error"));
        assert_eq!(ctl.state(), SessionState::Idle);
        assert!(handle.lock().await.launches.is_empty());
    }

    #[tokio::test]
    async fn failed_launch_removes_artifact() {
        let mut program = Program::handler(1);
        program.fail_launch = true;
        let (mut ctl, handle) = controller(program);
        let err = ctl.debug(&src(), &[]).await.unwrap_err();
        assert_eq!(err.kind(), "BackendUnavailable");
        assert_eq!(ctl.state(), SessionState::Idle);
        let artifact = handle.lock().await.artifacts[0].clone();
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn debug_test_runs_exactly_the_named_test() {
        let (mut ctl, handle) = controller(Program::handler(1));
        ctl.debug_test(
            &PathBuf::from("/src/app/parse_test.go"),
            "TestParse/empty.input",
            &["-test.count=1".into()],
        )
        .await
        .unwrap();
        let program = handle.lock().await;
        assert_eq!(
            program.launches[0].1,
            [
                "-test.run",
                "^TestParse/empty\\.input$",
                "-test.v",
                "-test.count=1"
            ]
        );
    }

    #[tokio::test]
    async fn breakpoint_conflicts_on_same_line_only() {
        let (mut ctl, _handle) = started(Program::handler(1)).await;
        let first = ctl.set_breakpoint(MAIN_FILE, 10, None).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.location, "At /src/app/main.go:10 in main.main");

        let err = ctl.set_breakpoint(MAIN_FILE, 10, None).await.unwrap_err();
        assert!(matches!(err, DebugError::BreakpointConflict { line: 10, .. }));
        let err = ctl.set_breakpoint("main.go", 10, None).await.unwrap_err();
        assert_eq!(err.kind(), "BreakpointConflict");

        let second = ctl.set_breakpoint(MAIN_FILE, 11, None).await.unwrap();
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn unresolvable_breakpoint_location() {
        let (mut ctl, _handle) = started(Program::handler(1)).await;
        let err = ctl.set_breakpoint("/elsewhere/util.go", 3, None).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidLocation");
        let err = ctl.set_breakpoint(MAIN_FILE, 0, None).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[tokio::test]
    async fn remove_breakpoint_rules() {
        let (mut ctl, _handle) = started(Program::handler(1)).await;
        let bp = ctl.set_breakpoint(MAIN_FILE, HANDLER_LINE, None).await.unwrap();

        assert!(matches!(
            ctl.remove_breakpoint(-1).await,
            Err(DebugError::BreakpointNotFound(-1))
        ));
        assert!(matches!(
            ctl.remove_breakpoint(99).await,
            Err(DebugError::BreakpointNotFound(99))
        ));

        let listed = ctl.list_breakpoints().await.unwrap().breakpoints;
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().filter(|b| b.internal).count() == 2);

        let removed = ctl.remove_breakpoint(bp.id).await.unwrap();
        assert_eq!(removed.removed.id, bp.id);
        let listed = ctl.list_breakpoints().await.unwrap().breakpoints;
        assert!(listed.iter().all(|b| b.id != bp.id));
        assert!(matches!(
            ctl.remove_breakpoint(bp.id).await,
            Err(DebugError::BreakpointNotFound(_))
        ));
    }

    #[tokio::test]
    async fn continue_hits_breakpoint_with_locals() {
        let (mut ctl, _handle) = started(Program::handler(3)).await;
        ctl.set_breakpoint(MAIN_FILE, HANDLER_LINE, None).await.unwrap();

        let halt = ctl.continue_execution().await.unwrap();
        assert_eq!(halt.stop_reason, StopReason::Breakpoint);
        assert_eq!(halt.function.as_deref(), Some("main.handler"));
        assert_eq!(halt.line, Some(HANDLER_LINE));
        assert_eq!(halt.locals.len(), 2);
        assert_eq!(halt.locals[0].name, "id");
        assert_eq!(halt.locals[0].scope, Some(VariableScope::Argument));
        assert_eq!(halt.locals[1].name, "counter");
        assert_eq!(halt.locals[1].value, "1");

        let listed = ctl.list_breakpoints().await.unwrap().breakpoints;
        let user = listed.iter().find(|b| b.id == 1).unwrap();
        assert_eq!(user.state, BreakpointStatus::Hit);
    }

    #[tokio::test]
    async fn conditional_breakpoint_fires_on_third_invocation() {
        let (mut ctl, handle) = started(Program::handler(5)).await;
        ctl.set_breakpoint(MAIN_FILE, HANDLER_LINE, Some("counter > 2"))
            .await
            .unwrap();

        let halt = ctl.continue_execution().await.unwrap();
        assert_eq!(
            halt.stop_reason,
            StopReason::ConditionalBreakpoint("counter > 2".into())
        );
        assert_eq!(handle.lock().await.counter, 3);
        let counter = halt.locals.iter().find(|v| v.name == "counter").unwrap();
        assert_eq!(counter.value, "3");

        let value = serde_json::to_value(Envelope::success("continue", halt)).unwrap();
        assert_eq!(
            value["context"]["stopReason"],
            "conditional breakpoint: counter > 2"
        );
    }

    #[tokio::test]
    async fn exit_is_terminal() {
        let (mut ctl, _handle) = started(Program::handler(2)).await;
        let halt = ctl.continue_execution().await.unwrap();
        assert_eq!(halt.stop_reason, StopReason::Exited);
        assert_eq!(halt.exit_code, Some(0));
        assert!(halt.locals.is_empty());
        assert_eq!(ctl.state(), SessionState::Exited);

        assert!(matches!(ctl.step().await, Err(DebugError::ProcessExited)));
        assert!(matches!(ctl.eval("counter", None).await, Err(DebugError::ScopeError(_))));
        assert!(ctl.close().await.closed);
    }

    #[tokio::test]
    async fn panic_is_reported_as_fault() {
        let mut program = Program::handler(3);
        program.panic_on = Some(2);
        let (mut ctl, _handle) = started(program).await;

        let value = ctl.execute(Operation::Continue).await;
        assert_eq!(value["status"], "success");
        assert_eq!(value["context"]["stopReason"], "fault");
        assert_eq!(value["context"]["error"], "fault: unrecovered panic");
        assert_eq!(value["function"], "runtime.fatalpanic");
        assert_eq!(ctl.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn step_over_and_step_complete() {
        let (mut ctl, _handle) = started(Program::handler(1)).await;
        let halt = ctl.step_over().await.unwrap();
        assert_eq!(halt.stop_reason, StopReason::StepComplete);
        assert_eq!(halt.line, Some(11));
        let halt = ctl.step().await.unwrap();
        assert_eq!(halt.line, Some(12));
    }

    #[tokio::test]
    async fn step_out_runs_deferred_code_once() {
        let (mut ctl, handle) = started(Program::nested()).await;
        assert_eq!(ctl.status().location.as_deref(), Some("At /src/app/main.go:40 in main.inner"));

        let halt = ctl.step_out().await.unwrap();
        assert_eq!(halt.stop_reason, StopReason::StepComplete);
        assert_eq!(halt.function.as_deref(), Some("main.outer"));
        assert_eq!(handle.lock().await.deferred_runs, ["main.inner"]);

        let output = wait_for_output(&ctl, "deferred main.inner\n").await;
        assert_eq!(output.matches("deferred").count(), 1);
    }

    #[tokio::test]
    async fn resume_failure_resyncs_and_reports_backend_unavailable() {
        let mut program = Program::handler(1);
        program.fail_command = true;
        let (mut ctl, _handle) = started(program).await;
        let err = ctl.continue_execution().await.unwrap_err();
        assert_eq!(err.kind(), "BackendUnavailable");
        assert_eq!(ctl.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn eval_depth_controls_expansion() {
        let cfg = strukt(
            "cfg",
            "main.Config",
            vec![
                string("Name", "svc"),
                int("Port", 8080),
                strukt("Limits", "main.Limits", vec![int("Max", 10)]),
            ],
        );
        let (mut ctl, _handle) = started(Program::handler(1).with_value("cfg", cfg)).await;

        let shallow = ctl.eval("cfg", None).await.unwrap();
        assert_eq!(shallow.depth, 1);
        assert_eq!(
            shallow.variable.value,
            "{Name: \"svc\", Port: 8080, Limits: main.Limits {...}}"
        );
        assert!(shallow.variable.children[2].children.is_empty());

        let deep = ctl.eval("cfg", Some(2)).await.unwrap();
        assert_eq!(
            deep.variable.value,
            "{Name: \"svc\", Port: 8080, Limits: {Max: 10}}"
        );
        assert_eq!(deep.variable.children[2].children[0].value, "10");
    }

    #[tokio::test]
    async fn eval_of_unknown_symbol_is_scope_error() {
        let (mut ctl, _handle) = started(Program::handler(1)).await;
        let err = ctl.eval("nope", None).await.unwrap_err();
        assert!(matches!(err, DebugError::ScopeError(ref m) if m.contains("nope")));
        let err = ctl.eval("  ", None).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    async fn wait_for_output(ctl: &FakeController, expected: &str) -> String {
        for _ in 0..100 {
            let snapshot = ctl.output().unwrap();
            if snapshot.stdout.contains(expected) {
                return snapshot.stdout;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        ctl.output().unwrap().stdout
    }

    #[tokio::test]
    async fn output_written_while_running_is_captured_in_order() {
        let lines = ["line 1", "line 2", "line 3", "line 4", "line 5"];
        let (mut ctl, _handle) = started(Program::handler(1).with_lines(&lines)).await;

        let halt = ctl.continue_execution().await.unwrap();
        assert!(halt.is_exited());

        let stdout = wait_for_output(&ctl, "line 5\n").await;
        assert_eq!(stdout, "line 1\nline 2\nline 3\nline 4\nline 5\n");

        let again = ctl.output().unwrap();
        assert_eq!(again.stdout, stdout);
        assert_eq!(again.stdout_bytes, stdout.len());
    }

    #[tokio::test]
    async fn status_reports_session() {
        let (mut ctl, _handle) = started(Program::handler(1)).await;
        let status = ctl.status();
        assert!(status.active);
        assert_eq!(status.state, SessionState::Stopped);
        assert_eq!(status.pid, Some(4242));
        assert_eq!(status.origin, Some(Origin::Launched));
        assert_eq!(status.location.as_deref(), Some("At /src/app/main.go:10 in main.main"));
        assert_eq!(status.stop_reason, Some(StopReason::Entry));
        ctl.close().await;
        assert_eq!(ctl.status().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn payloads_keep_envelope_status_and_context() {
        let (mut ctl, _handle) = started(Program::handler(2)).await;
        for line in [
            r#"{"operation":"setBreakpoint","params":{"file":"/src/app/main.go","line":20}}"#,
            r#"{"operation":"listBreakpoints"}"#,
            r#"{"operation":"continue"}"#,
            r#"{"operation":"evalVariable","params":{"expression":"counter"}}"#,
            r#"{"operation":"getDebuggerOutput"}"#,
            r#"{"operation":"status"}"#,
            r#"{"operation":"removeBreakpoint","params":{"id":1}}"#,
            r#"{"operation":"stepOver"}"#,
            r#"{"operation":"close"}"#,
        ] {
            let value = ctl.handle_line(line).await;
            assert_eq!(value["status"], "success", "{line}: {value}");
            assert!(value["context"]["timestamp"].is_string(), "{line}: {value}");
            assert!(value["context"]["operation"].is_string(), "{line}: {value}");
        }
    }

    #[tokio::test]
    async fn execute_wraps_results_in_envelopes() {
        let (mut ctl, _handle) = controller(Program::handler(1));

        let value = ctl.handle_line(r#"{"operation":"step"}"#).await;
        assert_eq!(value["status"], "error");
        assert_eq!(value["context"]["errorKind"], "SessionNotActive");
        assert_eq!(value["context"]["operation"], "step");

        let value = ctl
            .handle_line(r#"{"operation":"debug","params":{"path":"/src/app"}}"#)
            .await;
        assert_eq!(value["status"], "success");
        assert_eq!(value["stopReason"], "entry");

        let value = ctl
            .handle_line(r#"{"operation":"setBreakpoint","params":{"file":"/src/app/main.go","line":20}}"#)
            .await;
        assert_eq!(value["status"], "success");
        assert_eq!(value["id"], 1);
        assert_eq!(value["state"], "enabled");
        assert_eq!(
            value["context"]["currentLocation"],
            "At /src/app/main.go:10 in main.main"
        );

        let value = ctl.handle_line(r#"{"operation":"close"}"#).await;
        assert_eq!(value["closed"], true);
        let value = ctl.handle_line(r#"{"operation":"close"}"#).await;
        assert_eq!(value["status"], "success");
        assert_eq!(value["closed"], false);
    }
}
