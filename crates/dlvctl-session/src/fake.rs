//! Scripted stand-ins for the debugger server and build tool.
//!
//! [`Program`] models a tiny target: `main.main` calls `main.handler` once
//! per invocation, each invocation printing a few lines to stdout, until the
//! invocation budget runs out and the program exits. Breakpoints, conditions
//! on `counter`, a call stack with deferred functions, and a table of
//! evaluable values are enough to drive the controller end to end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dlvctl_rpc::{
    Breakpoint, BreakpointSpec, DebuggerCommand, DebuggerState, EvalScope, Function, Kind,
    LoadConfig, RpcError, Thread, Variable, FATAL_THROW, UNRECOVERED_PANIC, VARIABLE_ARGUMENT,
};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::builder::{Artifact, BuildTool};
use crate::controller::DebugController;
use crate::error::DebugError;
use crate::server::{Connection, Launcher, ServerProcess};
use crate::session::TeardownLimits;

pub const MAIN_FILE: &str = "/src/app/main.go";
pub const HANDLER_LINE: i64 = 20;
pub const MAIN_LINE: i64 = 10;

#[derive(Debug, Clone)]
pub struct Frame {
    pub function: String,
    pub line: i64,
    /// Whether the function has a deferred call pending.
    pub deferred: bool,
}

impl Frame {
    pub fn new(function: &str, line: i64) -> Self {
        Self {
            function: function.into(),
            line,
            deferred: false,
        }
    }

    pub fn with_defer(mut self) -> Self {
        self.deferred = true;
        self
    }
}

pub struct Program {
    pub pid: i64,
    pub breakpoints: Vec<Breakpoint>,
    next_id: i64,
    pub frames: Vec<Frame>,
    pub counter: i64,
    pub invocations: i64,
    /// Printed to stdout on every invocation.
    pub lines: Vec<String>,
    pub panic_on: Option<i64>,
    pub exit_status: i64,
    pub exited: bool,
    pub values: HashMap<String, Variable>,
    pub deferred_runs: Vec<String>,

    pub fail_launch: bool,
    pub fail_build: bool,
    pub fail_command: bool,
    pub fail_detach: bool,

    pub launches: Vec<(PathBuf, Vec<String>)>,
    pub attached_to: Option<u32>,
    pub artifacts: Vec<PathBuf>,
    pub detached: Option<bool>,
    pub server_stopped: bool,
    pub commands: Vec<DebuggerCommand>,

    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
}

impl Program {
    /// Calls the handler `invocations` times, then exits with status 0.
    pub fn handler(invocations: i64) -> Self {
        Self {
            pid: 4242,
            breakpoints: vec![
                system_breakpoint(-1, UNRECOVERED_PANIC),
                system_breakpoint(-2, FATAL_THROW),
            ],
            next_id: 1,
            frames: vec![Frame::new("main.main", MAIN_LINE)],
            counter: 0,
            invocations,
            lines: Vec::new(),
            panic_on: None,
            exit_status: 0,
            exited: false,
            values: HashMap::new(),
            deferred_runs: Vec::new(),
            fail_launch: false,
            fail_build: false,
            fail_command: false,
            fail_detach: false,
            launches: Vec::new(),
            attached_to: None,
            artifacts: Vec::new(),
            detached: None,
            server_stopped: false,
            commands: Vec::new(),
            stdout: None,
            stderr: None,
        }
    }

    /// Halted two calls deep: `main.main -> main.outer -> main.inner`,
    /// both callees with a deferred call.
    pub fn nested() -> Self {
        let mut program = Self::handler(0);
        program.frames = vec![
            Frame::new("main.main", MAIN_LINE),
            Frame::new("main.outer", 30).with_defer(),
            Frame::new("main.inner", 40).with_defer(),
        ];
        program
    }

    pub fn with_lines(mut self, lines: &[&str]) -> Self {
        self.lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_value(mut self, name: &str, value: Variable) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    fn state(&self, breakpoint: Option<Breakpoint>) -> DebuggerState {
        if self.exited {
            return DebuggerState {
                pid: self.pid,
                exited: true,
                exit_status: self.exit_status,
                ..Default::default()
            };
        }
        let current_thread = self.frames.last().map(|frame| Thread {
            id: 1,
            file: MAIN_FILE.into(),
            line: frame.line,
            function: Some(Function {
                name: frame.function.clone(),
            }),
            goroutine_id: 1,
            breakpoint,
        });
        DebuggerState {
            pid: self.pid,
            current_thread,
            ..Default::default()
        }
    }

    async fn print(&mut self, text: &str) {
        if let Some(out) = self.stdout.as_mut() {
            let _ = out.write_all(text.as_bytes()).await;
        }
    }

    async fn run_continue(&mut self) -> DebuggerState {
        loop {
            if self.counter >= self.invocations {
                self.exited = true;
                self.frames.clear();
                return self.state(None);
            }
            self.counter += 1;
            for line in self.lines.clone() {
                self.print(&format!("{line}\n")).await;
            }
            self.frames = vec![
                Frame::new("main.main", MAIN_LINE),
                Frame::new("main.handler", HANDLER_LINE),
            ];
            if self.panic_on == Some(self.counter) {
                let panic = self.breakpoints.iter().find(|bp| bp.id == -1).cloned();
                self.frames.push(Frame::new("runtime.fatalpanic", 1200));
                return self.state(panic);
            }
            let counter = self.counter;
            let hit = self.breakpoints.iter_mut().find(|bp| {
                bp.id > 0
                    && !bp.disabled
                    && bp.line == HANDLER_LINE
                    && condition_holds(&bp.cond, counter)
            });
            if let Some(bp) = hit {
                bp.total_hit_count += 1;
                let bp = bp.clone();
                return self.state(Some(bp));
            }
        }
    }

    async fn step_out(&mut self) -> DebuggerState {
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop() {
                if frame.deferred {
                    self.deferred_runs.push(frame.function.clone());
                    self.print(&format!("deferred {}\n", frame.function)).await;
                }
            }
        }
        self.state(None)
    }

    fn step_line(&mut self) -> DebuggerState {
        if let Some(frame) = self.frames.last_mut() {
            frame.line += 1;
        }
        self.state(None)
    }

    fn frame_locals(&self) -> Vec<Variable> {
        vec![int("counter", self.counter)]
    }

    fn frame_args(&self) -> Vec<Variable> {
        vec![Variable {
            flags: VARIABLE_ARGUMENT,
            ..int("id", 7)
        }]
    }
}

fn system_breakpoint(id: i64, name: &str) -> Breakpoint {
    Breakpoint {
        id,
        name: name.into(),
        file: "/usr/local/go/src/runtime/panic.go".into(),
        line: 1200,
        function_name: "runtime.fatalpanic".into(),
        ..Default::default()
    }
}

/// `counter <op> <n>`; anything else never holds.
fn condition_holds(cond: &str, counter: i64) -> bool {
    if cond.trim().is_empty() {
        return true;
    }
    let parts: Vec<&str> = cond.split_whitespace().collect();
    let [ident, op, rhs] = parts.as_slice() else {
        return false;
    };
    let Ok(rhs) = rhs.parse::<i64>() else {
        return false;
    };
    if *ident != "counter" {
        return false;
    }
    match *op {
        ">" => counter > rhs,
        ">=" => counter >= rhs,
        "<" => counter < rhs,
        "<=" => counter <= rhs,
        "==" => counter == rhs,
        "!=" => counter != rhs,
        _ => false,
    }
}

/// Drop children past the load depth, as the server does.
fn trim(mut var: Variable, remaining: i64) -> Variable {
    match var.kind() {
        Kind::Struct | Kind::Array | Kind::Slice | Kind::Map => {
            if remaining <= 0 {
                var.children.clear();
            } else {
                var.children = var
                    .children
                    .into_iter()
                    .map(|c| trim(c, remaining - 1))
                    .collect();
            }
        }
        Kind::Pointer | Kind::Interface => {
            var.children = var
                .children
                .into_iter()
                .map(|c| trim(c, remaining))
                .collect();
        }
        _ => {}
    }
    var
}

pub fn int(name: &str, value: i64) -> Variable {
    Variable {
        name: name.into(),
        type_name: "int".into(),
        kind: 2,
        value: value.to_string(),
        addr: 0xc000010000,
        ..Default::default()
    }
}

pub fn string(name: &str, value: &str) -> Variable {
    Variable {
        name: name.into(),
        type_name: "string".into(),
        kind: 24,
        value: value.into(),
        len: value.len() as i64,
        addr: 0xc000010100,
        ..Default::default()
    }
}

pub fn strukt(name: &str, type_name: &str, children: Vec<Variable>) -> Variable {
    Variable {
        name: name.into(),
        type_name: type_name.into(),
        kind: 25,
        len: children.len() as i64,
        addr: 0xc000020000,
        children,
        ..Default::default()
    }
}

fn server_error(method: &str, message: String) -> RpcError {
    RpcError::Server {
        method: method.into(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub struct FakeBackend {
    program: Arc<Mutex<Program>>,
}

impl Backend for FakeBackend {
    async fn state(&mut self, _non_blocking: bool) -> Result<DebuggerState, RpcError> {
        let program = self.program.lock().await;
        Ok(program.state(None))
    }

    async fn command(&mut self, command: DebuggerCommand) -> Result<DebuggerState, RpcError> {
        let mut program = self.program.lock().await;
        program.commands.push(command);
        if program.fail_command {
            return Err(RpcError::Closed {
                method: "RPCServer.Command".into(),
            });
        }
        Ok(match command {
            DebuggerCommand::Continue => program.run_continue().await,
            DebuggerCommand::Step | DebuggerCommand::Next => program.step_line(),
            DebuggerCommand::StepOut => program.step_out().await,
            DebuggerCommand::Halt => program.state(None),
        })
    }

    async fn create_breakpoint(&mut self, spec: &BreakpointSpec) -> Result<Breakpoint, RpcError> {
        let mut program = self.program.lock().await;
        let method = "RPCServer.CreateBreakpoint";
        if !MAIN_FILE.ends_with(spec.file.trim_start_matches("./")) {
            return Err(server_error(
                method,
                format!("could not find {}:{}", spec.file, spec.line),
            ));
        }
        if program
            .breakpoints
            .iter()
            .any(|bp| bp.file == MAIN_FILE && bp.line == spec.line)
        {
            return Err(server_error(
                method,
                format!("Breakpoint exists at {MAIN_FILE}:{} at 4a8f3c", spec.line),
            ));
        }
        let id = program.next_id;
        program.next_id += 1;
        let function = if spec.line == HANDLER_LINE {
            "main.handler"
        } else {
            "main.main"
        };
        let bp = Breakpoint {
            id,
            file: MAIN_FILE.into(),
            line: spec.line,
            function_name: function.into(),
            cond: spec.cond.clone(),
            ..Default::default()
        };
        program.breakpoints.push(bp.clone());
        Ok(bp)
    }

    async fn clear_breakpoint(&mut self, id: i64) -> Result<Breakpoint, RpcError> {
        let mut program = self.program.lock().await;
        match program.breakpoints.iter().position(|bp| bp.id == id) {
            Some(index) => Ok(program.breakpoints.remove(index)),
            None => Err(server_error(
                "RPCServer.ClearBreakpoint",
                format!("no breakpoint with id {id}"),
            )),
        }
    }

    async fn list_breakpoints(&mut self) -> Result<Vec<Breakpoint>, RpcError> {
        Ok(self.program.lock().await.breakpoints.clone())
    }

    async fn eval(
        &mut self,
        _scope: EvalScope,
        expr: &str,
        cfg: LoadConfig,
    ) -> Result<Variable, RpcError> {
        let program = self.program.lock().await;
        if expr == "counter" {
            return Ok(int("counter", program.counter));
        }
        program
            .values
            .get(expr)
            .cloned()
            .map(|v| trim(v, cfg.max_variable_recurse))
            .ok_or_else(|| {
                server_error(
                    "RPCServer.Eval",
                    format!("could not find symbol value for {expr}"),
                )
            })
    }

    async fn local_vars(
        &mut self,
        _scope: EvalScope,
        _cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError> {
        Ok(self.program.lock().await.frame_locals())
    }

    async fn function_args(
        &mut self,
        _scope: EvalScope,
        _cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError> {
        Ok(self.program.lock().await.frame_args())
    }

    async fn detach(&mut self, kill: bool) -> Result<(), RpcError> {
        let mut program = self.program.lock().await;
        program.detached = Some(kill);
        if program.fail_detach {
            return Err(server_error("RPCServer.Detach", "detach failed".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server, launcher, build tool
// ---------------------------------------------------------------------------

pub struct FakeServer {
    program: Arc<Mutex<Program>>,
}

impl ServerProcess for FakeServer {
    async fn stop(&mut self, _timeout: Duration) -> Result<(), String> {
        let mut program = self.program.lock().await;
        program.server_stopped = true;
        program.stdout = None;
        program.stderr = None;
        Ok(())
    }
}

pub struct FakeLauncher {
    program: Arc<Mutex<Program>>,
}

impl FakeLauncher {
    async fn connect(&self) -> Connection<FakeBackend, FakeServer> {
        let (out_w, out_r) = tokio::io::duplex(64 * 1024);
        let (err_w, err_r) = tokio::io::duplex(64 * 1024);
        {
            let mut program = self.program.lock().await;
            program.stdout = Some(out_w);
            program.stderr = Some(err_w);
        }
        Connection {
            backend: FakeBackend {
                program: Arc::clone(&self.program),
            },
            server: FakeServer {
                program: Arc::clone(&self.program),
            },
            stdout: Some(Box::new(out_r)),
            stderr: Some(Box::new(err_r)),
        }
    }
}

impl Launcher for FakeLauncher {
    type Backend = FakeBackend;
    type Server = FakeServer;

    async fn exec(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<Connection<FakeBackend, FakeServer>, DebugError> {
        {
            let mut state = self.program.lock().await;
            state.launches.push((program.to_path_buf(), args.to_vec()));
            if state.fail_launch {
                return Err(DebugError::BackendUnavailable(
                    "debugger exited before it started listening".into(),
                ));
            }
        }
        Ok(self.connect().await)
    }

    async fn attach(&self, pid: u32) -> Result<Connection<FakeBackend, FakeServer>, DebugError> {
        {
            let mut state = self.program.lock().await;
            state.attached_to = Some(pid);
            state.pid = i64::from(pid);
        }
        Ok(self.connect().await)
    }
}

pub struct FakeBuilder {
    program: Arc<Mutex<Program>>,
}

impl FakeBuilder {
    async fn build(&self) -> Result<Artifact, DebugError> {
        let mut program = self.program.lock().await;
        if program.fail_build {
            return Err(DebugError::BuildFailed(
                "./main.go:3:1: syntax error: non-declaration statement outside function body"
                    .into(),
            ));
        }
        let artifact =
            Artifact::reserve().map_err(|e| DebugError::BuildFailed(e.to_string()))?;
        program.artifacts.push(artifact.path().to_path_buf());
        Ok(artifact)
    }
}

impl BuildTool for FakeBuilder {
    async fn build_program(&self, _source: &Path) -> Result<Artifact, DebugError> {
        self.build().await
    }

    async fn build_test(&self, _test_file: &Path) -> Result<Artifact, DebugError> {
        self.build().await
    }
}

pub type FakeController = DebugController<FakeLauncher, FakeBuilder>;

/// A controller wired to `program`, plus a handle to inspect it.
pub fn controller(program: Program) -> (FakeController, Arc<Mutex<Program>>) {
    let program = Arc::new(Mutex::new(program));
    let controller = DebugController::new(
        FakeLauncher {
            program: Arc::clone(&program),
        },
        FakeBuilder {
            program: Arc::clone(&program),
        },
        TeardownLimits {
            detach: Duration::from_secs(1),
            stop: Duration::from_secs(1),
            output_grace: Duration::from_millis(200),
        },
    );
    (controller, program)
}
