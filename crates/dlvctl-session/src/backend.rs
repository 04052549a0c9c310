//! The debugger backend seam.
//!
//! Everything above this trait talks to Delve only through it, so the
//! controller can be driven by a scripted backend in tests.

use dlvctl_rpc::{
    Breakpoint, BreakpointSpec, DebuggerCommand, DebuggerState, EvalScope, LoadConfig, RpcClient,
    RpcError, Variable,
};

/// Requests the session layer issues against a debugger server.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// Current debugger state. `non_blocking` returns immediately even while
    /// the target runs.
    async fn state(&mut self, non_blocking: bool) -> Result<DebuggerState, RpcError>;

    /// Run an execution command and wait for the target to halt.
    async fn command(&mut self, command: DebuggerCommand) -> Result<DebuggerState, RpcError>;

    async fn create_breakpoint(&mut self, spec: &BreakpointSpec) -> Result<Breakpoint, RpcError>;

    async fn clear_breakpoint(&mut self, id: i64) -> Result<Breakpoint, RpcError>;

    /// All breakpoints, internal ones included.
    async fn list_breakpoints(&mut self) -> Result<Vec<Breakpoint>, RpcError>;

    async fn eval(
        &mut self,
        scope: EvalScope,
        expr: &str,
        cfg: LoadConfig,
    ) -> Result<Variable, RpcError>;

    async fn local_vars(
        &mut self,
        scope: EvalScope,
        cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError>;

    async fn function_args(
        &mut self,
        scope: EvalScope,
        cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError>;

    /// Detach from the target, killing it when `kill` is set.
    async fn detach(&mut self, kill: bool) -> Result<(), RpcError>;
}

impl Backend for RpcClient {
    async fn state(&mut self, non_blocking: bool) -> Result<DebuggerState, RpcError> {
        RpcClient::state(self, non_blocking).await
    }

    async fn command(&mut self, command: DebuggerCommand) -> Result<DebuggerState, RpcError> {
        RpcClient::command(self, command).await
    }

    async fn create_breakpoint(&mut self, spec: &BreakpointSpec) -> Result<Breakpoint, RpcError> {
        RpcClient::create_breakpoint(self, spec).await
    }

    async fn clear_breakpoint(&mut self, id: i64) -> Result<Breakpoint, RpcError> {
        RpcClient::clear_breakpoint(self, id).await
    }

    async fn list_breakpoints(&mut self) -> Result<Vec<Breakpoint>, RpcError> {
        RpcClient::list_breakpoints(self).await
    }

    async fn eval(
        &mut self,
        scope: EvalScope,
        expr: &str,
        cfg: LoadConfig,
    ) -> Result<Variable, RpcError> {
        RpcClient::eval(self, scope, expr, cfg).await
    }

    async fn local_vars(
        &mut self,
        scope: EvalScope,
        cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError> {
        RpcClient::local_vars(self, scope, cfg).await
    }

    async fn function_args(
        &mut self,
        scope: EvalScope,
        cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError> {
        RpcClient::function_args(self, scope, cfg).await
    }

    async fn detach(&mut self, kill: bool) -> Result<(), RpcError> {
        RpcClient::detach(self, kill).await
    }
}
