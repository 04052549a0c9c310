//! Connection to a headless Delve API server.
//!
//! Calls are strictly sequential: one request is written, then lines are
//! read until the matching response arrives. The server's control channel
//! does not support concurrently outstanding requests, and `&mut self` on
//! every call keeps it that way.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::RpcError;
use crate::protocol::{
    Breakpoint, BreakpointSpec, DebuggerCommand, DebuggerState, EvalScope, LoadConfig, Variable,
};
use crate::transport::{decode_response, encode_request};

/// A JSON-RPC client bound to one Delve server.
#[derive(Debug)]
pub struct RpcClient {
    addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StateOut {
    state: DebuggerState,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BreakpointOut {
    breakpoint: Breakpoint,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBreakpointsOut {
    #[serde(default)]
    breakpoints: Vec<Breakpoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EvalOut {
    variable: Variable,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocalVarsOut {
    #[serde(default)]
    variables: Vec<Variable>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionArgsOut {
    #[serde(default)]
    args: Vec<Variable>,
}

impl RpcClient {
    /// Connect to a server listening at `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| RpcError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let (read_half, write_half) = stream.into_split();
        tracing::debug!(addr, "connected to debugger server");
        Ok(Self {
            addr: addr.to_string(),
            reader: BufReader::new(read_half),
            writer: write_half,
            next_id: 0,
        })
    }

    /// Address this client is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send a request and wait for its response.
    pub async fn call<R: DeserializeOwned>(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, RpcError> {
        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(id, method, "rpc call");

        self.writer.write_all(&encode_request(id, method, params)).await?;
        self.writer.flush().await?;

        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(RpcError::Closed {
                    method: method.to_string(),
                });
            }
            if line.trim().is_empty() {
                continue;
            }

            let response = decode_response(&line)?;
            if response.id != id {
                // Left over from a call that was abandoned mid-flight.
                tracing::warn!(expected = id, got = response.id, "skipping stale response");
                continue;
            }
            if let Some(message) = response.error {
                return Err(RpcError::Server {
                    method: method.to_string(),
                    message,
                });
            }
            return serde_json::from_value(response.result)
                .map_err(|e| RpcError::Serialization(format!("{method}: {e}")));
        }
    }

    /// `RPCServer.State`.
    pub async fn state(&mut self, non_blocking: bool) -> Result<DebuggerState, RpcError> {
        let out: StateOut = self
            .call(
                "RPCServer.State",
                serde_json::json!({ "NonBlocking": non_blocking }),
            )
            .await?;
        Ok(out.state)
    }

    /// `RPCServer.Command`: resume, step, or halt the target.
    pub async fn command(&mut self, command: DebuggerCommand) -> Result<DebuggerState, RpcError> {
        let out: StateOut = self
            .call(
                "RPCServer.Command",
                serde_json::json!({ "name": command.as_str() }),
            )
            .await?;
        Ok(out.state)
    }

    /// `RPCServer.CreateBreakpoint`.
    pub async fn create_breakpoint(&mut self, spec: &BreakpointSpec) -> Result<Breakpoint, RpcError> {
        let out: BreakpointOut = self
            .call(
                "RPCServer.CreateBreakpoint",
                serde_json::json!({ "Breakpoint": spec }),
            )
            .await?;
        Ok(out.breakpoint)
    }

    /// `RPCServer.ClearBreakpoint`.
    pub async fn clear_breakpoint(&mut self, id: i64) -> Result<Breakpoint, RpcError> {
        let out: BreakpointOut = self
            .call("RPCServer.ClearBreakpoint", serde_json::json!({ "Id": id }))
            .await?;
        Ok(out.breakpoint)
    }

    /// `RPCServer.ListBreakpoints`, including internal breakpoints.
    pub async fn list_breakpoints(&mut self) -> Result<Vec<Breakpoint>, RpcError> {
        let out: ListBreakpointsOut = self
            .call("RPCServer.ListBreakpoints", serde_json::json!({ "All": true }))
            .await?;
        Ok(out.breakpoints)
    }

    /// `RPCServer.Eval`.
    pub async fn eval(
        &mut self,
        scope: EvalScope,
        expr: &str,
        cfg: LoadConfig,
    ) -> Result<Variable, RpcError> {
        let out: EvalOut = self
            .call(
                "RPCServer.Eval",
                serde_json::json!({ "Scope": scope, "Expr": expr, "Cfg": cfg }),
            )
            .await?;
        Ok(out.variable)
    }

    /// `RPCServer.ListLocalVars`.
    pub async fn local_vars(
        &mut self,
        scope: EvalScope,
        cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError> {
        let out: LocalVarsOut = self
            .call(
                "RPCServer.ListLocalVars",
                serde_json::json!({ "Scope": scope, "Cfg": cfg }),
            )
            .await?;
        Ok(out.variables)
    }

    /// `RPCServer.ListFunctionArgs`.
    pub async fn function_args(
        &mut self,
        scope: EvalScope,
        cfg: LoadConfig,
    ) -> Result<Vec<Variable>, RpcError> {
        let out: FunctionArgsOut = self
            .call(
                "RPCServer.ListFunctionArgs",
                serde_json::json!({ "Scope": scope, "Cfg": cfg }),
            )
            .await?;
        Ok(out.args)
    }

    /// `RPCServer.Detach`. With `kill` the target is terminated.
    pub async fn detach(&mut self, kill: bool) -> Result<(), RpcError> {
        let _: serde_json::Value = self
            .call("RPCServer.Detach", serde_json::json!({ "Kill": kill }))
            .await?;
        Ok(())
    }
}
