//! Starting and stopping the headless debugger server.
//!
//! The server is started on an ephemeral loopback port and announces the
//! address it bound on its first line of stdout. After that line, the pipe
//! carries the target's own output, which is handed to the session for
//! capture.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use dlvctl_config::BackendConfig;
use dlvctl_rpc::RpcClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use crate::backend::Backend;
use crate::error::DebugError;
use crate::output::OutputStream;

/// Banner the server prints once it is ready for connections.
const LISTEN_BANNER: &str = "API server listening at:";

/// A started server, connected and ready.
pub struct Connection<B, S> {
    pub backend: B,
    pub server: S,
    pub stdout: Option<OutputStream>,
    pub stderr: Option<OutputStream>,
}

/// Starts debugger servers.
#[allow(async_fn_in_trait)]
pub trait Launcher {
    type Backend: Backend;
    type Server: ServerProcess;

    /// Start `program` under the debugger, halted before its first
    /// instruction.
    async fn exec(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<Connection<Self::Backend, Self::Server>, DebugError>;

    /// Attach the debugger to the running process `pid`.
    async fn attach(&self, pid: u32) -> Result<Connection<Self::Backend, Self::Server>, DebugError>;
}

/// A running server process.
#[allow(async_fn_in_trait)]
pub trait ServerProcess {
    /// Wait up to `timeout` for the server to exit, then kill it.
    async fn stop(&mut self, timeout: Duration) -> Result<(), String>;
}

/// Launches `dlv --headless`.
#[derive(Debug, Clone)]
pub struct DlvLauncher {
    dlv_path: PathBuf,
    listen_timeout: Duration,
}

impl DlvLauncher {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            dlv_path: config.dlv_path.clone(),
            listen_timeout: Duration::from_secs(config.listen_timeout_secs),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.dlv_path);
        cmd.args([
            "--headless",
            "--api-version=2",
            "--listen=127.0.0.1:0",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }

    async fn start(&self, mut cmd: Command) -> Result<Connection<RpcClient, DlvServer>, DebugError> {
        let mut child = cmd.spawn().map_err(|e| {
            DebugError::BackendUnavailable(format!(
                "cannot start {}: {e}",
                self.dlv_path.display()
            ))
        })?;
        let pid = child.id();

        let Some(stdout) = child.stdout.take() else {
            return Err(DebugError::BackendUnavailable(
                "debugger stdout not captured".into(),
            ));
        };
        let stderr = child.stderr.take();
        let mut stdout = BufReader::new(stdout);

        let addr = match tokio::time::timeout(self.listen_timeout, read_listen_addr(&mut stdout))
            .await
        {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(DebugError::BackendUnavailable(format!(
                    "debugger did not report a listen address within {:?}",
                    self.listen_timeout
                )));
            }
        };
        tracing::info!(?pid, %addr, "debugger server listening");

        let backend = match RpcClient::connect(&addr).await {
            Ok(client) => client,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e.into());
            }
        };

        Ok(Connection {
            backend,
            server: DlvServer { child },
            stdout: Some(Box::new(stdout)),
            stderr: stderr.map(|s| Box::new(s) as OutputStream),
        })
    }
}

impl Launcher for DlvLauncher {
    type Backend = RpcClient;
    type Server = DlvServer;

    async fn exec(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<Connection<RpcClient, DlvServer>, DebugError> {
        let mut cmd = self.command();
        cmd.arg("exec").arg(program);
        if !args.is_empty() {
            cmd.arg("--").args(args);
        }
        self.start(cmd).await
    }

    async fn attach(&self, pid: u32) -> Result<Connection<RpcClient, DlvServer>, DebugError> {
        let mut cmd = self.command();
        cmd.arg("attach").arg(pid.to_string());
        self.start(cmd).await
    }
}

/// Read stdout until the listen banner and return the announced address.
async fn read_listen_addr(stdout: &mut BufReader<ChildStdout>) -> Result<String, DebugError> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| DebugError::BackendUnavailable(format!("reading debugger output: {e}")))?;
        if n == 0 {
            return Err(DebugError::BackendUnavailable(
                "debugger exited before it started listening".into(),
            ));
        }
        if let Some(addr) = parse_listen_addr(&line) {
            return Ok(addr.to_string());
        }
        tracing::debug!(line = line.trim_end(), "debugger output before listen banner");
    }
}

/// Address from an `API server listening at: ADDR` line.
pub fn parse_listen_addr(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once(LISTEN_BANNER)?;
    let addr = rest.trim();
    (!addr.is_empty()).then_some(addr)
}

/// A `dlv` child process.
#[derive(Debug)]
pub struct DlvServer {
    child: Child,
}

impl ServerProcess for DlvServer {
    async fn stop(&mut self, timeout: Duration) -> Result<(), String> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "debugger server exited");
                Ok(())
            }
            Ok(Err(e)) => Err(format!("waiting for debugger server: {e}")),
            Err(_) => {
                tracing::warn!("debugger server still running after {timeout:?}, killing");
                self.child
                    .kill()
                    .await
                    .map_err(|e| format!("killing debugger server: {e}"))?;
                Err(format!("did not exit within {timeout:?}; killed"))
            }
        }
    }
}
