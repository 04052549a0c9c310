//! `dlvctl`: a Go debug session driven by newline-delimited JSON on stdio.
//!
//! Each request line names an operation; each gets exactly one response
//! line. The session is closed when stdin reaches end of file.

mod logging;

use anyhow::{Context, Result};
use dlvctl_config::{default_config_dir, load_config, Config};
use dlvctl_session::{DebugController, DlvLauncher, GoBuilder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

async fn run() -> Result<()> {
    let config_dir = default_config_dir();
    let project_dir = std::env::current_dir().ok();
    let (config, config_error) = match load_config(&config_dir, project_dir.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let log_path = logging::init(&config.log).context("failed to initialize logging")?;
    if let Some(e) = config_error {
        error!("config load failed, using defaults: {e}");
    }
    info!(log = %log_path.display(), config = %config_dir.display(), "dlvctl starting");

    let mut controller = DebugController::from_config(&config);
    let served = serve(&mut controller).await;

    let report = controller.close().await;
    if report.closed {
        info!(
            failed_steps = report.cleanup_errors.len(),
            "session closed at end of input"
        );
    }
    served
}

/// Answer requests from stdin until it closes.
async fn serve(controller: &mut DebugController<DlvLauncher, GoBuilder>) -> Result<()> {
    let mut requests = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = requests
        .next_line()
        .await
        .context("failed to read request")?
    {
        if line.trim().is_empty() {
            continue;
        }
        let response = controller.handle_line(&line).await;
        let mut encoded = serde_json::to_vec(&response).context("failed to encode response")?;
        encoded.push(b'\n');
        stdout
            .write_all(&encoded)
            .await
            .context("failed to write response")?;
        stdout.flush().await.context("failed to write response")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("dlvctl: {e:#}");
        std::process::exit(1);
    }
}
