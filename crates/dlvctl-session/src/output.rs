//! Capture of the target program's stdout and stderr.
//!
//! One reader task per stream appends into a shared buffer. Snapshots copy
//! the buffer under the lock, so they never interleave with a partial
//! append.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::format::Payload;

/// A readable end of one of the target's output pipes.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    errors: Vec<String>,
}

impl Captured {
    fn append(&mut self, stream: Stream, bytes: &[u8]) {
        match stream {
            Stream::Stdout => self.stdout.extend_from_slice(bytes),
            Stream::Stderr => self.stderr.extend_from_slice(bytes),
        }
    }
}

/// Point-in-time copy of everything captured so far.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSnapshot {
    pub stdout: String,
    pub stderr: String,
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
    /// Read failures, one per stream that stopped early.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reader_errors: Vec<String>,
}

impl Payload for OutputSnapshot {}

/// Running capture of a target's output streams.
#[derive(Debug)]
pub struct OutputCapture {
    buffer: Arc<Mutex<Captured>>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    /// Spawn a reader task for each stream that is present.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(stdout: Option<OutputStream>, stderr: Option<OutputStream>) -> Self {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let readers = [(Stream::Stdout, stdout), (Stream::Stderr, stderr)]
            .into_iter()
            .filter_map(|(stream, source)| {
                source.map(|source| tokio::spawn(drain(source, stream, Arc::clone(&buffer))))
            })
            .collect();
        Self { buffer, readers }
    }

    /// A capture with no readers, used when output is not observable.
    pub fn detached() -> Self {
        Self::start(None, None)
    }

    /// Copy the captured output.
    pub fn snapshot(&self) -> OutputSnapshot {
        let captured = lock(&self.buffer);
        OutputSnapshot {
            stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
            stdout_bytes: captured.stdout.len(),
            stderr_bytes: captured.stderr.len(),
            reader_errors: captured.errors.clone(),
        }
    }

    /// Stop the readers.
    ///
    /// Each reader gets `grace` to drain to end-of-stream; readers still
    /// blocked after that are aborted. Only a panicked reader is an error.
    pub async fn stop(self, grace: Duration) -> Result<(), String> {
        let mut failures = Vec::new();
        for mut reader in self.readers {
            match tokio::time::timeout(grace, &mut reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => failures.push(e.to_string()),
                Err(_) => {
                    tracing::debug!("output reader still blocked after {grace:?}, aborting");
                    reader.abort();
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }
}

async fn drain(mut source: OutputStream, stream: Stream, buffer: Arc<Mutex<Captured>>) {
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match source.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => lock(&buffer).append(stream, &chunk[..n]),
            Err(e) => {
                tracing::warn!(stream = stream.name(), "output reader failed: {e}");
                lock(&buffer)
                    .errors
                    .push(format!("{}: {e}", stream.name()));
                break;
            }
        }
    }
    tracing::trace!(stream = stream.name(), "output reader finished");
}

fn lock(buffer: &Mutex<Captured>) -> MutexGuard<'_, Captured> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}
