//! Sandbox supervisor
//!
//! Runs each transform in a fresh worker process (this same executable
//! re-invoked with [`SANDBOX_MARKER`]) and enforces the outer limits: an
//! overall deadline that kills the worker, and caps on what is read back
//! from its stdout and stderr. Nothing is shared between invocations.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::executor::{ExecutorMeta, Isolation, ScriptKind};
use super::protocol::{TransformRequest, TransformResponse, SANDBOX_MARKER};
use crate::config::{validate_sandbox_config, ConfigValidationResult, SandboxConfig};
use crate::error::{Error, ErrorKind, Result};

/// Spawns and polices sandbox workers
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SandboxConfig,
    exec_path: PathBuf,
    meta: ExecutorMeta,
}

impl Supervisor {
    /// Create a supervisor.
    ///
    /// Fails when the limits are inconsistent (including a supervisor
    /// deadline that does not exceed the worker's). The worker executable is
    /// `config.worker_path`, or the current executable when unset; whichever
    /// it is must dispatch [`SANDBOX_MARKER`] to [`super::worker::run`].
    pub fn new(config: SandboxConfig) -> Result<Self> {
        validate_sandbox_config(&config, ConfigValidationResult::valid()).ensure_valid()?;
        let exec_path = match &config.worker_path {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        let meta = ExecutorMeta {
            id: "process".to_string(),
            name: "Process sandbox".to_string(),
            isolation: Isolation::Process,
            supported_kinds: vec![ScriptKind::Transform],
            timeout: config.timeout,
        };
        Ok(Supervisor {
            config,
            exec_path,
            meta,
        })
    }

    /// Use a different worker executable
    pub fn with_exec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.exec_path = path.into();
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn exec_path(&self) -> &Path {
        &self.exec_path
    }

    pub(crate) fn executor_meta(&self) -> &ExecutorMeta {
        &self.meta
    }

    /// Run `code` (a one-argument function expression) against `payload`
    /// in a new worker and return what the function returned.
    pub async fn run_transform(&self, code: &str, payload: &Value) -> Result<Value> {
        let request = serde_json::to_vec(&TransformRequest::new(code, payload.clone()))?;
        let max_request = self.config.worker.max_request_bytes;
        if request.len() > max_request {
            return Err(Error::RequestTooLarge { limit: max_request });
        }

        let mut child = Command::new(&self.exec_path)
            .arg(SANDBOX_MARKER)
            .env_clear()
            .envs(self.config.worker.to_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ProcessFailure(format!(
                    "failed to start worker {}: {}",
                    self.exec_path.display(),
                    e
                ))
            })?;
        debug!("Started sandbox worker pid={:?}", child.id());

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(Error::ProcessFailure("worker pipes unavailable".to_string()));
        };

        // A worker that stops reading early surfaces through its response,
        // so write errors here are not interesting.
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&request).await;
            let _ = stdin.shutdown().await;
        });

        let started = Instant::now();
        let max_stdout = self.config.max_stdout_bytes;
        let outcome = tokio::time::timeout(self.config.timeout, async {
            tokio::join!(
                read_capped(stdout, max_stdout + 1),
                read_capped(stderr, self.config.max_stderr_bytes),
                child.wait(),
            )
        })
        .await;

        let Ok((stdout, stderr, status)) = outcome else {
            writer.abort();
            let _ = child.start_kill();
            let _ = child.wait().await;
            warn!("Sandbox worker killed after {:?}", self.config.timeout);
            return Err(Error::Timeout(format!(
                "sandbox worker killed after {:?}",
                self.config.timeout
            )));
        };
        debug!("Sandbox worker finished in {:?}", started.elapsed());
        // The worker has exited, so its stdin is closed and the write is over
        let _ = writer.await;

        let status = status
            .map_err(|e| Error::ProcessFailure(format!("failed to wait for worker: {}", e)))?;
        resolve(stdout, stderr.unwrap_or_default(), status, max_stdout)
    }

    /// Like [`run_transform`](Self::run_transform), with typed input and output
    pub async fn transform_into<T, P>(&self, code: &str, payload: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;
        let value = self.run_transform(code, &payload).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Keep at most `cap` bytes and discard the rest until EOF, so a chatty
/// worker never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    (&mut reader).take(cap as u64).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(buf)
}

/// Turn what a finished worker left behind into a transform outcome
fn resolve(
    stdout: io::Result<Vec<u8>>,
    stderr: Vec<u8>,
    status: ExitStatus,
    max_stdout: usize,
) -> Result<Value> {
    let stdout = stdout?;
    if stdout.len() > max_stdout {
        return Err(Error::OutputTooLarge { limit: max_stdout });
    }

    let stderr = String::from_utf8_lossy(&stderr);
    let stderr = stderr.trim();
    if !status.success() {
        let detail = if stderr.is_empty() {
            format!("worker exited with {}", status)
        } else {
            stderr.to_string()
        };
        return Err(Error::ProcessFailure(detail));
    }

    let response: TransformResponse = serde_json::from_slice(&stdout).map_err(|e| {
        if stderr.is_empty() {
            Error::Protocol(format!("invalid worker response: {}", e))
        } else {
            Error::Protocol(format!("invalid worker response: {} (stderr: {})", e, stderr))
        }
    })?;

    if !response.ok {
        return Err(Error::Worker {
            kind: response.kind.unwrap_or(ErrorKind::RuntimeFault),
            message: response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "unknown sandbox error".to_string()),
        });
    }

    response.result.ok_or(Error::EmptyResult)
}
