//! Sandbox configuration types
//!
//! Limits for the out-of-process transform sandbox: the supervisor side
//! (overall deadline, pipe caps) and the worker side (internal deadline,
//! request/code/result caps, OS resource ceilings).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables that carry [`WorkerLimits`] into a worker process
pub const ENV_WORKER_TIMEOUT_MS: &str = "JSFENCE_WORKER_TIMEOUT_MS";
pub const ENV_WORKER_MAX_REQUEST_BYTES: &str = "JSFENCE_WORKER_MAX_REQUEST_BYTES";
pub const ENV_WORKER_MAX_CODE_BYTES: &str = "JSFENCE_WORKER_MAX_CODE_BYTES";
pub const ENV_WORKER_MAX_RESULT_BYTES: &str = "JSFENCE_WORKER_MAX_RESULT_BYTES";
pub const ENV_WORKER_CPU_LIMIT_SECS: &str = "JSFENCE_WORKER_CPU_LIMIT_SECS";
pub const ENV_WORKER_MEMORY_LIMIT_BYTES: &str = "JSFENCE_WORKER_MEMORY_LIMIT_BYTES";
pub const ENV_WORKER_HEAP_LIMIT_BYTES: &str = "JSFENCE_WORKER_HEAP_LIMIT_BYTES";

/// Sandbox supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Executable re-invoked as the worker (defaults to the current executable)
    #[serde(default)]
    pub worker_path: Option<PathBuf>,
    /// Overall deadline for one transform, enforced by killing the worker
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Maximum bytes accepted on the worker's stdout
    #[serde(default = "default_max_stdout")]
    pub max_stdout_bytes: usize,
    /// Maximum bytes of worker stderr kept for error messages
    #[serde(default = "default_max_stderr")]
    pub max_stderr_bytes: usize,
    /// Limits applied inside the worker
    #[serde(default)]
    pub worker: WorkerLimits,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            worker_path: None,
            timeout: default_timeout(),
            max_stdout_bytes: default_max_stdout(),
            max_stderr_bytes: default_max_stderr(),
            worker: WorkerLimits::default(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_millis(300)
}

fn default_max_stdout() -> usize {
    // Result cap plus room for the response envelope
    default_max_result() + 4 * 1024
}

fn default_max_stderr() -> usize {
    8 * 1024
}

/// Limits enforced by the worker process on itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLimits {
    /// Internal deadline for running the transform
    #[serde(with = "humantime_serde", default = "default_worker_timeout")]
    pub timeout: Duration,
    /// Maximum serialized request size
    #[serde(default = "default_max_request")]
    pub max_request_bytes: usize,
    /// Maximum transform source size
    #[serde(default = "default_max_code")]
    pub max_code_bytes: usize,
    /// Maximum serialized result size
    #[serde(default = "default_max_result")]
    pub max_result_bytes: usize,
    /// Heap ceiling for the interpreter running the transform
    #[serde(default = "default_heap_limit")]
    pub heap_limit_bytes: usize,
    /// RLIMIT_CPU for the worker, in seconds
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit_secs: u64,
    /// RLIMIT_AS for the worker, off when unset
    #[serde(default)]
    pub memory_limit_bytes: Option<u64>,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        WorkerLimits {
            timeout: default_worker_timeout(),
            max_request_bytes: default_max_request(),
            max_code_bytes: default_max_code(),
            max_result_bytes: default_max_result(),
            heap_limit_bytes: default_heap_limit(),
            cpu_limit_secs: default_cpu_limit(),
            memory_limit_bytes: None,
        }
    }
}

fn default_worker_timeout() -> Duration {
    Duration::from_millis(250)
}

fn default_max_request() -> usize {
    1024 * 1024 // 1MB
}

fn default_max_code() -> usize {
    64 * 1024
}

fn default_max_result() -> usize {
    256 * 1024
}

fn default_heap_limit() -> usize {
    64 * 1024 * 1024
}

fn default_cpu_limit() -> u64 {
    2
}

impl WorkerLimits {
    /// Environment handed to a worker process so it runs with these limits
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            (ENV_WORKER_TIMEOUT_MS, self.timeout.as_millis().to_string()),
            (ENV_WORKER_MAX_REQUEST_BYTES, self.max_request_bytes.to_string()),
            (ENV_WORKER_MAX_CODE_BYTES, self.max_code_bytes.to_string()),
            (ENV_WORKER_MAX_RESULT_BYTES, self.max_result_bytes.to_string()),
            (ENV_WORKER_HEAP_LIMIT_BYTES, self.heap_limit_bytes.to_string()),
            (ENV_WORKER_CPU_LIMIT_SECS, self.cpu_limit_secs.to_string()),
        ];
        if let Some(bytes) = self.memory_limit_bytes {
            env.push((ENV_WORKER_MEMORY_LIMIT_BYTES, bytes.to_string()));
        }
        env
    }

    /// Read limits from the worker's environment, keeping defaults for
    /// anything unset or unparsable
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok(), &WorkerLimits::default())
    }

    pub(crate) fn from_env_with(lookup: impl Fn(&str) -> Option<String>, base: &WorkerLimits) -> Self {
        let mut limits = base.clone();
        if let Some(ms) = lookup(ENV_WORKER_TIMEOUT_MS).and_then(|v| v.parse().ok()) {
            limits.timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup(ENV_WORKER_MAX_REQUEST_BYTES).and_then(|v| v.parse().ok()) {
            limits.max_request_bytes = v;
        }
        if let Some(v) = lookup(ENV_WORKER_MAX_CODE_BYTES).and_then(|v| v.parse().ok()) {
            limits.max_code_bytes = v;
        }
        if let Some(v) = lookup(ENV_WORKER_MAX_RESULT_BYTES).and_then(|v| v.parse().ok()) {
            limits.max_result_bytes = v;
        }
        if let Some(v) = lookup(ENV_WORKER_HEAP_LIMIT_BYTES).and_then(|v| v.parse().ok()) {
            limits.heap_limit_bytes = v;
        }
        if let Some(v) = lookup(ENV_WORKER_CPU_LIMIT_SECS).and_then(|v| v.parse().ok()) {
            limits.cpu_limit_secs = v;
        }
        if let Some(v) = lookup(ENV_WORKER_MEMORY_LIMIT_BYTES).and_then(|v| v.parse().ok()) {
            limits.memory_limit_bytes = Some(v);
        }
        limits
    }
}
