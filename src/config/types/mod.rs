//! Configuration types module

pub mod sandbox;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// In-process expression evaluator
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// Out-of-process transform sandbox
    #[serde(default)]
    pub sandbox: sandbox::SandboxConfig,
}

impl Config {
    /// Load configuration from the config file and environment variables
    ///
    /// Precedence, lowest first:
    /// 1. Default values
    /// 2. Config file (if present)
    /// 3. Environment variable overrides
    pub fn from_env() -> Result<Self> {
        crate::config::load_config()
    }

    /// Reject configurations that break the limit invariants
    pub fn validated(self) -> Result<Self> {
        crate::config::validate_config(&self).ensure_valid()?;
        Ok(self)
    }
}

/// Expression evaluator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Wall-clock budget for one expression
    #[serde(with = "humantime_serde", default = "default_eval_timeout")]
    pub timeout: Duration,
    /// Heap ceiling for the interpreter running one expression
    #[serde(default = "default_eval_memory")]
    pub memory_limit_bytes: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            timeout: default_eval_timeout(),
            memory_limit_bytes: default_eval_memory(),
        }
    }
}

fn default_eval_timeout() -> Duration {
    Duration::from_millis(50)
}

fn default_eval_memory() -> usize {
    16 * 1024 * 1024
}
