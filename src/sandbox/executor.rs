//! Common executor trait and types
//!
//! Expressions run in-process through the [`Evaluator`]; transforms only run
//! behind a [`Supervisor`] in a separate worker process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::supervisor::Supervisor;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::expr::{Bindings, Evaluator};

/// Where scripts execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// Inside the calling process, interrupted at its deadline
    InProcess,
    /// In a fresh worker process per script
    Process,
}

impl std::str::FromStr for Isolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "in-process" | "inline" => Ok(Isolation::InProcess),
            "process" | "sandbox" => Ok(Isolation::Process),
            _ => Err(Error::InvalidInput(format!(
                "Unknown isolation: {}. Supported: in-process, process",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Isolation::InProcess => write!(f, "in-process"),
            Isolation::Process => write!(f, "process"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Expression,
    Transform,
}

/// Script to execute
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptRequest {
    /// Template expression with its bindings
    Expression { expr: String, bindings: Bindings },
    /// One-argument function expression applied to `payload`
    Transform { code: String, payload: Value },
}

impl ScriptRequest {
    pub fn expression(expr: impl Into<String>, bindings: Bindings) -> Self {
        ScriptRequest::Expression {
            expr: expr.into(),
            bindings,
        }
    }

    pub fn transform(code: impl Into<String>, payload: Value) -> Self {
        ScriptRequest::Transform {
            code: code.into(),
            payload,
        }
    }

    pub fn kind(&self) -> ScriptKind {
        match self {
            ScriptRequest::Expression { .. } => ScriptKind::Expression,
            ScriptRequest::Transform { .. } => ScriptKind::Transform,
        }
    }
}

/// Metadata about an executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorMeta {
    /// Unique executor identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Where scripts run
    pub isolation: Isolation,
    /// Script kinds accepted by `execute`
    pub supported_kinds: Vec<ScriptKind>,
    /// Deadline applied to one script
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Trait for script execution backends
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Get executor metadata
    fn meta(&self) -> &ExecutorMeta;

    /// Get the executor ID
    fn id(&self) -> &str {
        &self.meta().id
    }

    /// Check if a script kind is supported
    fn supports(&self, kind: ScriptKind) -> bool {
        self.meta().supported_kinds.contains(&kind)
    }

    /// Execute a script and return its JSON value
    async fn execute(&self, request: ScriptRequest) -> Result<Value>;

    /// Run a trivial script end to end
    async fn health_check(&self) -> Result<bool>;
}

fn unsupported(meta: &ExecutorMeta, kind: ScriptKind) -> Error {
    Error::InvalidInput(format!(
        "{} executor does not run {:?} scripts",
        meta.id, kind
    ))
}

/// Evaluates expressions on a blocking thread of the caller's runtime
#[derive(Debug, Clone)]
pub struct InlineExecutor {
    evaluator: Evaluator,
    meta: ExecutorMeta,
}

impl InlineExecutor {
    pub fn new(evaluator: Evaluator) -> Self {
        let meta = ExecutorMeta {
            id: "inline".to_string(),
            name: "In-process expression evaluator".to_string(),
            isolation: Isolation::InProcess,
            supported_kinds: vec![ScriptKind::Expression],
            timeout: evaluator.config().timeout,
        };
        InlineExecutor { evaluator, meta }
    }
}

#[async_trait]
impl ScriptExecutor for InlineExecutor {
    fn meta(&self) -> &ExecutorMeta {
        &self.meta
    }

    async fn execute(&self, request: ScriptRequest) -> Result<Value> {
        let (expr, bindings) = match request {
            ScriptRequest::Expression { expr, bindings } => (expr, bindings),
            other => return Err(unsupported(&self.meta, other.kind())),
        };
        let evaluator = self.evaluator.clone();
        let value = tokio::task::spawn_blocking(move || evaluator.evaluate(&expr, &bindings))
            .await
            .map_err(|e| Error::RuntimeFault(format!("evaluation task failed: {}", e)))??;
        Ok(value.into())
    }

    async fn health_check(&self) -> Result<bool> {
        let value = self
            .execute(ScriptRequest::expression("1 + 1", Bindings::new()))
            .await?;
        Ok(value == Value::from(2))
    }
}

#[async_trait]
impl ScriptExecutor for Supervisor {
    fn meta(&self) -> &ExecutorMeta {
        self.executor_meta()
    }

    async fn execute(&self, request: ScriptRequest) -> Result<Value> {
        let (code, payload) = match request {
            ScriptRequest::Transform { code, payload } => (code, payload),
            other => return Err(unsupported(self.executor_meta(), other.kind())),
        };
        self.run_transform(&code, &payload).await
    }

    async fn health_check(&self) -> Result<bool> {
        let value = self.run_transform("(r) => r", &Value::Bool(true)).await?;
        Ok(value == Value::Bool(true))
    }
}

/// Create an executor for `isolation` from the loaded configuration
pub fn create_executor(config: &Config, isolation: Isolation) -> Result<Box<dyn ScriptExecutor>> {
    match isolation {
        Isolation::InProcess => {
            let executor = InlineExecutor::new(Evaluator::new(config.evaluator.clone()));
            Ok(Box::new(executor))
        }
        Isolation::Process => {
            let executor = Supervisor::new(config.sandbox.clone())?;
            Ok(Box::new(executor))
        }
    }
}
