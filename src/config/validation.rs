//! Configuration validation
//!
//! Validates configuration and reports issues.

use std::time::Duration;

use super::types::sandbox::SandboxConfig;
use super::types::Config;
use crate::error::{Error, Result};

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }

    /// Turn collected errors into a single [`Error::Config`]
    pub fn ensure_valid(&self) -> Result<()> {
        if self.valid {
            return Ok(());
        }
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect();
        Err(Error::Config(messages.join("; ")))
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    if config.evaluator.timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "evaluator.timeout",
            "Expression timeout must be greater than zero",
        ));
    } else if config.evaluator.timeout > Duration::from_secs(1) {
        result = result.with_warning(
            ValidationIssue::new(
                "evaluator.timeout",
                "Expression timeout above 1s; expressions run on the caller's thread budget",
            )
            .with_suggestion("Keep it in the tens of milliseconds"),
        );
    }

    if config.evaluator.memory_limit_bytes == 0 {
        result = result.with_error(ValidationIssue::new(
            "evaluator.memory_limit_bytes",
            "Interpreter heap limit must be greater than zero",
        ));
    }

    validate_sandbox_config(&config.sandbox, result)
}

/// Validate the sandbox section on its own
pub fn validate_sandbox_config(
    sandbox: &SandboxConfig,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    let worker = &sandbox.worker;

    if worker.timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "sandbox.worker.timeout",
            "Worker timeout must be greater than zero",
        ));
    }

    // An internal timeout must be reportable before the worker gets killed
    if sandbox.timeout <= worker.timeout {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.timeout",
                format!(
                    "Supervisor timeout ({:?}) must exceed the worker timeout ({:?})",
                    sandbox.timeout, worker.timeout
                ),
            )
            .with_suggestion("Leave at least a few tens of milliseconds between them"),
        );
    }

    let caps = [
        ("sandbox.max_stdout_bytes", sandbox.max_stdout_bytes),
        ("sandbox.max_stderr_bytes", sandbox.max_stderr_bytes),
        ("sandbox.worker.max_request_bytes", worker.max_request_bytes),
        ("sandbox.worker.max_code_bytes", worker.max_code_bytes),
        ("sandbox.worker.max_result_bytes", worker.max_result_bytes),
        ("sandbox.worker.heap_limit_bytes", worker.heap_limit_bytes),
    ];
    for (path, value) in caps {
        if value == 0 {
            result = result.with_error(ValidationIssue::new(path, "Byte cap must be greater than zero"));
        }
    }

    if sandbox.max_stdout_bytes < worker.max_result_bytes {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.max_stdout_bytes",
                "Stdout cap is smaller than the worker result cap",
            )
            .with_suggestion("Allow the result cap plus a few KiB for the response envelope"),
        );
    }

    if worker.max_code_bytes > worker.max_request_bytes {
        result = result.with_error(ValidationIssue::new(
            "sandbox.worker.max_code_bytes",
            "Code cap exceeds the request cap that contains it",
        ));
    }

    if worker.cpu_limit_secs == 0 {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.worker.cpu_limit_secs",
            "CPU limit of 0 disables the RLIMIT_CPU ceiling",
        ));
    }

    result
}
