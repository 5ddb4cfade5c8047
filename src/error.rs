//! Error types for jsfence

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::Rejection;

/// Result type alias using jsfence's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for jsfence
#[derive(Error, Debug)]
pub enum Error {
    /// Expression failed the allow-list before reaching an interpreter
    #[error("Rejected expression: {0}")]
    Rejected(#[from] Rejection),

    /// Binding name is not a plain identifier
    #[error("Invalid binding name: {0:?}")]
    InvalidIdentifier(String),

    /// Deadline elapsed (inside the worker or at the supervisor)
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Interpreter raised while running the script
    #[error("Script error: {0}")]
    RuntimeFault(String),

    /// Script returned `undefined`
    #[error("Script produced no value")]
    NoValue,

    /// Returned value has no JSON representation
    #[error("Result is not JSON: {0}")]
    ResultNotJson(String),

    /// Serialized result is over the result cap
    #[error("Result too large: {size} bytes exceeds limit of {limit}")]
    ResultTooLarge { size: usize, limit: usize },

    /// Request (or its code) is over the request cap
    #[error("Request too large: exceeds limit of {limit} bytes")]
    RequestTooLarge { limit: usize },

    /// Worker wrote more than the supervisor accepts
    #[error("Sandbox output exceeded limit ({limit} bytes)")]
    OutputTooLarge { limit: usize },

    /// Worker exited abnormally or could not be driven
    #[error("Sandbox worker failed: {0}")]
    ProcessFailure(String),

    /// Worker response was missing or malformed
    #[error("Sandbox protocol error: {0}")]
    Protocol(String),

    /// Worker reported success without a result
    #[error("Sandbox returned empty result")]
    EmptyResult,

    /// Failure reported by the worker in its structured response
    #[error("{message}")]
    Worker { kind: ErrorKind, message: String },

    /// A template placeholder failed to evaluate
    #[error("eval {expr:?}: {source}")]
    Template {
        expr: String,
        #[source]
        source: Box<Error>,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classes shared by the evaluator, the worker and the supervisor.
///
/// This is also what the worker puts in the `kind` field of a failed
/// response, so the class survives the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Timeout,
    RuntimeFault,
    NoValue,
    ResultNotJson,
    ResultTooLarge,
    RequestTooLarge,
    OutputTooLarge,
    ProcessFailure,
    Protocol,
    EmptyResult,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RuntimeFault => "runtime_fault",
            ErrorKind::NoValue => "no_value",
            ErrorKind::ResultNotJson => "result_not_json",
            ErrorKind::ResultTooLarge => "result_too_large",
            ErrorKind::RequestTooLarge => "request_too_large",
            ErrorKind::OutputTooLarge => "output_too_large",
            ErrorKind::ProcessFailure => "process_failure",
            ErrorKind::Protocol => "protocol",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Rejected(_) | Error::InvalidIdentifier(_) | Error::InvalidInput(_) => {
                ErrorKind::Validation
            }
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::RuntimeFault(_) => ErrorKind::RuntimeFault,
            Error::NoValue => ErrorKind::NoValue,
            Error::ResultNotJson(_) => ErrorKind::ResultNotJson,
            Error::ResultTooLarge { .. } => ErrorKind::ResultTooLarge,
            Error::RequestTooLarge { .. } => ErrorKind::RequestTooLarge,
            Error::OutputTooLarge { .. } => ErrorKind::OutputTooLarge,
            Error::ProcessFailure(_) | Error::Io(_) => ErrorKind::ProcessFailure,
            Error::Protocol(_) | Error::Json(_) => ErrorKind::Protocol,
            Error::EmptyResult => ErrorKind::EmptyResult,
            Error::Worker { kind, .. } => *kind,
            Error::Template { source, .. } => source.kind(),
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Check if a deadline (internal or external) caused the failure
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}
