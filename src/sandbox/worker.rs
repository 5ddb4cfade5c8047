//! Sandbox worker
//!
//! Entry point of a process started with [`SANDBOX_MARKER`]. It reads one
//! request from stdin, runs the transform in a fresh interpreter under its
//! own deadline and writes exactly one response to stdout, whatever
//! happens. The exit status carries no meaning.
//!
//! [`SANDBOX_MARKER`]: super::protocol::SANDBOX_MARKER

use std::io::{self, Read, Write};
use std::process::ExitCode;

use rquickjs::{CatchResultExt, Value as JsValue};
use serde_json::Value;
use tracing::{debug, warn};

use super::protocol::{RequestKind, TransformRequest, TransformResponse, FALLBACK_RESPONSE};
use super::rlimit::apply_resource_limits;
use crate::config::WorkerLimits;
use crate::error::{Error, Result};
use crate::runtime::{js_fault, run_script, ScriptLimits};

/// Run as a worker on the process's own stdio.
///
/// Limits come from the environment prepared by the supervisor. The exit
/// code is always success; the outcome is in the response.
pub fn run() -> ExitCode {
    let limits = WorkerLimits::from_env();
    let failed = apply_resource_limits(&limits);
    if failed > 0 {
        warn!("{} resource limit(s) not applied, relying on supervisor deadline", failed);
    }

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    if let Err(e) = serve(stdin, stdout, &limits) {
        warn!("failed to write sandbox response: {}", e);
    }
    ExitCode::SUCCESS
}

/// Read one request from `input` and write one response to `output`
pub fn serve<R: Read, W: Write>(input: R, mut output: W, limits: &WorkerLimits) -> io::Result<()> {
    let response = match handle(input, limits) {
        Ok(result) => TransformResponse::success(result),
        Err(e) => {
            debug!("transform failed: {}", e);
            TransformResponse::failure(&e)
        }
    };

    match serde_json::to_vec(&response) {
        Ok(bytes) => output.write_all(&bytes)?,
        Err(_) => output.write_all(FALLBACK_RESPONSE.as_bytes())?,
    }
    output.flush()
}

fn handle<R: Read>(input: R, limits: &WorkerLimits) -> Result<Value> {
    let mut raw = Vec::new();
    input
        .take(limits.max_request_bytes as u64 + 1)
        .read_to_end(&mut raw)?;
    if raw.len() > limits.max_request_bytes {
        return Err(Error::RequestTooLarge {
            limit: limits.max_request_bytes,
        });
    }

    let request: TransformRequest = serde_json::from_slice(&raw)
        .map_err(|e| Error::Protocol(format!("invalid request json: {}", e)))?;
    if request.kind != RequestKind::Transform {
        return Err(Error::InvalidInput("unsupported kind".to_string()));
    }
    if request.code.trim().is_empty() {
        return Err(Error::InvalidInput("missing code".to_string()));
    }
    if request.code.len() > limits.max_code_bytes {
        return Err(Error::RequestTooLarge {
            limit: limits.max_code_bytes,
        });
    }

    run_transform(&request.code, &request.payload, limits).map_err(|e| match e {
        Error::Timeout(_) => Error::Timeout(format!("transform exceeded {:?}", limits.timeout)),
        other => other,
    })
}

fn run_transform(code: &str, payload: &Value, limits: &WorkerLimits) -> Result<Value> {
    let script = ScriptLimits {
        deadline: limits.timeout,
        memory_limit_bytes: limits.heap_limit_bytes,
    };
    let source = format!("(\n{}\n)", code);
    let payload = serde_json::to_string(payload)?;

    let text = run_script(&script, |ctx| {
        let function = ctx
            .eval::<JsValue, _>(source.as_str())
            .catch(&ctx)
            .map_err(js_fault)?
            .into_function()
            .ok_or_else(|| Error::RuntimeFault("transform is not a function".to_string()))?;

        let argument = ctx
            .json_parse(payload.as_str())
            .catch(&ctx)
            .map_err(js_fault)?;
        let returned: JsValue = function.call((argument,)).catch(&ctx).map_err(js_fault)?;
        if returned.is_undefined() {
            return Err(Error::NoValue);
        }

        // The engine's own serializer; user code cannot replace it
        match ctx.json_stringify(returned).catch(&ctx) {
            Ok(Some(text)) => text
                .to_string()
                .map_err(|e| Error::ResultNotJson(e.to_string())),
            Ok(None) => Err(Error::ResultNotJson(
                "value has no JSON representation".to_string(),
            )),
            Err(e) => Err(Error::ResultNotJson(e.to_string())),
        }
    })?;

    if text.len() > limits.max_result_bytes {
        return Err(Error::ResultTooLarge {
            size: text.len(),
            limit: limits.max_result_bytes,
        });
    }
    serde_json::from_str(&text).map_err(|e| Error::ResultNotJson(e.to_string()))
}
