//! In-process expression evaluation
//!
//! One validated expression, one fresh interpreter, one deadline. The
//! interpreter never outlives the call and is interrupted in place when the
//! deadline elapses.

use std::fmt;

use rquickjs::convert::Coerced;
use rquickjs::{CatchResultExt, Ctx, Type, Value};
use tracing::debug;

use super::validator::{is_identifier, validate};
use super::Bindings;
use crate::config::EvaluatorConfig;
use crate::error::{Error, Result};
use crate::runtime::{js_fault, run_script, ScriptLimits};

/// Primitive produced by an expression
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Decimal text of a BigInt
    BigInt(String),
}

impl fmt::Display for ExprValue {
    /// Template text for the value: `null` is empty, integral numbers have
    /// no fractional part, other numbers use the shortest round-trip form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Null => Ok(()),
            ExprValue::Bool(b) => write!(f, "{}", b),
            ExprValue::Number(n) => f.write_str(&format_number(*n)),
            ExprValue::String(s) | ExprValue::BigInt(s) => f.write_str(s),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        // Also covers -0
        "0".to_string()
    } else {
        // f64's Display never uses an exponent and drops a zero fraction
        n.to_string()
    }
}

impl From<ExprValue> for serde_json::Value {
    fn from(value: ExprValue) -> Self {
        match value {
            ExprValue::Null => serde_json::Value::Null,
            ExprValue::Bool(b) => serde_json::Value::Bool(b),
            ExprValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                serde_json::Value::from(n as i64)
            }
            ExprValue::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ExprValue::String(s) | ExprValue::BigInt(s) => serde_json::Value::String(s),
        }
    }
}

/// Evaluates template expressions against per-call bindings
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    /// Create an evaluator with the given limits
    pub fn new(config: EvaluatorConfig) -> Self {
        Evaluator { config }
    }

    /// Get the evaluator limits
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate `expr` with `bindings` visible as top-level names
    pub fn evaluate(&self, expr: &str, bindings: &Bindings) -> Result<ExprValue> {
        let expr = validate(expr)?;
        if let Some(name) = bindings.keys().find(|name| !is_identifier(name)) {
            return Err(Error::InvalidIdentifier(name.clone()));
        }

        let source = format!("\"use strict\"; ({})", expr);
        let limits = ScriptLimits {
            deadline: self.config.timeout,
            memory_limit_bytes: self.config.memory_limit_bytes,
        };
        let result = run_script(&limits, |ctx| {
            install_bindings(&ctx, bindings)?;
            let value = ctx
                .eval::<Value, _>(source.as_str())
                .catch(&ctx)
                .map_err(js_fault)?;
            export_primitive(value)
        });

        if let Err(e) = &result {
            debug!("expression {:?} failed: {}", expr, e);
        }
        result
    }
}

/// Evaluate with default limits
pub fn evaluate(expr: &str, bindings: &Bindings) -> Result<ExprValue> {
    Evaluator::default().evaluate(expr, bindings)
}

fn install_bindings(ctx: &Ctx<'_>, bindings: &Bindings) -> Result<()> {
    let globals = ctx.globals();
    for (name, value) in bindings {
        let value = ctx
            .json_parse(serde_json::to_string(value)?)
            .catch(ctx)
            .map_err(js_fault)?;
        globals
            .set(name.as_str(), value)
            .catch(ctx)
            .map_err(js_fault)?;
    }
    Ok(())
}

fn export_primitive(value: Value<'_>) -> Result<ExprValue> {
    let text = |e: rquickjs::Error| Error::RuntimeFault(e.to_string());
    match value.type_of() {
        Type::Undefined => Err(Error::NoValue),
        Type::Null => Ok(ExprValue::Null),
        Type::Bool => Ok(ExprValue::Bool(value.as_bool().unwrap_or_default())),
        Type::Int | Type::Float => Ok(ExprValue::Number(value.as_number().unwrap_or(f64::NAN))),
        Type::String => value.get::<String>().map(ExprValue::String).map_err(text),
        Type::BigInt => value
            .get::<Coerced<String>>()
            .map(|digits| ExprValue::BigInt(digits.0))
            .map_err(text),
        Type::Symbol => primitive_expected("a symbol"),
        _ => primitive_expected("an object"),
    }
}

fn primitive_expected(what: &str) -> Result<ExprValue> {
    Err(Error::RuntimeFault(format!(
        "expression produced {}, expected a primitive",
        what
    )))
}
