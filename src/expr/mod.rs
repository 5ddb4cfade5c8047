//! Constrained expression evaluation for templates
//!
//! - validator.rs: character allow-list and keyword blacklist
//! - evaluator.rs: one-shot evaluation in a fresh interpreter under a deadline

mod evaluator;
mod validator;

use std::collections::HashMap;

pub use evaluator::{evaluate, Evaluator, ExprValue};
pub use validator::{is_identifier, validate, Rejection, MAX_EXPRESSION_BYTES};

/// Named values visible to one evaluation
pub type Bindings = HashMap<String, serde_json::Value>;
