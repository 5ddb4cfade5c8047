//! Interpreter plumbing shared by the expression evaluator and the sandbox
//! worker: fresh locked-down runtimes and the deadline watchdog.

mod context;
mod watchdog;

pub use context::{run_script, ScriptLimits};
pub use watchdog::Watchdog;

use rquickjs::CaughtError;

use crate::error::Error;

/// Map an interpreter exception to a runtime fault
pub(crate) fn js_fault(err: CaughtError<'_>) -> Error {
    Error::RuntimeFault(err.to_string())
}
