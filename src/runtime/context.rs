//! Fresh interpreter instances
//!
//! Every evaluation and every transform gets its own QuickJS runtime with a
//! heap ceiling, a stack ceiling and an interrupt handler tied to a
//! [`Watchdog`]. Before anything untrusted is installed, the entry points
//! that turn text into code are removed: global `eval`, global `Function`,
//! and the `constructor` links that lead back to the function constructors
//! from any function value.

use std::sync::atomic::Ordering;
use std::time::Duration;

use rquickjs::{CatchResultExt, Context, Ctx, Runtime};
use tracing::debug;

use super::watchdog::Watchdog;
use crate::error::{Error, Result};

/// Interpreter stack ceiling; deep recursion becomes a RangeError
const MAX_STACK_BYTES: usize = 512 * 1024;

const LOCKDOWN: &str = r#"
(function () {
    "use strict";
    var samples = [function () {}, async function () {}, function* () {}, async function* () {}];
    for (var i = 0; i < samples.length; i++) {
        delete Object.getPrototypeOf(samples[i]).constructor;
    }
    delete globalThis.eval;
    delete globalThis.Function;
})();
"#;

/// Limits for one interpreter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    /// Wall-clock budget, counted from the start of [`run_script`]
    pub deadline: Duration,
    /// Heap ceiling for the interpreter
    pub memory_limit_bytes: usize,
}

/// Run `task` in a fresh, locked-down interpreter.
///
/// When the deadline elapses the interpreter is interrupted and the run
/// fails with [`Error::Timeout`], whatever error the interrupted script
/// produced. Exhausting the heap ceiling surfaces as a runtime fault.
pub fn run_script<T, F>(limits: &ScriptLimits, task: F) -> Result<T>
where
    F: for<'js> FnOnce(Ctx<'js>) -> Result<T>,
{
    let watchdog = Watchdog::start(limits.deadline)?;

    let runtime = Runtime::new().map_err(engine_fault)?;
    runtime.set_memory_limit(limits.memory_limit_bytes);
    runtime.set_max_stack_size(MAX_STACK_BYTES);
    let expired = watchdog.flag();
    runtime.set_interrupt_handler(Some(Box::new(move || expired.load(Ordering::SeqCst))));

    let result = Context::full(&runtime)
        .map_err(engine_fault)
        .and_then(|context| {
            context.with(|ctx| {
                lock_down(&ctx)?;
                task(ctx)
            })
        });

    let interrupted = watchdog.stop();
    match result {
        Err(e) if interrupted => {
            debug!("script interrupted at deadline: {}", e);
            Err(Error::Timeout(format!("script exceeded {:?}", limits.deadline)))
        }
        other => other,
    }
}

fn lock_down(ctx: &Ctx<'_>) -> Result<()> {
    ctx.eval::<(), _>(LOCKDOWN)
        .catch(ctx)
        .map_err(|e| Error::RuntimeFault(format!("failed to prepare interpreter: {}", e)))?;

    let globals = ctx.globals();
    for name in ["eval", "Function"] {
        let present = globals.contains_key(name).map_err(engine_fault)?;
        if present {
            return Err(Error::RuntimeFault(format!(
                "interpreter still exposes {}",
                name
            )));
        }
    }
    Ok(())
}

fn engine_fault(err: rquickjs::Error) -> Error {
    Error::RuntimeFault(format!("interpreter error: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::js_fault;
    use std::time::Instant;

    fn limits() -> ScriptLimits {
        ScriptLimits {
            deadline: Duration::from_secs(5),
            memory_limit_bytes: 16 * 1024 * 1024,
        }
    }

    fn eval_str(src: &str) -> String {
        let src = src.to_string();
        run_script(&limits(), |ctx| {
            ctx.eval::<String, _>(src.as_str()).catch(&ctx).map_err(js_fault)
        })
        .unwrap()
    }

    #[test]
    fn test_eval_and_function_removed() {
        assert_eq!(eval_str("typeof eval"), "undefined");
        assert_eq!(eval_str("typeof Function"), "undefined");
    }

    #[test]
    fn test_constructor_escape_closed() {
        // Without the lockdown this would be the Function constructor
        assert_eq!(eval_str("String((() => 1).constructor === Object)"), "true");
        assert_eq!(
            eval_str("typeof (async () => 1).constructor('return 1')"),
            "object"
        );
    }

    #[test]
    fn test_runs_do_not_share_globals() {
        assert_eq!(eval_str("globalThis.leak = 'set'"), "set");
        assert_eq!(eval_str("typeof leak"), "undefined");
    }

    #[test]
    fn test_error_passes_through() {
        let err = run_script::<(), _>(&limits(), |_| Err(Error::NoValue)).unwrap_err();
        assert!(matches!(err, Error::NoValue));
    }

    #[test]
    fn test_deadline_interrupts_running_script() {
        let limits = ScriptLimits {
            deadline: Duration::from_millis(100),
            ..limits()
        };
        let started = Instant::now();
        let err = run_script(&limits, |ctx| {
            ctx.eval::<(), _>("for (;;) {}").catch(&ctx).map_err(js_fault)
        })
        .unwrap_err();
        // The loop ran on this thread, so returning means it stopped
        assert!(err.is_timeout(), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_script_cannot_swallow_interrupt() {
        let limits = ScriptLimits {
            deadline: Duration::from_millis(100),
            ..limits()
        };
        let err = run_script(&limits, |ctx| {
            ctx.eval::<(), _>("for (;;) { try { for (;;) {} } catch (e) {} }")
                .catch(&ctx)
                .map_err(js_fault)
        })
        .unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    #[test]
    fn test_heap_ceiling_is_runtime_fault() {
        let limits = ScriptLimits {
            memory_limit_bytes: 4 * 1024 * 1024,
            ..limits()
        };
        let err = run_script(&limits, |ctx| {
            ctx.eval::<(), _>("var a = []; for (;;) { a.push('x'.repeat(1024) + a.length); }")
                .catch(&ctx)
                .map_err(js_fault)
        })
        .unwrap_err();
        assert!(matches!(err, Error::RuntimeFault(_)), "{err:?}");
    }
}
