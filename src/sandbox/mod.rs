//! Out-of-process transform sandbox
//!
//! - protocol.rs: request/response documents exchanged over stdio
//! - supervisor.rs: spawns a worker per transform and enforces the outer limits
//! - worker.rs: runs one transform inside the worker process
//! - rlimit.rs: OS resource ceilings applied by the worker to itself
//! - executor.rs: the [`ScriptExecutor`] seam over in-process and process isolation

mod executor;
mod protocol;
mod rlimit;
mod supervisor;
pub mod worker;

pub use executor::{
    create_executor, ExecutorMeta, InlineExecutor, Isolation, ScriptExecutor, ScriptKind,
    ScriptRequest,
};
pub use protocol::{RequestKind, TransformRequest, TransformResponse, SANDBOX_MARKER};
pub use rlimit::apply_resource_limits;
pub use supervisor::Supervisor;

/// Whether the process was started as a sandbox worker
pub fn is_worker_invocation<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    args.into_iter()
        .nth(1)
        .is_some_and(|arg| arg.as_ref() == SANDBOX_MARKER)
}
