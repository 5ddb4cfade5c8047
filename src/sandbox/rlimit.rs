//! OS resource ceilings for the worker process
//!
//! Best effort: the supervisor's wall-clock deadline is what actually bounds
//! a worker, so a refused ceiling is logged and ignored.

use tracing::{debug, warn};

use crate::config::WorkerLimits;

/// Apply CPU, core-dump and (optionally) address-space limits to the
/// current process. Returns the number of limits that could not be set.
#[cfg(unix)]
pub fn apply_resource_limits(limits: &WorkerLimits) -> usize {
    let mut ceilings = vec![(libc::RLIMIT_CORE, 0 as libc::rlim_t, "RLIMIT_CORE")];
    if limits.cpu_limit_secs > 0 {
        ceilings.push((
            libc::RLIMIT_CPU,
            limits.cpu_limit_secs as libc::rlim_t,
            "RLIMIT_CPU",
        ));
    }
    if let Some(bytes) = limits.memory_limit_bytes {
        ceilings.push((libc::RLIMIT_AS, bytes as libc::rlim_t, "RLIMIT_AS"));
    }

    let mut failed = 0;
    for (resource, value, name) in ceilings {
        let limit = libc::rlimit {
            rlim_cur: value,
            rlim_max: value,
        };
        let ret_code = unsafe { libc::setrlimit(resource, &limit) };
        if ret_code != 0 {
            let err = std::io::Error::last_os_error();
            warn!("setrlimit({}) failed: {}", name, err);
            failed += 1;
        } else {
            debug!("{} set to {}", name, value);
        }
    }
    failed
}

#[cfg(not(unix))]
pub fn apply_resource_limits(_limits: &WorkerLimits) -> usize {
    debug!("resource limits are not supported on this platform");
    0
}
