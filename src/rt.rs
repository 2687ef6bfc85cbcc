//! Real-time scheduling controls: SCHED_FIFO elevation, CPU pinning,
//! memory locking.
//!
//! Advisory stabilizers for the software PWM timing loops. None of these
//! carry a correctness obligation — a refused privilege degrades jitter,
//! never function.

use crate::error::{Error, Result};
use nix::sched::{CpuSet, sched_setaffinity};
use nix::sys::mman::{MlockAllFlags, mlockall};
use nix::unistd::{Pid, SysconfVar, sysconf};
use tracing::{info, warn};

/// Number of online logical CPU cores.
pub fn cpu_count() -> Result<usize> {
    match sysconf(SysconfVar::_NPROCESSORS_ONLN)? {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(nix::Error::EINVAL.into()),
    }
}

/// Switch the calling process to SCHED_FIFO at the maximum allowed priority.
///
/// Normal tasks can no longer preempt the process; only interrupts and
/// higher-priority RT tasks can. Fails with [`Error::PermissionDenied`]
/// without CAP_SYS_NICE / root.
pub fn set_realtime_priority() -> Result<()> {
    // No safe nix wrapper for sched_setscheduler; raw libc as in the rest of
    // the RT setup path.
    let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    if max == -1 {
        return Err(std::io::Error::last_os_error().into());
    }

    let param = libc::sched_param {
        sched_priority: max,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            return Err(Error::PermissionDenied {
                what: "SCHED_FIFO scheduling",
            });
        }
        return Err(err.into());
    }

    info!(priority = max, "SCHED_FIFO scheduling enabled");
    Ok(())
}

/// Pin the calling thread to one CPU core.
///
/// Eliminates migration jitter; pairs well with an `isolcpus=` kernel
/// command line. Fails with [`Error::InvalidCore`] when `core` is beyond
/// the last online core. Idempotent.
pub fn pin_to_core(core: usize) -> Result<()> {
    let count = cpu_count()?;
    if core >= count {
        return Err(Error::InvalidCore {
            core,
            max: count - 1,
        });
    }

    let mut cpuset = CpuSet::new();
    cpuset.set(core)?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)?;

    info!(core, "thread pinned to CPU core");
    Ok(())
}

/// Lock all current and future pages into RAM, removing page-fault stalls
/// from the timing loops.
pub fn lock_memory() -> Result<()> {
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE).map_err(|e| match e {
        nix::Error::EPERM | nix::Error::ENOMEM => Error::PermissionDenied { what: "mlockall" },
        other => other.into(),
    })
}

/// Best-effort jitter setup: lock memory, pin to `core`, elevate to
/// SCHED_FIFO.
///
/// Privilege refusals are logged and swallowed — the PWM engine must run
/// either way. An invalid core id is a caller error and still propagates.
pub fn stabilize(core: usize) -> Result<()> {
    if let Err(e) = lock_memory() {
        warn!(error = %e, "mlockall unavailable, continuing without");
    }
    pin_to_core(core)?;
    if let Err(e) = set_realtime_priority() {
        warn!(error = %e, "RT priority unavailable, continuing at normal priority");
    }
    Ok(())
}
