use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// Stop or termination of a tracee, as reported by `waitpid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// Syscall-stop (entry or exit).
    Syscall(u64),

    /// `SIGTRAP` stop, from a breakpoint or a single-step.
    Trap(u64),

    /// Signal-delivery-stop.
    Signal(u64, i32),

    /// Group-stop, where the signal is not delivered.
    GroupStop(u64),

    Exited(u64, i32),

    Signaled(u64, i32),
}

/// Polls the next status change of any tracee, without blocking.
pub fn try_wait() -> crate::sys::Result<Option<Stop>> {
    let status = match waitpid(None, Some(WaitPidFlag::__WALL | WaitPidFlag::WNOHANG)) {
        Ok(status) => status,
        Err(Errno::EINTR) => return Ok(None),
        Err(e) => {
            tracing::error!(error = %e, "waitpid");
            return Err(e.into());
        }
    };

    let raw = |pid: Pid| pid.as_raw() as u64;

    let stop = match status {
        WaitStatus::StillAlive => return Ok(None),
        WaitStatus::PtraceSyscall(pid) => Stop::Syscall(raw(pid)),
        WaitStatus::Stopped(pid, Signal::SIGTRAP) => Stop::Trap(raw(pid)),
        WaitStatus::Stopped(pid, sig) if is_group_stop(pid, sig) => Stop::GroupStop(raw(pid)),
        WaitStatus::Stopped(pid, sig) => Stop::Signal(raw(pid), sig as i32),
        WaitStatus::Exited(pid, code) => Stop::Exited(raw(pid), code),
        WaitStatus::Signaled(pid, sig, _) => Stop::Signaled(raw(pid), sig as i32),
        status => return Err(crate::sys::Error::BadWaitStatus(status)),
    };

    Ok(Some(stop))
}

/// A stopping signal without pending siginfo is a group-stop notification.
fn is_group_stop(pid: Pid, sig: Signal) -> bool {
    matches!(
        sig,
        Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU
    ) && matches!(ptrace::getsiginfo(pid), Err(Errno::EINVAL))
}
