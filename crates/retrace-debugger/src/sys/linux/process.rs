use std::io;
use std::os::unix::process::CommandExt;

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// Spawns a new traced process.
///
/// On success, the process is stopped right after `exec`.
pub fn spawn_tracee(command: &retrace_tracer::Command) -> crate::sys::Result<u64> {
    let mut cmd = std::process::Command::new(&command.program);
    cmd.args(&command.args);

    // On Linux, if a `pre_exec` closure is specified, `rust-std` will
    // spawn the process with `fork`+`exec`, otherwise `posix_spawn` is used.
    unsafe {
        cmd.pre_exec(|| ptrace::traceme().map_err(|e| io::Error::from_raw_os_error(e as i32)))
    };

    // the child is reaped by `waitpid`, so its handle is dropped right away
    let child = cmd.spawn().map_err(crate::sys::Error::ChildExec)?;
    let pid = Pid::from_raw(child.id() as i32);

    wait_for_stop(pid, Signal::SIGTRAP)?;

    tracing::debug!(pid = pid.as_raw(), program = %command.program.display(), "spawned tracee");

    Ok(pid.as_raw() as u64)
}

/// Attaches to a running process.
///
/// On success, the process is stopped.
pub fn attach_tracee(pid: u64) -> crate::sys::Result<()> {
    let pid = Pid::from_raw(pid as i32);

    ptrace::attach(pid).inspect_err(|e| tracing::error!(error = %e, "ptrace(PTRACE_ATTACH)"))?;

    wait_for_stop(pid, Signal::SIGSTOP)?;

    tracing::debug!(pid = pid.as_raw(), "attached tracee");

    Ok(())
}

/// Waits for the tracee to stop with `signal`, then sets the tracing
/// options.
fn wait_for_stop(pid: Pid, signal: Signal) -> crate::sys::Result<()> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::__WALL)) {
            Ok(WaitStatus::Stopped(_, sig)) if sig == signal => break,
            // other signals are delivered before the expected stop
            Ok(WaitStatus::Stopped(_, sig)) => ptrace::cont(pid, sig)?,
            Ok(status) => return Err(crate::sys::Error::BadWaitStatus(status)),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    ptrace::setoptions(pid, ptrace::Options::PTRACE_O_TRACESYSGOOD)?;

    Ok(())
}

/// Sends a signal to the given process.
pub fn send_signal(pid: u64, signal: i32) -> crate::sys::Result<()> {
    let signal = Signal::try_from(signal)?;
    kill(Pid::from_raw(pid as i32), signal)?;

    Ok(())
}
