use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::unistd::Pid;

use retrace_tracer::backend::{SymbolTable, TraceBackend};
use retrace_tracer::{Command, Event, ProcessId};

use super::breakpoint::BreakpointManager;
use crate::sys;
use crate::sys::mem::TraceeMemory;
use crate::sys::wait::Stop;

/// Number of polls yielding to the runtime before sleeping between polls.
const YIELD_POLLS: u32 = 16;

const POLL_DELAY: Duration = Duration::from_millis(1);

/// Tracing backend controlling processes with `ptrace`.
#[derive(Debug, Default)]
pub struct Backend {
    processes: HashMap<ProcessId, ProcessState>,
}

#[derive(Debug, Default)]
struct ProcessState {
    breakpoints: BreakpointManager,

    /// Whether the process is between a syscall-enter and a syscall-exit
    /// stop.
    in_syscall: bool,

    /// Address of the breakpoint being stepped over.
    stepping: Option<u64>,
}

impl Backend {
    /// Creates a new backend, tracing no process.
    pub fn new() -> Self {
        Self::default()
    }

    fn process_mut(&mut self, pid: ProcessId) -> crate::Result<&mut ProcessState> {
        self.processes
            .get_mut(&pid)
            .ok_or(crate::Error::UntrackedProcess(pid))
    }

    fn translate(&mut self, stop: Stop) -> crate::Result<Event> {
        let event = match stop {
            Stop::Syscall(pid) => {
                let number = sys::regs::syscall_number(as_pid(pid))?;

                let state = self.processes.entry(pid).or_default();
                state.in_syscall = !state.in_syscall;

                if state.in_syscall {
                    Event::Syscall { pid, number }
                } else {
                    Event::Sysret { pid, number }
                }
            }
            Stop::Trap(pid) => {
                let pc = sys::regs::get_registers(as_pid(pid))?.rip;

                Event::Breakpoint {
                    pid,
                    addr: pc.wrapping_sub(1),
                }
            }
            Stop::Signal(pid, signal) => Event::Signal { pid, signal },
            Stop::GroupStop(pid) => {
                tracing::debug!(pid, "group-stop");

                self.resume(pid)?;
                Event::None
            }
            Stop::Exited(pid, code) => {
                self.processes.remove(&pid);
                Event::Exit { pid, code }
            }
            Stop::Signaled(pid, signal) => {
                self.processes.remove(&pid);
                Event::ExitSignal { pid, signal }
            }
        };

        Ok(event)
    }

    fn restart(&mut self, pid: ProcessId, signal: Option<Signal>) -> crate::Result<()> {
        let stepping = self.processes.get(&pid).is_some_and(|s| s.stepping.is_some());

        let res = if stepping {
            ptrace::step(as_pid(pid), signal)
        } else {
            ptrace::syscall(as_pid(pid), signal)
        };

        tolerate_vanished(pid, res)
    }
}

impl TraceBackend for Backend {
    type Error = crate::Error;

    const QUIESCING_SIGNAL: i32 = sys::QUIESCING_SIGNAL;

    async fn wait_event(&mut self) -> crate::Result<Event> {
        let mut polls = 0u32;

        loop {
            if let Some(stop) = sys::wait::try_wait()? {
                return self.translate(stop);
            }

            if polls < YIELD_POLLS {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(POLL_DELAY).await;
            }

            polls = polls.saturating_add(1);
        }
    }

    fn attach(&mut self, pid: ProcessId) -> crate::Result<()> {
        sys::process::attach_tracee(pid)?;
        self.processes.insert(pid, ProcessState::default());

        Ok(())
    }

    fn launch(&mut self, command: &Command) -> crate::Result<ProcessId> {
        let pid = sys::process::spawn_tracee(command)?;
        self.processes.insert(pid, ProcessState::default());

        Ok(pid)
    }

    fn detach(&mut self, pid: ProcessId) -> crate::Result<()> {
        self.processes.remove(&pid);

        tolerate_vanished(pid, ptrace::detach(as_pid(pid), None))?;

        tracing::debug!(pid, "detached");

        Ok(())
    }

    fn send_signal(&mut self, pid: ProcessId, signal: i32) -> crate::Result<()> {
        sys::process::send_signal(pid, signal)?;

        Ok(())
    }

    fn resume(&mut self, pid: ProcessId) -> crate::Result<()> {
        self.restart(pid, None)
    }

    fn resume_after_signal(&mut self, pid: ProcessId, signal: i32) -> crate::Result<()> {
        if !self.processes.contains_key(&pid) {
            return Ok(());
        }

        let signal = Signal::try_from(signal).map_err(sys::Error::from)?;

        self.restart(pid, Some(signal))
    }

    fn resume_after_breakpoint(&mut self, pid: ProcessId, addr: u64) -> crate::Result<bool> {
        let mut mem = TraceeMemory::new(pid);
        let state = self.process_mut(pid)?;

        sys::regs::set_instruction_pointer(as_pid(pid), addr)?;

        if state.breakpoints.lift_for_step(&mut mem, addr)? {
            state.stepping = Some(addr);
            tolerate_vanished(pid, ptrace::step(as_pid(pid), None))?;

            Ok(true)
        } else {
            tolerate_vanished(pid, ptrace::syscall(as_pid(pid), None))?;

            Ok(false)
        }
    }

    fn finish_breakpoint_reinstall(&mut self, pid: ProcessId, addr: u64) -> crate::Result<()> {
        let mut mem = TraceeMemory::new(pid);
        let state = self.process_mut(pid)?;

        state.stepping = None;
        state.breakpoints.reinsert(&mut mem, addr)?;

        tolerate_vanished(pid, ptrace::syscall(as_pid(pid), None))
    }

    fn install_breakpoint(&mut self, pid: ProcessId, addr: u64) -> crate::Result<()> {
        let mut mem = TraceeMemory::new(pid);

        self.process_mut(pid)?
            .breakpoints
            .add_breakpoint_or_increment_usage(&mut mem, addr)?;

        Ok(())
    }

    fn remove_breakpoint(&mut self, pid: ProcessId, addr: u64) -> crate::Result<()> {
        let mut mem = TraceeMemory::new(pid);

        self.process_mut(pid)?
            .breakpoints
            .remove_breakpoint_or_decrement_usage(&mut mem, addr)?;

        Ok(())
    }

    fn reset_breakpoints(
        &mut self,
        pid: ProcessId,
        entry_addrs: impl IntoIterator<Item = u64>,
    ) -> crate::Result<()> {
        let state = self.process_mut(pid)?;

        state.breakpoints.reset(entry_addrs);
        state.stepping = None;

        Ok(())
    }

    fn disable_all_breakpoints(&mut self, pid: ProcessId) -> crate::Result<()> {
        let mut mem = TraceeMemory::new(pid);

        self.process_mut(pid)?.breakpoints.disable_all(&mut mem)?;

        Ok(())
    }

    fn enable_all_breakpoints(&mut self, pid: ProcessId) -> crate::Result<()> {
        let mut mem = TraceeMemory::new(pid);
        let breakpoints = &mut self.process_mut(pid)?.breakpoints;

        breakpoints.enable_all(&mut mem)?;

        tracing::debug!(pid, count = breakpoints.len(), "breakpoints enabled");

        Ok(())
    }

    fn stack_pointer(&mut self, pid: ProcessId) -> crate::Result<u64> {
        Ok(sys::regs::stack_pointer(as_pid(pid))?)
    }

    fn return_address(&mut self, pid: ProcessId, stack_pointer: u64) -> crate::Result<u64> {
        Ok(sys::mem::read_u64(as_pid(pid), stack_pointer)?)
    }

    fn syscall_return_value(&mut self, pid: ProcessId) -> crate::Result<i64> {
        Ok(sys::regs::syscall_return_value(as_pid(pid))?)
    }

    fn is_fork_syscall(&self, number: u64) -> bool {
        sys::syscall::is_fork(number)
    }

    fn is_exec_syscall(&self, number: u64) -> bool {
        sys::syscall::is_exec(number)
    }

    fn syscall_name(&self, number: u64) -> Cow<'static, str> {
        sys::syscall::name(number)
    }

    fn executable_path(&mut self, pid: ProcessId) -> crate::Result<PathBuf> {
        let link = PathBuf::from(format!("/proc/{pid}/exe"));

        std::fs::read_link(&link).map_err(|e| sys::Error::File(link, e).into())
    }

    fn symbol_table(&mut self, pid: ProcessId, path: &Path) -> crate::Result<SymbolTable> {
        Ok(sys::elf::symbol_table(pid, path)?)
    }
}

const fn as_pid(pid: ProcessId) -> Pid {
    Pid::from_raw(pid as i32)
}

/// A process may vanish (e.g., killed) between its stop and its restart.
fn tolerate_vanished(pid: ProcessId, res: nix::Result<()>) -> crate::Result<()> {
    match res {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            tracing::debug!(pid, "process vanished");
            Ok(())
        }
        Err(e) => Err(sys::Error::from(e).into()),
    }
}
