mod symbol;

use std::borrow::Cow;
use std::future::Future;
use std::path::{Path, PathBuf};

pub use self::symbol::{Symbol, SymbolKind, SymbolTable};
use crate::{Command, Event, ProcessId};

/// Trait implementing the low-level process control used by the tracer.
///
/// Breakpoints are tracked per process and **reference counted** by address:
/// installing a breakpoint twice at the same address requires removing it
/// twice before the original instruction is restored.
pub trait TraceBackend {
    /// Error returned by this trait.
    type Error: std::error::Error;

    /// Signal used to bring a tracee to a known-stopped state before
    /// detaching from it.
    const QUIESCING_SIGNAL: i32;

    /// Returns the next event from any traced process.
    ///
    /// # Note
    ///
    /// The returned future must be cancel-safe: dropping it before completion
    /// must not lose any event.
    fn wait_event(&mut self) -> impl Future<Output = Result<Event, Self::Error>>;

    /// Attaches to a running process.
    ///
    /// On success, the process is stopped and ready to be instrumented.
    fn attach(&mut self, pid: ProcessId) -> Result<(), Self::Error>;

    /// Launches a new process and attaches to it.
    ///
    /// On success, the process is stopped right after its image was loaded.
    fn launch(&mut self, command: &Command) -> Result<ProcessId, Self::Error>;

    /// Stops tracing the given process.
    fn detach(&mut self, pid: ProcessId) -> Result<(), Self::Error>;

    /// Sends a signal to the given process.
    fn send_signal(&mut self, pid: ProcessId, signal: i32) -> Result<(), Self::Error>;

    /// Resumes a stopped process.
    fn resume(&mut self, pid: ProcessId) -> Result<(), Self::Error>;

    /// Resumes a process stopped by a signal, delivering that signal.
    ///
    /// This is a no-op for a process that is no longer traced.
    fn resume_after_signal(&mut self, pid: ProcessId, signal: i32) -> Result<(), Self::Error>;

    /// Resumes a process stopped by the breakpoint at `addr`.
    ///
    /// The original instruction is executed in place of the trap. If the
    /// breakpoint is still installed afterwards, the process is single-stepped
    /// and `true` is returned: the next [Breakpoint](Event::Breakpoint) event of
    /// the process must then be completed with
    /// [finish_breakpoint_reinstall](Self::finish_breakpoint_reinstall).
    fn resume_after_breakpoint(&mut self, pid: ProcessId, addr: u64) -> Result<bool, Self::Error>;

    /// Reinserts the breakpoint at `addr` after a single-step over its
    /// original instruction, and resumes the process.
    fn finish_breakpoint_reinstall(&mut self, pid: ProcessId, addr: u64)
    -> Result<(), Self::Error>;

    /// Installs a breakpoint at `addr`, or increments its usage.
    fn install_breakpoint(&mut self, pid: ProcessId, addr: u64) -> Result<(), Self::Error>;

    /// Decrements the usage of the breakpoint at `addr`, removing it when no
    /// longer used.
    fn remove_breakpoint(&mut self, pid: ProcessId, addr: u64) -> Result<(), Self::Error>;

    /// Forgets every breakpoint of the process and registers the given entry
    /// breakpoints (disabled).
    ///
    /// The process's memory is left untouched, since it is assumed to be
    /// either fresh or replaced.
    fn reset_breakpoints(
        &mut self,
        pid: ProcessId,
        entry_addrs: impl IntoIterator<Item = u64>,
    ) -> Result<(), Self::Error>;

    /// Removes every trap instruction from the process's memory, keeping the
    /// breakpoints registered.
    fn disable_all_breakpoints(&mut self, pid: ProcessId) -> Result<(), Self::Error>;

    /// Writes back every registered trap instruction.
    fn enable_all_breakpoints(&mut self, pid: ProcessId) -> Result<(), Self::Error>;

    /// Reads the stack pointer of a stopped process.
    fn stack_pointer(&mut self, pid: ProcessId) -> Result<u64, Self::Error>;

    /// Reads the return address of the function just entered, given the
    /// stack pointer at its entry.
    fn return_address(&mut self, pid: ProcessId, stack_pointer: u64) -> Result<u64, Self::Error>;

    /// Reads the return value of the system call the process returned from.
    fn syscall_return_value(&mut self, pid: ProcessId) -> Result<i64, Self::Error>;

    /// Returns whether the system call creates a new process.
    fn is_fork_syscall(&self, number: u64) -> bool;

    /// Returns whether the system call replaces the process image.
    fn is_exec_syscall(&self, number: u64) -> bool;

    /// Returns a printable name for the system call.
    fn syscall_name(&self, number: u64) -> Cow<'static, str>;

    /// Resolves the path of the executable currently run by the process.
    fn executable_path(&mut self, pid: ProcessId) -> Result<PathBuf, Self::Error>;

    /// Builds the table of traceable symbols of the executable at `path`, as
    /// mapped in the given process.
    fn symbol_table(&mut self, pid: ProcessId, path: &Path) -> Result<SymbolTable, Self::Error>;
}
