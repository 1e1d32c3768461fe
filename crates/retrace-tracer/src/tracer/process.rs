use std::path::PathBuf;
use std::sync::Arc;

use super::callstack::CallStack;
use crate::ProcessId;
use crate::backend::SymbolTable;

/// Activation state of the breakpoints of a traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointActivation {
    /// Trap instructions are removed from memory (e.g., around `fork`/`exec`).
    Disabled,

    /// Trap instructions are written in memory.
    Enabled,

    /// The process image was replaced: breakpoints must be enabled at the
    /// stop following `exec`, not before.
    PendingAfterExec,
}

/// Process traced by the [Tracer](super::Tracer).
#[derive(Debug)]
pub struct TrackedProcess {
    pub(crate) pid: ProcessId,

    /// Path of the executable currently run.
    pub(crate) exe_path: PathBuf,

    /// Symbols whose entry is trapped.
    pub(crate) symbols: Arc<SymbolTable>,

    pub(crate) activation: BreakpointActivation,

    /// Breakpoint being reinserted after a single-step over its original
    /// instruction.
    pub(crate) reinstalling: Option<u64>,

    pub(crate) callstack: CallStack,

    /// Last return address observed (either captured at function entry, or
    /// trapped on function return).
    pub(crate) return_addr: u64,

    /// Stack pointer captured at the last function entry.
    pub(crate) stack_pointer: u64,

    /// Whether the operator asked to trace this process by its ID.
    pub(crate) explicit: bool,
}

impl TrackedProcess {
    pub(crate) fn new(
        pid: ProcessId,
        exe_path: PathBuf,
        symbols: Arc<SymbolTable>,
        max_depth: usize,
        explicit: bool,
    ) -> Self {
        Self {
            pid,
            exe_path,
            symbols,
            activation: BreakpointActivation::Disabled,
            reinstalling: None,
            callstack: CallStack::new(max_depth),
            return_addr: 0,
            stack_pointer: 0,
            explicit,
        }
    }

    /// Returns the process ID.
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Returns the path of the executable currently run by the process.
    pub fn exe_path(&self) -> &std::path::Path {
        &self.exe_path
    }

    /// Returns the symbol table of the current process image.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Returns the activation state of the process's breakpoints.
    pub const fn activation(&self) -> BreakpointActivation {
        self.activation
    }

    /// Returns the address of the breakpoint being reinserted, if any.
    pub const fn reinstalling(&self) -> Option<u64> {
        self.reinstalling
    }

    /// Returns the call stack of the process.
    pub const fn callstack(&self) -> &CallStack {
        &self.callstack
    }

    /// Returns the last return address observed.
    pub const fn return_addr(&self) -> u64 {
        self.return_addr
    }

    /// Returns the stack pointer captured at the last function entry.
    pub const fn stack_pointer(&self) -> u64 {
        self.stack_pointer
    }

    /// Returns whether the operator asked to trace this process by its ID.
    pub const fn is_explicit(&self) -> bool {
        self.explicit
    }
}
