use std::fmt;
use std::future::{self, Future};

use crate::ProcessId;

/// Kind of a traced call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Call of a function resolved from the symbol table.
    Function,

    /// System call.
    Syscall,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => f.write_str("function"),
            Self::Syscall => f.write_str("syscall"),
        }
    }
}

/// Noteworthy occurrence which is not a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A signal was delivered to the process.
    Signal(i32),

    /// The process exited.
    Exited(i32),

    /// The process was killed by a signal.
    Killed(i32),

    /// The process trapped at an address matching neither a call frame nor a
    /// symbol.
    UnknownBreakpoint(u64),

    /// A call could not be tracked because the call stack is full.
    CallNestingTooDeep {
        /// Name of the untracked call.
        name: String,
    },
}

/// Trait for implementing a trace event handler (observation sink).
///
/// This is where formatting and output happen: the tracer only reports
/// structured observations.
pub trait EventHandler {
    /// Error returned by this event handler.
    type Error: std::error::Error;

    /// Function called when a traced process enters a call.
    fn call_entered(
        &mut self,
        _kind: CallKind,
        _pid: ProcessId,
        _name: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> {
        future::ready(Ok(()))
    }

    /// Function called when a traced process returns from a call.
    fn call_returned(
        &mut self,
        _kind: CallKind,
        _pid: ProcessId,
        _name: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> {
        future::ready(Ok(()))
    }

    /// Function called for anything worth reporting which is not a call.
    ///
    /// `pid` is `None` when the notice is not tied to a process.
    fn notice(
        &mut self,
        _pid: Option<ProcessId>,
        _notice: Notice,
    ) -> impl Future<Output = Result<(), Self::Error>> {
        future::ready(Ok(()))
    }
}
