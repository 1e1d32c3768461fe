use crate::ProcessId;

/// Raw process-control notification reported by a [tracing backend](crate::backend::TraceBackend).
///
/// Every event, except [None](Event::None), originates from a single traced
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Nothing reportable happened (e.g., a stop the backend consumed
    /// internally).
    None,

    /// The process stopped on a signal about to be delivered.
    Signal {
        /// ID of the process.
        pid: ProcessId,
        /// Signal number.
        signal: i32,
    },

    /// The process exited.
    Exit {
        /// ID of the process.
        pid: ProcessId,
        /// Exit status.
        code: i32,
    },

    /// The process was terminated by a signal.
    ExitSignal {
        /// ID of the process.
        pid: ProcessId,
        /// Signal number.
        signal: i32,
    },

    /// The process entered a system call.
    Syscall {
        /// ID of the process.
        pid: ProcessId,
        /// System call number.
        number: u64,
    },

    /// The process returned from a system call.
    Sysret {
        /// ID of the process.
        pid: ProcessId,
        /// System call number.
        number: u64,
    },

    /// The process hit a breakpoint (or otherwise trapped) at `addr`.
    Breakpoint {
        /// ID of the process.
        pid: ProcessId,
        /// Address of the trap instruction.
        addr: u64,
    },
}

impl Event {
    /// Returns the ID of the originating process, if any.
    pub const fn pid(&self) -> Option<ProcessId> {
        match *self {
            Self::None => None,
            Self::Signal { pid, .. }
            | Self::Exit { pid, .. }
            | Self::ExitSignal { pid, .. }
            | Self::Syscall { pid, .. }
            | Self::Sysret { pid, .. }
            | Self::Breakpoint { pid, .. } => Some(pid),
        }
    }

    /// Short name of the event kind.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Signal { .. } => "signal",
            Self::Exit { .. } => "exit",
            Self::ExitSignal { .. } => "exit-signal",
            Self::Syscall { .. } => "syscall",
            Self::Sysret { .. } => "sysret",
            Self::Breakpoint { .. } => "breakpoint",
        }
    }
}
