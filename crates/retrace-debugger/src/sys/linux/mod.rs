mod error;
pub mod elf;
pub mod mem;
pub mod process;
pub mod regs;
pub mod syscall;
pub mod wait;

pub use self::error::{Error, Result};

/// Signal stopping a tracee before detaching from it.
pub const QUIESCING_SIGNAL: i32 = nix::libc::SIGSTOP;
