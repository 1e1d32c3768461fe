use nix::sys::wait::WaitStatus;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// File open/read error.
    #[error("{0}: {1}")]
    File(std::path::PathBuf, std::io::Error),

    #[error("bad tracee wait status: {0:?}")]
    BadWaitStatus(WaitStatus),

    #[error("os error: {0}")]
    Os(#[from] nix::Error),

    #[error(transparent)]
    Elf(#[from] goblin::error::Error),

    #[error("{0}: not mapped in process {1}")]
    MissingMapping(std::path::PathBuf, u64),

    #[error("memory read/write {0} bytes instead of {1}")]
    PartialMemOp(usize, usize),

    #[error("Tracee execution failed: {0}")]
    ChildExec(std::io::Error),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
