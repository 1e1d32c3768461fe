/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The process is not traced by this backend.
    #[error("process {0} is not traced")]
    UntrackedProcess(u64),

    /// Internal backend error.
    #[error(transparent)]
    BackendInternal(#[from] crate::sys::Error),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
