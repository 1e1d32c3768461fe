use crate::ProcessId;

/// Tracing backend error.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct BackendError<E>(pub E);

/// Event handler error.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct HandlerError<E>(pub E);

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error<E1, E2> {
    /// A tracing backend error occurred.
    #[error(transparent)]
    Backend(#[from] BackendError<E1>),

    /// An event handler error occurred.
    #[error(transparent)]
    Handler(#[from] HandlerError<E2>),

    /// The process is already tracked.
    #[error("Process {0} is already traced")]
    AlreadyTraced(ProcessId),

    /// Nothing to trace.
    #[error("No process to trace")]
    NothingToTrace,
}

/// Result type of this crate.
pub type Result<T, E1, E2> = core::result::Result<T, Error<E1, E2>>;
