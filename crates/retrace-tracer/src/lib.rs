//! This crate allows to trace the library calls (and optionally the system
//! calls) of running or newly launched processes.
//!
//! Two main components are provided:
//! - A trait to implement a custom event handler, consuming the calls
//!   entered and returned by the traced processes, as well as noticeable
//!   occurrences (signals, exits).
//! - A trait to implement a custom tracing backend, responsible for
//!   controlling processes (e.g., breakpoints, registers, symbols).
//!
//! Between the two, the [Tracer](tracer::Tracer) keeps a call stack per
//! process, matches function returns against the captured return addresses,
//! follows `fork` and `exec`, and detaches from every process when asked to.
//!
//! # Consuming trace events
//!
//! ```no_run
//! use retrace_debugger::Backend;
//!
//! use retrace_tracer::ProcessId;
//! use retrace_tracer::handler::{CallKind, EventHandler};
//! use retrace_tracer::tracer::Tracer;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // initialize the tracer
//!     let mut tracer = Tracer::builder()
//!         .with_backend(Backend::default())
//!         .with_event_handler(CustomHandler)
//!         .trace_syscalls(true)
//!         .build();
//!
//!     // attach to a running process
//!     tracer.attach(1234).unwrap();
//!
//!     // trace until the process exits
//!     tracer.run().await.unwrap();
//! }
//!
//! struct CustomHandler;
//!
//! impl EventHandler for CustomHandler {
//!     type Error = std::io::Error;
//!
//!     async fn call_entered(
//!         &mut self,
//!         _kind: CallKind,
//!         _pid: ProcessId,
//!         _name: &str,
//!     ) -> Result<(), Self::Error> {
//!         //
//!         // do some action with the called function
//!         //
//!
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Implementing a custom backend
//!
//! The [TraceBackend](backend::TraceBackend) trait gathers every process
//! control primitive the tracer relies on. The default backend for Linux is
//! provided by `retrace-debugger`.

/// Module containing the trait for implementing a custom tracing backend.
pub mod backend;

mod command;
mod error;
mod event;

/// Module containing the trait for handling trace events.
pub mod handler;

/// Module implementing the call tracer.
pub mod tracer;

pub use self::command::Command;
pub use self::error::{BackendError, Error, HandlerError, Result};
pub use self::event::Event;

/// Process identifier.
pub type ProcessId = u64;
