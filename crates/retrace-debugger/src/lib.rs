//! This crate provides the default tracing backend (to be used with
//! `retrace-tracer`).
//!
//! The backend is able to launch a process (on the **same host machine**) as
//! a child, or to attach to a running one, and to control it with `ptrace`.
//!
//! <div class="warning">
//!
//! *This crate is not meant to be used on its own! It merely implements the
//! interface (trait) provided by `retrace-tracer`, so that the backend can
//! be used by that crate for tracing processes.*
//!
//! </div>
//!
//! # Supported Platforms
//!
//! <table>
//!     <thead>
//!         <tr>
//!             <th>Host Machine</th>
//!             <th>Tracee Platform</th>
//!         </tr>
//!     </thead>
//!     <tbody>
//!         <tr>
//!             <td>Linux <code>x86_64</code></td>
//!             <td><code>x86_64</code></td>
//!         </tr>
//!     </tbody>
//! </table>
//!
//! # Note
//!
//! Every `ptrace` request must be issued from the thread which attached to
//! the tracee, so the backend must be driven by a single-threaded runtime.

mod common;
mod error;
mod sys;

pub use self::common::backend::Backend;
pub use self::error::{Error, Result};
