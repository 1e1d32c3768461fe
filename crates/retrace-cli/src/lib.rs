//! Crate implementing the CLI commands.

mod cli;
mod config;
mod output;
mod run;

pub use self::cli::CliOpts;
pub use self::config::{FileConfig, TraceEntry, TraceSettings, expand_home, search_list};
pub use self::output::{Summary, TextOutput, signal_name};
pub use self::run::evaluate_run;
