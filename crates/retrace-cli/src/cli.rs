use std::path::PathBuf;

/// Traces the library calls of a program.
#[derive(clap::Parser, Debug)]
#[clap(name = "retrace", version)]
pub struct CliOpts {
    /// Attach to the running process with the given ID.
    #[clap(short = 'p', long = "pid", value_name = "PID")]
    pub pids: Vec<u64>,

    /// Trace system calls too.
    #[clap(short = 'S', long)]
    pub syscalls: bool,

    /// Trace the children created by `fork`, `vfork` and `clone`.
    #[clap(short = 'f', long)]
    pub follow_forks: bool,

    /// Print a summary of the calls when tracing ends, instead of each call.
    #[clap(short = 'c', long)]
    pub summary: bool,

    /// Write the trace to the given file instead of stderr.
    #[clap(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Read the configuration from the given file.
    ///
    /// Without this option, `/etc/retrace.kdl` and `~/.retrace.kdl` are read
    /// if they exist.
    #[clap(short = 'F', long = "config", value_name = "PATH")]
    pub configs: Vec<PathBuf>,

    /// Only trace the function with the given name.
    #[clap(short = 'e', long = "trace", value_name = "SYMBOL")]
    pub symbols: Vec<String>,

    /// Trace the functions defined in the executable, not only library calls.
    #[clap(short = 'l', long)]
    pub local_symbols: bool,

    /// Maximum number of nested calls tracked per process.
    #[clap(long, value_name = "N")]
    pub call_depth: Option<usize>,

    /// Program to launch, followed by its arguments.
    #[clap(
        value_name = "PROGRAM [ARGS]",
        trailing_var_arg = true,
        conflicts_with = "pids",
        required_unless_present = "pids"
    )]
    pub command: Vec<String>,
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
