use std::path::{Path, PathBuf};

use miette::IntoDiagnostic;

use retrace_tracer::tracer::DEFAULT_CALL_DEPTH;

use crate::CliOpts;

/// Configuration files read when none is given on the command line.
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/retrace.kdl", "~/.retrace.kdl"];

/// Content of a configuration file.
#[derive(Debug, Default, PartialEq, knus::Decode)]
pub struct FileConfig {
    /// Maximum number of nested calls tracked per process.
    #[knus(child, unwrap(argument))]
    pub call_depth: Option<usize>,

    /// Whether to trace system calls.
    #[knus(child, unwrap(argument))]
    pub trace_syscalls: Option<bool>,

    /// Whether to trace forked children.
    #[knus(child, unwrap(argument))]
    pub follow_forks: Option<bool>,

    /// Whether to print a summary instead of each call.
    #[knus(child, unwrap(argument))]
    pub summary: Option<bool>,

    /// Whether to trace the functions defined in the executable.
    #[knus(child, unwrap(argument))]
    pub local_symbols: Option<bool>,

    /// Functions to trace.
    #[knus(children(name = "trace"))]
    pub traces: Vec<TraceEntry>,
}

/// Function to trace.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct TraceEntry {
    /// Function name.
    #[knus(argument)]
    pub symbol: String,
}

/// Tracing settings, merged from the configuration files and the CLI.
#[derive(Debug, PartialEq)]
pub struct TraceSettings {
    /// Maximum number of nested calls tracked per process.
    pub call_depth: usize,

    /// Whether to trace system calls.
    pub trace_syscalls: bool,

    /// Whether to trace forked children.
    pub follow_forks: bool,

    /// Whether to print a summary instead of each call.
    pub summary: bool,

    /// Whether to trace the functions defined in the executable.
    pub local_symbols: bool,

    /// Functions to trace (every function if empty).
    pub symbols: Vec<String>,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            call_depth: DEFAULT_CALL_DEPTH,
            trace_syscalls: false,
            follow_forks: false,
            summary: false,
            local_symbols: false,
            symbols: Vec::new(),
        }
    }
}

impl TraceSettings {
    /// Reads the configuration files, then applies the CLI options on top.
    pub fn load(opts: &CliOpts) -> miette::Result<Self> {
        let mut settings = Self::from_files(&search_list(&opts.configs))?;

        settings.trace_syscalls |= opts.syscalls;
        settings.follow_forks |= opts.follow_forks;
        settings.summary |= opts.summary;
        settings.local_symbols |= opts.local_symbols;
        settings.symbols.extend(opts.symbols.iter().cloned());

        if let Some(depth) = opts.call_depth {
            settings.call_depth = depth;
        }

        Ok(settings)
    }

    /// Applies the given configuration files in order, skipping the missing
    /// ones.
    pub fn from_files(paths: &[PathBuf]) -> miette::Result<Self> {
        let mut settings = Self::default();

        for path in paths {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "no configuration file");
                    continue;
                }
                Err(e) => return Err(e).into_diagnostic(),
            };

            let config: FileConfig = knus::parse(&path.display().to_string(), &content)?;

            tracing::debug!(path = %path.display(), "read configuration file");

            settings.apply(config);
        }

        Ok(settings)
    }

    fn apply(&mut self, config: FileConfig) {
        if let Some(depth) = config.call_depth {
            self.call_depth = depth;
        }
        if let Some(enabled) = config.trace_syscalls {
            self.trace_syscalls = enabled;
        }
        if let Some(enabled) = config.follow_forks {
            self.follow_forks = enabled;
        }
        if let Some(enabled) = config.summary {
            self.summary = enabled;
        }
        if let Some(enabled) = config.local_symbols {
            self.local_symbols = enabled;
        }

        self.symbols
            .extend(config.traces.into_iter().map(|entry| entry.symbol));
    }
}

/// Configuration files to read, in order.
pub fn search_list(explicit: &[PathBuf]) -> Vec<PathBuf> {
    if explicit.is_empty() {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(|path| expand_home(Path::new(path)))
            .collect()
    } else {
        explicit.iter().map(|path| expand_home(path)).collect()
    }
}

/// Replaces a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
