use std::path::PathBuf;

/// Command line of a program to launch under tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Program to launch.
    ///
    /// If it is not an absolute path, the `PATH` is searched.
    pub program: PathBuf,

    /// Arguments of the program (without `argv[0]`).
    pub args: Vec<String>,
}

impl Command {
    /// Creates a command launching `program` without arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends multiple arguments.
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }
}
