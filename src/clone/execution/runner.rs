use std::io;
use std::os::unix::process::ExitStatusExt;

use crate::common::shell::command_line;

/// A single external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Let the tool write straight to the terminal (rsync progress)
    pub stream_output: bool,
    /// Safe to run in dry-run mode because it only reads state
    pub read_only: bool,
    /// Spinner text shown while the command runs
    pub description: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stream_output: false,
            read_only: false,
            description: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream_output = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn describe(mut self, message: impl Into<String>) -> Self {
        self.description = Some(message.into());
        self
    }

    pub fn command_line(&self) -> String {
        command_line(&self.program, &self.args)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external tools. The pipeline only ever talks to the system through this.
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is not an error at this level.
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;

    fn has_program(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/// Runs commands on the host through `duct`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut expr = duct::cmd(spec.program.as_str(), spec.args.iter()).unchecked();
        if !spec.stream_output {
            expr = expr.stdout_capture().stderr_capture();
        }

        let output = expr.run()?;
        let status = output
            .status
            .code()
            .or_else(|| output.status.signal().map(|sig| 128 + sig))
            .unwrap_or(-1);

        Ok(CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
