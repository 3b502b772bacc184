//! External command execution
//!
//! helm, kustomize and injector binaries are all invoked through
//! [`CommandRunner`], so tests can substitute canned output.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ChartifyError, Result};

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
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

    /// Push `flag value` when a value is present
    pub fn opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.arg(flag).arg(v),
            _ => self,
        }
    }

    pub fn flag(self, flag: &str, enabled: bool) -> Self {
        if enabled { self.arg(flag) } else { self }
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Shell-quoted command line, for logs and error messages
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs external commands
pub trait CommandRunner: Send + Sync {
    /// Run to completion; a non-zero exit is not an error at this level
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!(command = %spec.display(), cwd = ?spec.cwd, "running");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let output = cmd
            .output()
            .map_err(|e| ChartifyError::CollaboratorExecution {
                command: spec.display(),
                status: None,
                stderr: e.to_string(),
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and turn a non-zero exit into [`ChartifyError::CollaboratorExecution`]
pub fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(spec)?;
    if output.success() {
        Ok(output)
    } else {
        Err(ChartifyError::CollaboratorExecution {
            command: spec.display(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync>;

    /// Records every command and answers with a caller-supplied handler
    pub struct FakeRunner {
        handler: Handler,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        pub fn new(handler: impl Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Every command succeeds with empty output
        pub fn ok() -> Self {
            Self::new(|_| stdout(""))
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok((self.handler)(spec))
        }
    }

    pub fn stdout(text: &str) -> CommandOutput {
        CommandOutput {
            status: Some(0),
            stdout: text.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}
