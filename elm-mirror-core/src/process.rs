//! External command execution
//!
//! git and the Elm CLI are run through the [`CommandRunner`] trait so the
//! pipeline can be driven by a scripted runner in tests, or by
//! [`DryRunRunner`] when nothing should actually execute.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{OperationError, Result};

/// A fully described external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// Bytes written to the child's stdin before it is closed
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Build a command from a shell-style command line such as `npx elm`
    pub fn from_command_line(line: &str, timeout: Duration) -> Result<Self> {
        let mut words = shell_words::split(line)
            .map_err(|e| OperationError::InvalidArgument {
                detail: format!("unparsable command line '{line}': {e}"),
            })?
            .into_iter();

        let program = words.next().ok_or_else(|| OperationError::InvalidArgument {
            detail: "empty command line".to_string(),
        })?;

        Ok(Self {
            program,
            args: words.collect(),
            current_dir: None,
            stdin: None,
            timeout,
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Human-readable command line for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|word| shell_words::quote(word).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Trait for running external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion
    ///
    /// Spawn failures, timeouts and non-zero exits are all errors.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Runner identifier for logging
    fn name(&self) -> &'static str;
}

/// Runs commands as tokio child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        use tokio::io::AsyncWriteExt;
        use tokio::process::Command;

        let command_line = spec.display();
        debug!("Running `{}` in {:?}", command_line, spec.current_dir);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                std::process::Stdio::piped()
            } else {
                std::process::Stdio::null()
            })
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| OperationError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            // The child may exit without reading its prompt answer
            let _ = stdin.write_all(input.as_bytes()).await;
            let _ = stdin.flush().await;
        }

        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(waited) => waited.map_err(|source| OperationError::Spawn {
                program: spec.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(OperationError::CommandTimedOut {
                    command: command_line,
                    seconds: spec.timeout.as_secs(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            debug!("`{}` failed with exit code {}", command_line, code);
            return Err(OperationError::CommandFailed {
                command: command_line,
                code,
                stderr: if stderr.is_empty() { stdout } else { stderr },
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Logs commands instead of running them
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        info!(
            "dry_run: would run `{}` in {:?}",
            spec.display(),
            spec.current_dir
        );
        Ok(CommandOutput::default())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

/// Mock runner for testing: records every spec and fails on request
#[cfg(test)]
pub(crate) struct MockRunner {
    pub calls: std::sync::Mutex<Vec<CommandSpec>>,
    /// Commands whose display line contains this text exit with code 1
    pub fail_matching: Option<String>,
    /// Create the last argument as a directory, like `git clone` does,
    /// before any scripted failure
    pub create_last_arg: bool,
}

#[cfg(test)]
impl MockRunner {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            fail_matching: None,
            create_last_arg: false,
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        if self.create_last_arg {
            if let Some(target) = spec.args.last() {
                std::fs::create_dir_all(target).map_err(|e| OperationError::io(target, e))?;
            }
        }

        let line = spec.display();
        if let Some(pattern) = &self.fail_matching {
            if line.contains(pattern.as_str()) {
                return Err(OperationError::CommandFailed {
                    command: line,
                    code: 1,
                    stderr: "mock failure".to_string(),
                });
            }
        }

        Ok(CommandOutput::default())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
