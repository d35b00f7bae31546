use crate::logger::Logger;
use anyhow::{anyhow, Context, Result};
use duct::cmd;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Raised when a spawned process exits with a non-zero status.
#[derive(Debug, Error)]
#[error("Command `{command}` exited with code {exit_code}")]
pub struct CommandExecutionError {
    pub command: String,
    pub exit_code: i32,
}

/// Runs external processes one at a time, forwarding their combined
/// stdout/stderr to the log line by line as the process produces it.
///
/// The runner blocks until the child terminates and never retries; a failing
/// command is always surfaced to the caller.
pub struct CommandRunner<'a> {
    logger: &'a Logger,
}

impl<'a> CommandRunner<'a> {
    pub fn new(logger: &'a Logger) -> Self {
        Self { logger }
    }

    pub fn run(&self, command: &[String], dir: Option<&Path>) -> Result<()> {
        self.run_with_env(command, dir, &[])
    }

    pub fn run_with_env(
        &self,
        command: &[String],
        dir: Option<&Path>,
        env: &[(String, String)],
    ) -> Result<()> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("Cannot run an empty command"))?;
        let display = command.join(" ");
        self.logger.debug(format!("Running `{}`", display));

        let mut expression = cmd(program.as_str(), args).stderr_to_stdout().unchecked();
        if let Some(dir) = dir {
            expression = expression.dir(dir);
        }
        for (name, value) in env {
            expression = expression.env(name, value);
        }

        let reader = expression
            .reader()
            .with_context(|| format!("Failed to start `{}`", display))?;

        // Child output is not guaranteed to be valid UTF-8.
        let mut lines = BufReader::new(reader);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = lines
                .read_until(b'\n', &mut buffer)
                .with_context(|| format!("Failed to read the output of `{}`", display))?;
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buffer);
            self.logger.debug(line.trim_end());
        }

        let reader = lines.into_inner();
        let output = reader
            .try_wait()
            .with_context(|| format!("Failed to wait for `{}`", display))?
            .ok_or_else(|| anyhow!("`{}` did not terminate after closing its output", display))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CommandExecutionError {
                command: display,
                exit_code: output.status.code().unwrap_or(-1),
            }
            .into())
        }
    }
}
