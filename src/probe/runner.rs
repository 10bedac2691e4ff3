//! External command execution with a hard timeout.
//!
//! traceroute and ping frequently exit non-zero while still printing useful
//! output, so a non-zero exit status is never an error here. Only a timeout
//! or a failure to spawn the process is.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProbeCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Value following `flag` in the argument list, if any
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Captured output of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to run command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs an external utility and captures its output.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(
        &self,
        command: ProbeCommand,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, ProbeError>> + Send;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        command: ProbeCommand,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, ProbeError>> + Send {
        async move {
            let child = Command::new(&command.program)
                .args(&command.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                // Dropping the wait future on timeout kills the child
                .kill_on_drop(true)
                .spawn()?;

            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => {
                    let output = output?;
                    Ok(CommandOutput {
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                        exit_code: output.status.code(),
                    })
                }
                Err(_) => Err(ProbeError::Timeout(timeout)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_after() {
        let cmd = ProbeCommand::new("traceroute", ["-n", "-m", "7", "8.8.8.8"]);
        assert_eq!(cmd.arg_after("-m"), Some("7"));
        assert_eq!(cmd.arg_after("8.8.8.8"), None);
        assert_eq!(cmd.arg_after("-q"), None);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let cmd = ProbeCommand::new("hopwatch-definitely-missing-binary", Vec::<String>::new());
        let result = ProcessRunner.run(cmd, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProbeError::Spawn(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let cmd = ProbeCommand::new("sh", ["-c", "echo partial; exit 2"]);
        let output = ProcessRunner.run(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(output.stdout.trim(), "partial");
        assert_eq!(output.exit_code, Some(2));
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let cmd = ProbeCommand::new("sleep", ["5"]);
        let started = std::time::Instant::now();
        let result = ProcessRunner.run(cmd, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
