//! Shell command runner with a bounded wait.

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// How a wait on a spawned command concluded.
#[derive(Debug, Clone, Copy)]
pub enum WaitOutcome {
    /// The child exited within the allotted time.
    Exited(ExitStatus),
    /// The wait elapsed; the child is left running.
    TimedOut,
}

/// Errors from spawning or waiting on a command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed waiting on `{command}`: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
}

/// Spawns `command_line` through the platform shell and waits up to `timeout`.
///
/// A timeout is not an error: control returns with [`WaitOutcome::TimedOut`]
/// and the child may still be running. Nothing attempts to kill it.
///
/// `envs` is applied on top of the inherited environment.
///
/// # Errors
///
/// Returns an error if the shell cannot be spawned or waiting on it fails.
pub async fn run_with_timeout(
    command_line: &str,
    timeout: Duration,
    envs: &[(String, String)],
) -> Result<WaitOutcome, RunnerError> {
    let mut command = shell_command(command_line);
    command.envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
        command: command_line.to_string(),
        source,
    })?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(command = command_line, ?status, "command exited");
            Ok(WaitOutcome::Exited(status))
        }
        Ok(Err(source)) => Err(RunnerError::Wait {
            command: command_line.to_string(),
            source,
        }),
        Err(_elapsed) => {
            warn!(
                command = command_line,
                ?timeout,
                "command still running after wait elapsed"
            );
            Ok(WaitOutcome::TimedOut)
        }
    }
}

/// Builds a `Command` invoking `command_line` via the appropriate shell for
/// the platform.
pub(crate) fn shell_command(command_line: &str) -> Command {
    const IS_WINDOWS: bool = cfg!(target_os = "windows");

    let mut command = Command::new(if IS_WINDOWS { "pwsh" } else { "sh" });
    command.arg(if IS_WINDOWS { "-Command" } else { "-c" });
    command.arg(command_line);
    command
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn successful_command_reports_exit_status() {
        let outcome = run_with_timeout("true", Duration::from_secs(5), &[])
            .await
            .expect("spawn should succeed");
        let WaitOutcome::Exited(status) = outcome else {
            panic!("expected the command to exit");
        };
        assert!(status.success());
    }

    #[tokio::test]
    async fn failing_command_reports_code_not_error() {
        let outcome = run_with_timeout("exit 3", Duration::from_secs(5), &[])
            .await
            .expect("spawn should succeed");
        let WaitOutcome::Exited(status) = outcome else {
            panic!("expected the command to exit");
        };
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn wait_returns_once_timeout_elapses() {
        let start = Instant::now();
        let outcome = run_with_timeout("sleep 5", Duration::from_millis(100), &[])
            .await
            .expect("spawn should succeed");
        assert!(matches!(outcome, WaitOutcome::TimedOut));
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "control must return near the configured timeout"
        );
    }

    #[tokio::test]
    async fn extra_envs_are_visible_to_the_child() {
        let envs = vec![("GRACEDOWN_TEST_VAR".to_string(), "expected".to_string())];
        let outcome = run_with_timeout(
            "test \"$GRACEDOWN_TEST_VAR\" = expected",
            Duration::from_secs(5),
            &envs,
        )
        .await
        .expect("spawn should succeed");
        let WaitOutcome::Exited(status) = outcome else {
            panic!("expected the command to exit");
        };
        assert!(status.success(), "env var should reach the child");
    }
}
