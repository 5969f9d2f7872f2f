//! Environment capture from a probe command's standard output.
//!
//! The probe prints `SET key=value` lines (the shape `docker-machine env
//! --shell cmd` emits); consecutive matching lines are collected so later
//! commands in the stop pipeline can run with the same environment.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::runner::shell_command;

/// Upper bound on probe output considered for parsing. Output beyond this is
/// dropped silently, matching the fixed read buffer of the original helper.
pub const ENV_MAX: usize = 1024;

/// Prefix of probe output lines carrying an environment assignment.
const SET_PREFIX: &str = "SET ";

/// Errors from running the environment probe.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to spawn environment probe `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed collecting output of `{command}`: {source}")]
    Output {
        command: String,
        source: std::io::Error,
    },

    #[error("environment probe `{command}` did not finish within {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

/// Runs the probe command and parses its output into key/value pairs.
///
/// Unlike pipeline steps, a probe timeout is an error here: without the
/// probe's output there is nothing to hand to the commands that follow.
/// A probe that exits nonzero is not an error; whatever `SET` lines it
/// managed to print are used, possibly none.
///
/// # Errors
///
/// Returns an error if the probe cannot be spawned, its output cannot be
/// collected, or it does not finish within `timeout`.
pub async fn capture_environment(
    command_line: &str,
    timeout: Duration,
) -> Result<Vec<(String, String)>, CaptureError> {
    let mut command = shell_command(command_line);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    // Probe diagnostics land on our own stderr; only stdout is parsed.
    command.stderr(Stdio::inherit());

    let child = command.spawn().map_err(|source| CaptureError::Spawn {
        command: command_line.to_string(),
        source,
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CaptureError::Output {
                command: command_line.to_string(),
                source,
            });
        }
        Err(_elapsed) => {
            return Err(CaptureError::TimedOut {
                command: command_line.to_string(),
                timeout,
            });
        }
    };

    let mut stdout = output.stdout;
    stdout.truncate(ENV_MAX);
    let env = parse_set_lines(&String::from_utf8_lossy(&stdout));
    debug!(
        command = command_line,
        entries = env.len(),
        "captured environment"
    );
    Ok(env)
}

/// Parses consecutive `SET key=value` lines into pairs.
///
/// Collection stops at the first line without the prefix or without a `=`;
/// anything after it is ignored. Values split on the first `=` only.
pub fn parse_set_lines(text: &str) -> Vec<(String, String)> {
    let mut env = Vec::new();
    for line in text.lines() {
        let Some(assignment) = line.strip_prefix(SET_PREFIX) else {
            break;
        };
        let Some((key, value)) = assignment.split_once('=') else {
            break;
        };
        env.push((key.to_string(), value.to_string()));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_consecutive_set_lines() {
        let parsed = parse_set_lines("SET DOCKER_HOST=tcp://1.2.3.4:2376\nSET DOCKER_TLS_VERIFY=1\n");
        assert_eq!(
            parsed,
            vec![
                ("DOCKER_HOST".to_string(), "tcp://1.2.3.4:2376".to_string()),
                ("DOCKER_TLS_VERIFY".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn stops_at_first_line_without_prefix() {
        let parsed = parse_set_lines("SET A=1\nREM comment\nSET B=2\n");
        assert_eq!(parsed, vec![("A".to_string(), "1".to_string())]);
    }

    #[test]
    fn splits_on_first_equals_only() {
        let parsed = parse_set_lines("SET CERT_PATH=C:\\certs=odd\n");
        assert_eq!(
            parsed,
            vec![("CERT_PATH".to_string(), "C:\\certs=odd".to_string())]
        );
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let parsed = parse_set_lines("SET A=1\r\nSET B=2\r\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn empty_output_yields_empty_env() {
        assert!(parse_set_lines("").is_empty());
    }

    #[test]
    fn line_without_assignment_stops_collection() {
        let parsed = parse_set_lines("SET A=1\nSET NOEQUALS\nSET B=2\n");
        assert_eq!(parsed, vec![("A".to_string(), "1".to_string())]);
    }
}
