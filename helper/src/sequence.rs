//! The ordered stop pipeline run when a session ends.
//!
//! Order and timeouts mirror the original helper: capture the VM
//! environment, signal the database container, wait for it to exit, then
//! stop the machine itself.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use gracedown_common::{
    CaptureError, RunnerError, WaitOutcome, capture_environment, run_with_timeout,
};

use crate::cli::ServiceOptions;

/// One externally spawned step of the pipeline.
#[derive(Debug, Clone)]
pub struct SequenceStep {
    pub name: &'static str,
    pub command: String,
    pub timeout: Duration,
}

/// How a single step of a completed run concluded.
#[derive(Debug, Clone, Copy)]
pub struct SequenceOutcome {
    pub step: &'static str,
    pub wait: WaitOutcome,
}

impl std::fmt::Display for SequenceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.wait {
            WaitOutcome::Exited(status) => write!(f, "{}: {status}", self.step),
            WaitOutcome::TimedOut => {
                write!(f, "{}: still running when its wait elapsed", self.step)
            }
        }
    }
}

/// Errors that abort the pipeline.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("environment capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("step `{name}` failed: {source}")]
    Step {
        name: &'static str,
        source: RunnerError,
    },
}

/// Builds the fixed step order from the configured commands and timeouts.
pub fn build_steps(options: &ServiceOptions) -> Vec<SequenceStep> {
    vec![
        SequenceStep {
            name: "container-stop",
            command: options.container_stop_command.clone(),
            timeout: Duration::from_millis(options.container_stop_timeout_ms),
        },
        SequenceStep {
            name: "container-wait",
            command: options.container_wait_command.clone(),
            timeout: Duration::from_millis(options.container_wait_timeout_ms),
        },
        SequenceStep {
            name: "host-stop",
            command: options.host_stop_command.clone(),
            timeout: Duration::from_millis(options.host_stop_timeout_ms),
        },
    ]
}

/// Runs environment capture followed by the stop steps, in order.
///
/// The captured environment is applied to every step. A step that times out
/// does not abort the pipeline (the child is left to finish on its own); a
/// step that cannot be spawned does, as does any capture failure. No
/// compensating actions run for steps already taken.
///
/// Returns one [`SequenceOutcome`] per step, in run order.
///
/// # Errors
///
/// Returns the capture or step error that aborted the pipeline.
pub async fn run_sequence(options: &ServiceOptions) -> Result<Vec<SequenceOutcome>, SequenceError> {
    let env = capture_environment(
        &options.env_command,
        Duration::from_millis(options.env_timeout_ms),
    )
    .await?;
    info!(entries = env.len(), "environment captured");

    let mut outcomes = Vec::new();
    for step in build_steps(options) {
        info!(step = step.name, command = %step.command, "running step");
        match run_with_timeout(&step.command, step.timeout, &env).await {
            Ok(wait @ WaitOutcome::Exited(status)) => {
                info!(step = step.name, ?status, "step exited");
                outcomes.push(SequenceOutcome {
                    step: step.name,
                    wait,
                });
            }
            Ok(wait @ WaitOutcome::TimedOut) => {
                info!(
                    step = step.name,
                    "step still running after its wait elapsed; moving on"
                );
                outcomes.push(SequenceOutcome {
                    step: step.name,
                    wait,
                });
            }
            Err(source) => {
                return Err(SequenceError::Step {
                    name: step.name,
                    source,
                });
            }
        }
    }

    Ok(outcomes)
}

/// Runs the pipeline on a dedicated thread with its own single-threaded
/// runtime, invoking `on_done` afterwards regardless of outcome.
///
/// `on_done` always fires so a caller blocking shutdown on the pipeline is
/// never left waiting on an aborted run.
pub fn spawn_worker(
    options: ServiceOptions,
    on_done: impl FnOnce() + Send + 'static,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let result = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(run_sequence(&options)),
            Err(build_error) => {
                error!(%build_error, "failed to build the pipeline runtime");
                on_done();
                return;
            }
        };

        match result {
            Ok(outcomes) => info!(steps = outcomes.len(), "stop pipeline finished"),
            Err(error) => error!(%error, "stop pipeline aborted"),
        }
        on_done();
    })
}


#[cfg(all(test, unix))]
mod pipeline_tests {
    use std::sync::mpsc;

    use clap::Parser as _;

    use super::*;
    use crate::cli::{Cli, Command};

    /// Options with a no-op probe, so tests only override what they exercise.
    fn base_options() -> ServiceOptions {
        let cli = Cli::parse_from(["gracedown", "test-sequence", "--env-command", "true"]);
        let Command::TestSequence(options) = cli.command else {
            panic!("expected the test-sequence subcommand");
        };
        options
    }

    #[tokio::test]
    async fn capture_failure_runs_no_step() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("step_ran");
        let mut options = base_options();
        options.container_stop_command = format!("touch {}", marker.to_string_lossy());
        options.container_wait_command = format!("touch {}", marker.to_string_lossy());
        options.host_stop_command = format!("touch {}", marker.to_string_lossy());
        options.env_command = "sleep 5".to_string();
        options.env_timeout_ms = 100;

        let result = run_sequence(&options).await;
        assert!(matches!(result, Err(SequenceError::Capture(_))));
        assert!(
            !marker.exists(),
            "no pipeline command may run after a capture failure"
        );
    }

    #[tokio::test]
    async fn captured_env_reaches_every_step() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("steps.log");
        let log_str = log.to_string_lossy().into_owned();

        let mut options = base_options();
        options.env_command = "printf 'SET MARKER=fromenv\\n'".to_string();
        options.container_stop_command = format!("echo stop-$MARKER >> {log_str}");
        options.container_wait_command = format!("echo wait-$MARKER >> {log_str}");
        options.host_stop_command = format!("echo halt-$MARKER >> {log_str}");

        let outcomes = run_sequence(&options).await.expect("pipeline should pass");

        let contents = std::fs::read_to_string(&log).expect("log should exist");
        assert_eq!(contents, "stop-fromenv\nwait-fromenv\nhalt-fromenv\n");

        let steps: Vec<_> = outcomes.iter().map(|o| o.step).collect();
        assert_eq!(steps, ["container-stop", "container-wait", "host-stop"]);
        assert!(
            outcomes
                .iter()
                .all(|o| matches!(o.wait, WaitOutcome::Exited(status) if status.success())),
            "every step should report a clean exit"
        );
    }

    #[tokio::test]
    async fn timed_out_step_does_not_abort_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("steps.log");
        let log_str = log.to_string_lossy().into_owned();

        let mut options = base_options();
        options.container_stop_command = "sleep 5".to_string();
        options.container_stop_timeout_ms = 100;
        options.container_wait_command = format!("echo wait >> {log_str}");
        options.host_stop_command = format!("echo halt >> {log_str}");

        let outcomes = run_sequence(&options).await.expect("timeout is not an error");

        let contents = std::fs::read_to_string(&log).expect("log should exist");
        assert_eq!(contents, "wait\nhalt\n");

        assert!(matches!(outcomes[0].wait, WaitOutcome::TimedOut));
        assert!(matches!(outcomes[1].wait, WaitOutcome::Exited(_)));
        assert!(matches!(outcomes[2].wait, WaitOutcome::Exited(_)));
    }

    #[test]
    fn worker_signals_completion_even_on_abort() {
        let mut options = base_options();
        options.env_command = "sleep 5".to_string();
        options.env_timeout_ms = 100;

        let (sender, receiver) = mpsc::channel();
        let handle = spawn_worker(options, move || {
            sender.send(()).expect("receiver should be alive");
        });
        receiver
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("worker must signal completion after an abort");
        handle.join().expect("worker thread should not panic");
    }
}
