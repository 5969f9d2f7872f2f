//! Command-line interface definitions for the helper binary.
//!
//! Every flag defaults to the value the original helper hardcoded, so
//! running `gracedown service` with no flags reproduces its behavior.

use clap::{Parser, Subcommand, ValueEnum};

#[cfg(windows)]
use crate::install::InstallArgs;
use crate::session::WatchMode;

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands for the helper.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch for session-end notifications and run the stop pipeline.
    Service(ServiceOptions),

    /// Register the helper to start with the current user's session.
    #[cfg(windows)]
    Install(InstallArgs),

    /// Remove the autostart registration again.
    #[cfg(windows)]
    Uninstall,

    /// Run the environment capture and stop pipeline once in the foreground.
    TestSequence(ServiceOptions),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
    Pretty,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match *self {
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        write!(f, "{}", s)
    }
}

/// Configuration options for the watcher service and the pipeline it runs.
#[derive(Debug, Parser, Clone)]
pub struct ServiceOptions {
    /// Whether to block shutdown while the pipeline runs, or only to flag
    /// the event and show a one-time notice.
    #[arg(long = "mode", value_enum, default_value_t = WatchMode::Block)]
    pub mode: WatchMode,

    /// Reason shown to the user while shutdown is blocked.
    #[arg(
        long = "block-reason",
        default_value = "Shutting down database and virtual machine"
    )]
    pub block_reason: String,

    /// Name of the lock guarding against concurrent helper instances.
    #[arg(long = "instance-name", default_value = "gracedown-75d7b12a")]
    pub instance_name: String,

    /// Command whose `SET key=value` output seeds the pipeline environment.
    #[arg(long = "env-command", default_value = "docker-machine env --shell cmd")]
    pub env_command: String,

    /// How long the environment probe may take before the pipeline aborts.
    #[arg(long = "env-timeout-ms", default_value_t = 30_000)]
    pub env_timeout_ms: u64,

    /// Command asking the database container to stop.
    #[arg(long = "container-stop-command", default_value = "docker kill -s INT db")]
    pub container_stop_command: String,

    /// Wait bound for the container-stop command.
    #[arg(long = "container-stop-timeout-ms", default_value_t = 2_000)]
    pub container_stop_timeout_ms: u64,

    /// Command waiting for the database container to exit.
    #[arg(long = "container-wait-command", default_value = "docker wait db")]
    pub container_wait_command: String,

    /// Wait bound for the container-wait command.
    #[arg(long = "container-wait-timeout-ms", default_value_t = 2_000)]
    pub container_wait_timeout_ms: u64,

    /// Command stopping the virtual machine host.
    #[arg(long = "host-stop-command", default_value = "docker-machine stop")]
    pub host_stop_command: String,

    /// Wait bound for the host-stop command.
    #[arg(long = "host-stop-timeout-ms", default_value_t = 15_000)]
    pub host_stop_timeout_ms: u64,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}
