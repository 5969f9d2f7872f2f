//! Library entry for the `gracedown` helper.
//!
//! Exposes `inner_main` so the workspace-level shim binary can call into the
//! helper logic, plus the modules the integration tests exercise.

pub mod cli;
#[cfg(windows)]
pub mod install;
pub mod sequence;
pub mod service;
pub mod session;

use std::sync::Once;

use eyre::Result;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, LogFormat};

static INIT_TRACING: Once = Once::new();

fn init_tracing(format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let builder = tracing_subscriber::fmt().with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );

        match format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The helper's main function; can be called from a shim binary.
///
/// Dispatches the parsed CLI to service startup, autostart management, or a
/// one-off foreground run of the stop pipeline.
///
/// # Errors
///
/// Returns an error if startup, installation, or the pipeline run fails.
pub fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::Service(options) => {
            init_tracing(options.log_format);
            service::start(&options)
        }
        #[cfg(windows)]
        Command::Install(args) => {
            install::install(&args).map_err(eyre::Report::msg)?;
            println!("Autostart entry installed.");
            Ok(())
        }
        #[cfg(windows)]
        Command::Uninstall => {
            install::uninstall().map_err(eyre::Report::msg)?;
            println!("Autostart entry removed.");
            Ok(())
        }
        Command::TestSequence(options) => {
            init_tracing(options.log_format);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let outcomes = runtime.block_on(sequence::run_sequence(&options))?;
            for outcome in &outcomes {
                println!("{outcome}");
            }
            println!("Sequence completed.");
            Ok(())
        }
    }
}
