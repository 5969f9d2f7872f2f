//! Service startup: single-instance guarding and the session watcher.

use eyre::Result;
use tracing::info;

use gracedown_common::{InstanceError, InstanceGuard};

use crate::cli::ServiceOptions;

/// Acquires the instance lock and runs the session watcher.
///
/// A second copy finding the lock held exits quietly with success, before
/// any window exists; the lock is released again when the process exits.
///
/// # Errors
///
/// Returns an error if probing the lock fails, if the watcher window cannot
/// be created, or on platforms without session-end notifications.
pub fn start(options: &ServiceOptions) -> Result<()> {
    let _guard = match InstanceGuard::acquire(&options.instance_name) {
        Ok(guard) => guard,
        Err(InstanceError::AlreadyRunning) => {
            info!(
                name = %options.instance_name,
                "another instance is already running; exiting"
            );
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    run_watcher_for_platform(options)
}

#[cfg(windows)]
fn run_watcher_for_platform(options: &ServiceOptions) -> Result<()> {
    crate::session::run_watcher(options)
}

#[cfg(not(windows))]
fn run_watcher_for_platform(_options: &ServiceOptions) -> Result<()> {
    Err(eyre::eyre!(
        "the session watcher requires Windows; only `test-sequence` is available on this platform"
    ))
}
