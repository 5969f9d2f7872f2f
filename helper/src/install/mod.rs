//! Autostart registration for the current user.
//!
//! The helper has to run inside the user's session to see session-end
//! notifications, so instead of a system service it registers under the
//! per-user `Run` registry key. No elevation required.

use clap::Parser;
use winreg::RegKey;
use winreg::enums::{HKEY_CURRENT_USER, KEY_SET_VALUE};

const RUN_KEY_PATH: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";
const RUN_VALUE_NAME: &str = "gracedown";

/// Arguments for the `install` subcommand.
#[derive(Debug, Parser)]
pub struct InstallArgs {
    /// Extra arguments appended to the `service` invocation that autostart
    /// runs, e.g. `--mode notify`.
    #[arg(long = "service-args", default_value = "")]
    pub service_args: String,
}

/// Registers the helper under the current user's Run key.
///
/// # Errors
///
/// Returns an error if the executable path cannot be resolved or the
/// registry write fails.
pub fn install(arguments: &InstallArgs) -> Result<(), String> {
    let exe = std::env::current_exe()
        .map_err(|e| format!("failed to locate helper executable: {e}"))?;
    let mut command = format!("\"{}\" service", exe.display());
    if !arguments.service_args.is_empty() {
        command.push(' ');
        command.push_str(&arguments.service_args);
    }

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _) = hkcu
        .create_subkey(RUN_KEY_PATH)
        .map_err(|e| format!("failed to open Run key: {e}"))?;
    key.set_value(RUN_VALUE_NAME, &command)
        .map_err(|e| format!("failed to write Run entry: {e}"))?;
    Ok(())
}

/// Removes the helper's Run key entry; a missing entry is not an error.
///
/// # Errors
///
/// Returns an error if the registry delete fails for any other reason.
pub fn uninstall() -> Result<(), String> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let key = match hkcu.open_subkey_with_flags(RUN_KEY_PATH, KEY_SET_VALUE) {
        Ok(key) => key,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(format!("failed to open Run key: {error}")),
    };
    match key.delete_value(RUN_VALUE_NAME) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(format!("failed to remove Run entry: {error}")),
    }
}
