//! Session-end watching: the pure state machine plus the Win32 window that
//! feeds it.

mod state;
#[cfg(windows)]
mod window;

pub use state::*;
#[cfg(windows)]
pub use window::run_watcher;
