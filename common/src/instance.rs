//! Single-instance guard backed by a named OS lock.
//!
//! The lock is only ever existence-checked: it detects that another copy of
//! the helper already runs, it never protects a critical section. Release
//! happens automatically on drop and, failing that, on process exit.

use thiserror::Error;

/// Errors from acquiring the instance lock.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// Another process already holds the named lock.
    #[error("another instance is already running")]
    AlreadyRunning,

    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(windows)]
mod imp {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt as _;
    use std::ptr;

    use winapi::shared::winerror::ERROR_ALREADY_EXISTS;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::synchapi::CreateMutexW;
    use winapi::um::winnt::HANDLE;

    use super::InstanceError;

    /// Holds a named mutex under the `Global\` namespace for the lifetime of
    /// the process.
    pub struct InstanceGuard {
        handle: HANDLE,
    }

    // SAFETY: the handle is an opaque kernel object identifier that is only
    // closed on drop; no thread-affine state is involved.
    unsafe impl Send for InstanceGuard {}

    impl InstanceGuard {
        /// Attempts to create the named mutex.
        ///
        /// # Errors
        ///
        /// `AlreadyRunning` when the mutex already exists, `Io` when the
        /// create call itself fails.
        pub fn acquire(name: &str) -> Result<Self, InstanceError> {
            let wide: Vec<u16> = OsStr::new(&format!("Global\\{name}"))
                .encode_wide()
                .chain(Some(0))
                .collect();

            // SAFETY: `wide` is a valid NUL-terminated UTF-16 string that
            // outlives the call.
            let handle = unsafe { CreateMutexW(ptr::null_mut(), 0, wide.as_ptr()) };
            if handle.is_null() {
                return Err(InstanceError::Io(std::io::Error::last_os_error()));
            }
            // SAFETY: nothing between CreateMutexW and here clobbers the
            // thread's last-error state.
            if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
                // SAFETY: `handle` was returned by CreateMutexW above.
                unsafe { CloseHandle(handle) };
                return Err(InstanceError::AlreadyRunning);
            }
            Ok(Self { handle })
        }
    }

    impl Drop for InstanceGuard {
        fn drop(&mut self) {
            // SAFETY: the handle is owned by this guard and closed exactly once.
            unsafe { CloseHandle(self.handle) };
        }
    }
}

#[cfg(unix)]
mod imp {
    use std::fs::{File, OpenOptions};

    use fs2::FileExt as _;

    use super::InstanceError;

    /// Holds an exclusive lock on a file under the temp dir.
    ///
    /// The file itself is left behind on drop; releasing the lock is what
    /// frees the name for the next instance.
    pub struct InstanceGuard {
        _file: File,
    }

    impl InstanceGuard {
        /// Attempts to take the exclusive lock for `name`.
        ///
        /// # Errors
        ///
        /// `AlreadyRunning` when another process (or open descriptor) holds
        /// the lock, `Io` when the lock file cannot be opened.
        pub fn acquire(name: &str) -> Result<Self, InstanceError> {
            let path = std::env::temp_dir().join(format!("{name}.lock"));
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            match file.try_lock_exclusive() {
                Ok(()) => Ok(Self { _file: file }),
                Err(error) if error.kind() == fs2::lock_contended_error().kind() => {
                    Err(InstanceError::AlreadyRunning)
                }
                Err(error) => Err(InstanceError::Io(error)),
            }
        }
    }
}

pub use imp::InstanceGuard;
