//! Advisory lock probe for the helper's global lock file.
//!
//! puppy takes an exclusive `flock` on its lock file for as long as it talks
//! to the PVR. Probing the same lock before spawning lets us report a busy
//! device without launching a second helper that is bound to fail.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

pub const DEFAULT_LOCK_FILE: &str = "/tmp/puppy";

/// Returns `true` when another process holds the lock on `path`.
#[cfg(unix)]
pub fn lock_is_held(path: &Path) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new().append(true).create(true).open(path)?;
    // SAFETY: the descriptor stays valid for the lifetime of `file`.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        // Closing the descriptor below releases our probe lock.
        return Ok(false);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => Ok(true),
        _ => Err(err),
    }
}

#[cfg(not(unix))]
pub fn lock_is_held(path: &Path) -> io::Result<bool> {
    OpenOptions::new().append(true).create(true).open(path)?;
    Ok(false)
}
