//! Privilege discipline around per-recipient local delivery (spec.md §4.6).
//!
//! Local delivery for a recipient runs as that recipient's uid. Once fan-out
//! for the message is done the worker must restore euid 0 (if it started as
//! root), re-enable core dumps (Linux clears `PR_SET_DUMPABLE` across a uid
//! switch) and chdir to a known base directory so later failures land in a
//! sane cwd. Any failure here is fatal: a process stuck at the wrong
//! privilege level cannot continue safely (spec.md §7).

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PrivilegeError {
    #[error("failed to switch to uid {uid}: {source}")]
    SwitchUser {
        uid: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to restore root privileges: {source}")]
    RestoreRoot {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to chdir to {path}: {source}")]
    Chdir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Whether the current process is running as root (euid 0). Only the root
/// case needs the restore dance after a delivery runs as another uid.
#[cfg(unix)]
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Drop effective privileges to `uid`/`gid` for the duration of one local
/// delivery.
#[cfg(unix)]
pub fn switch_to_user(uid: u32, gid: u32) -> Result<(), PrivilegeError> {
    unsafe {
        if libc::setegid(gid) != 0 {
            return Err(PrivilegeError::SwitchUser {
                uid,
                source: std::io::Error::last_os_error(),
            });
        }
        if libc::seteuid(uid) != 0 {
            return Err(PrivilegeError::SwitchUser {
                uid,
                source: std::io::Error::last_os_error(),
            });
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn switch_to_user(_uid: u32, _gid: u32) -> Result<(), PrivilegeError> {
    Ok(())
}

/// Restore euid/egid to 0 without touching core-dump flags or cwd — used
/// between recipients of the same delivery so the next `switch_to_user` call
/// has the privilege to do so (spec.md §4.6 runs each local recipient under
/// its own uid in sequence).
#[cfg(unix)]
pub fn restore_euid_root() -> Result<(), PrivilegeError> {
    unsafe {
        if libc::seteuid(0) != 0 || libc::setegid(0) != 0 {
            return Err(PrivilegeError::RestoreRoot {
                source: std::io::Error::last_os_error(),
            });
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn restore_euid_root() -> Result<(), PrivilegeError> {
    Ok(())
}

/// Restore euid/egid 0, re-enable core dumps, and chdir to `base_dir` so that
/// a crash after this point produces a diagnosable core in a known place.
/// Called once, after the whole delivery fan-out completes.
#[cfg(unix)]
pub fn restore_root_and_rebase(base_dir: &Path) -> Result<(), PrivilegeError> {
    restore_euid_root()?;
    #[cfg(target_os = "linux")]
    unsafe {
        libc::prctl(libc::PR_SET_DUMPABLE, 1, 0, 0, 0);
    }
    std::env::set_current_dir(base_dir).map_err(|source| PrivilegeError::Chdir {
        path: base_dir.display().to_string(),
        source,
    })
}

#[cfg(not(unix))]
pub fn restore_root_and_rebase(base_dir: &Path) -> Result<(), PrivilegeError> {
    std::env::set_current_dir(base_dir).map_err(|source| PrivilegeError::Chdir {
        path: base_dir.display().to_string(),
        source,
    })
}
