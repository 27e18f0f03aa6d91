//! Daemon lifecycle: instance locking and remote control
//!
//! A running daemon owns a lock file containing its PID and start time.
//! The lock is acquired with an exclusive create, so two daemons can
//! never watch the same storage root at once. A lock left behind by a
//! crashed process is detected by probing whether the recorded PID is
//! still alive and reclaimed if it is not.
//!
//! Process liveness goes through the [`ProcessProbe`] trait so tests
//! can simulate dead and living owners without spawning processes. The
//! real probe sends signal 0, which performs permission and existence
//! checks without delivering anything.

use crate::error::{Result, VigilError};
use crate::types::LockInfo;
use chrono::Utc;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Checks whether a PID refers to a live process
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by `kill(pid, 0)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
    fn is_alive(&self, pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

/// Exclusive ownership of a storage root by one daemon process
///
/// Dropping the lock removes the lock file.
pub struct InstanceLock {
    path: PathBuf,
    info: LockInfo,
}

impl InstanceLock {
    /// Acquire the lock for the current process
    ///
    /// Fails with [`VigilError::AlreadyRunning`] when another live
    /// process holds it. A lock whose owner is dead, or whose contents
    /// are unreadable, is treated as stale and reclaimed. Reclaiming
    /// removes only the exact lock that was probed: if another starter
    /// replaced the file between the probe and the removal, the
    /// replacement is left alone and the new owner wins.
    pub fn acquire(path: &Path, probe: &dyn ProcessProbe) -> Result<Self> {
        match Self::try_create(path) {
            Ok(lock) => Ok(lock),
            Err(VigilError::AlreadyRunning { .. }) => {
                let observed = Self::read_info(path);
                if let Some(info) = &observed {
                    if probe.is_alive(info.pid) {
                        return Err(VigilError::AlreadyRunning { pid: info.pid });
                    }
                }
                Self::remove_if_unchanged(path, observed.as_ref())?;
                Self::try_create(path)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a stale lock, but only if it still holds the contents we
    /// decided were stale
    fn remove_if_unchanged(path: &Path, observed: Option<&LockInfo>) -> Result<()> {
        let current = Self::read_info(path);
        if current.as_ref() != observed {
            // A racing starter reclaimed the lock first and wrote its
            // own; that lock is not ours to delete.
            let pid = current.map(|i| i.pid).unwrap_or(0);
            return Err(VigilError::AlreadyRunning { pid });
        }
        match observed {
            Some(info) => warn!(
                "Reclaiming stale lock {:?} from dead process {}",
                path, info.pid
            ),
            None => warn!("Reclaiming unreadable lock file {:?}", path),
        }
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn try_create(path: &Path) -> Result<Self> {
        let info = LockInfo {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let pid = Self::read_info(path).map(|i| i.pid).unwrap_or(0);
                return Err(VigilError::AlreadyRunning { pid });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&serde_json::to_vec_pretty(&info)?)?;
        file.sync_all()?;
        debug!("Acquired instance lock {:?} as pid {}", path, info.pid);
        Ok(InstanceLock {
            path: path.to_path_buf(),
            info,
        })
    }

    fn read_info(path: &Path) -> Option<LockInfo> {
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove lock file {:?}: {}", self.path, e);
            }
        }
    }
}

/// Observed state of the daemon guarding a storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    /// A live daemon holds the lock
    Running(LockInfo),
    /// No lock file exists
    NotRunning,
    /// A lock file exists but its owner is dead
    Stale(LockInfo),
}

/// Queries and stops a daemon from the outside via its lock file
pub struct DaemonController {
    lock_path: PathBuf,
    probe: Arc<dyn ProcessProbe>,
}

impl DaemonController {
    pub fn new(lock_path: PathBuf, probe: Arc<dyn ProcessProbe>) -> Self {
        DaemonController { lock_path, probe }
    }

    /// Report whether a daemon is running for this storage root
    pub fn status(&self) -> DaemonStatus {
        match InstanceLock::read_info(&self.lock_path) {
            None => DaemonStatus::NotRunning,
            Some(info) if self.probe.is_alive(info.pid) => DaemonStatus::Running(info),
            Some(info) => DaemonStatus::Stale(info),
        }
    }

    /// Ask the running daemon to shut down
    ///
    /// Sends SIGTERM; the daemon's own signal handler runs the drain.
    /// Fails with [`VigilError::NotRunning`] when no live daemon holds
    /// the lock. A stale lock is cleaned up in passing.
    pub fn stop(&self) -> Result<LockInfo> {
        match self.status() {
            DaemonStatus::Running(info) => {
                info!("Sending SIGTERM to daemon pid {}", info.pid);
                kill(Pid::from_raw(info.pid as i32), Signal::SIGTERM)
                    .map_err(|e| VigilError::internal(format!("signal failed: {}", e)))?;
                Ok(info)
            }
            DaemonStatus::Stale(info) => {
                warn!("Removing stale lock of dead process {}", info.pid);
                let _ = std::fs::remove_file(&self.lock_path);
                Err(VigilError::NotRunning)
            }
            DaemonStatus::NotRunning => Err(VigilError::NotRunning),
        }
    }
}
