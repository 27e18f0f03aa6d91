//! Core data types used throughout the vigil library
//!
//! This module contains the data model shared across components: the
//! persisted ledger structures, the opaque storage identifier produced
//! by the filename obfuscator, and the result types returned by backup
//! and restore operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One timestamped, content-hashed snapshot of a watched file
///
/// Revisions are persisted inside a [`Ledger`] in the order the backups
/// actually completed; display order (newest first) is produced by the
/// store when listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// SHA-256 hash of the plaintext content (64 hex characters),
    /// referencing a blob in the content-addressable store
    pub hash: String,
    /// When the backup completed
    pub timestamp: DateTime<Utc>,
}

impl Revision {
    /// Shortened hash for log output
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(12)]
    }
}

/// The complete ordered revision history for one storage identifier,
/// plus the per-file salt.
///
/// The ledger is rewritten in full (never patched incrementally) on
/// every successful backup, so the file on disk always carries the
/// current encryption state as a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    /// Hex-encoded 16-byte salt of the owning storage identifier
    pub salt: String,
    /// Revisions in true completion order, oldest first
    pub revisions: Vec<Revision>,
}

impl Ledger {
    /// Create an empty ledger for a file with the given salt
    pub fn new(salt: String) -> Self {
        Ledger {
            salt,
            revisions: Vec::new(),
        }
    }

    /// The most recently appended revision, if any
    pub fn head(&self) -> Option<&Revision> {
        self.revisions.last()
    }
}

/// Opaque, salted name under which a real path's history is stored
///
/// The name is a slow salted one-way hash of the real path, so the
/// storage layout reveals nothing about which files are backed up.
/// Stable for the lifetime of the watched file; regenerated only if
/// the salt index entry is lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageIdentifier {
    /// Hex-encoded 16-byte random salt, generated once per real path
    pub salt: String,
    /// Hex-encoded opaque name derived from (path, salt)
    pub name: String,
}

/// Handle returned by a backup operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionHandle {
    /// Full content hash of the revision
    pub hash: String,
    /// Timestamp of the revision (the existing one when deduplicated)
    pub timestamp: DateTime<Utc>,
    /// False when the content matched the file's most recent revision
    /// and no new history entry was written
    pub created: bool,
}

/// Result of a restore operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredFile {
    /// Full hash of the revision that was restored
    pub hash: String,
    /// Final path the content was written to
    pub destination: PathBuf,
}

/// A directory under observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedRoot {
    /// Absolute path of the directory
    pub path: PathBuf,
    /// Ignore patterns specific to this root, merged with the global
    /// pattern list when the filter is compiled
    pub ignore_patterns: Vec<String>,
}

impl WatchedRoot {
    /// A watched root with no extra ignore patterns
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WatchedRoot {
            path: path.into(),
            ignore_patterns: Vec::new(),
        }
    }
}

/// Kind of filesystem change reported to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File created or modified
    Modified,
    /// File removed (also emitted for the source of a move)
    Removed,
    /// Directory removed; pending entries underneath it are dropped
    RemovedDir,
}

/// One inbound filesystem change notification
///
/// The core does not perform OS-level watching itself; a collaborator
/// (the polling watcher, or tests) feeds these events into the
/// scheduler's channel.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Absolute path the event refers to
    pub path: PathBuf,
    /// What happened
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Convenience constructor for a modification event
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        ChangeEvent {
            path: path.into(),
            kind: ChangeKind::Modified,
        }
    }

    /// Convenience constructor for a removal event
    pub fn removed(path: impl Into<PathBuf>) -> Self {
        ChangeEvent {
            path: path.into(),
            kind: ChangeKind::Removed,
        }
    }
}

/// Plaintext metadata stored at the storage root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version of the on-disk format
    pub format_version: u32,
    /// Crate version that created the store
    pub vigil_version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Whether an encryption key was configured when the store was
    /// created (individual objects record their own at-rest state)
    pub encrypted: bool,
}

/// Contents of the daemon instance lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// PID of the owning daemon process
    pub pid: u32,
    /// When the lock was acquired
    pub started_at: DateTime<Utc>,
}
