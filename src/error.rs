//! Error types for the vigil library
//!
//! One `thiserror` enum covers the whole crate. Two conditions from the
//! backup pipeline are deliberately *not* errors: an ignored path is a
//! filter outcome, and a path that vanished between notify and fire is a
//! logged skip (`Ok(None)` from [`crate::vigil::Vigil::backup_path`]).

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the vigil library
pub type Result<T> = std::result::Result<T, VigilError>;

/// Main error type for all vigil operations
#[derive(Debug, Error)]
pub enum VigilError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid ignore pattern
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration (nested watched roots, zero workers, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Encryption or decryption failure; aborts a single backup or
    /// restore attempt, the previous ledger stays authoritative
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Storage-related errors (corrupt envelope, bad store layout)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Blob not found in content-addressable storage
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// No revision of the file matches the given hash prefix
    #[error("No revision of {path:?} matches hash prefix \"{prefix}\"")]
    NoMatchingRevision {
        /// File whose ledger was searched
        path: PathBuf,
        /// Prefix supplied by the caller
        prefix: String,
    },

    /// More than one revision matches the given hash prefix
    #[error("Hash prefix \"{prefix}\" is ambiguous ({} candidates)", candidates.len())]
    AmbiguousHash {
        /// Prefix supplied by the caller
        prefix: String,
        /// Full hashes of all matching revisions, sorted
        candidates: Vec<String>,
    },

    /// Another daemon instance already holds the instance lock
    #[error("Daemon is already running with PID {pid}")]
    AlreadyRunning {
        /// PID recorded in the lock file
        pid: u32,
    },

    /// No running daemon was found for a stop request
    #[error("Daemon is not running")]
    NotRunning,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// Create a storage error with a custom message
    pub fn storage(msg: impl Into<String>) -> Self {
        VigilError::Storage(msg.into())
    }

    /// Create an encryption error with a custom message
    pub fn encryption(msg: impl Into<String>) -> Self {
        VigilError::Encryption(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        VigilError::Internal(msg.into())
    }

    /// Check if this error should be reported to an interactive caller
    /// with remediation detail (restore/lifecycle errors) rather than
    /// only logged by the daemon loop.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            VigilError::NoMatchingRevision { .. }
                | VigilError::AmbiguousHash { .. }
                | VigilError::AlreadyRunning { .. }
                | VigilError::NotRunning
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            VigilError::AmbiguousHash { prefix, candidates } => {
                let mut msg = format!(
                    "Hash prefix \"{}\" matches {} revisions; supply a longer prefix:\n",
                    prefix,
                    candidates.len()
                );
                for hash in candidates {
                    msg.push_str("  ");
                    msg.push_str(hash);
                    msg.push('\n');
                }
                msg
            }
            VigilError::NoMatchingRevision { path, prefix } => {
                format!(
                    "No revision of {:?} matches \"{}\". Use 'vigil revisions' to list stored hashes.",
                    path, prefix
                )
            }
            VigilError::AlreadyRunning { pid } => {
                format!("Daemon is already running with PID {}. Use 'vigil stop' first.", pid)
            }
            _ => self.to_string(),
        }
    }
}
