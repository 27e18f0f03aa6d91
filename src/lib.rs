//! # Vigil - Continuous file backup with versioned history
//!
//! A background engine that watches directories and automatically keeps
//! every version of every file that changes, with deduplicated storage
//! and optional at-rest encryption.
//!
//! ## Overview
//!
//! Vigil turns a directory tree into a continuously versioned history:
//! - Watch directories and back up files automatically once they go quiet
//! - Debounce save bursts so each editing session becomes one revision
//! - Store content by SHA-256 hash, deduplicating identical data across
//!   files and revisions
//! - Obfuscate filenames so the storage layout reveals nothing about
//!   what is backed up
//! - Optionally encrypt everything at rest with a passphrase-derived key
//! - Restore any revision of any file by hash prefix
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vigil::VigilBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = VigilBuilder::new("/var/lib/vigil")
//!     .watch("/home/user/documents")
//!     .ignore_patterns(vec!["*.tmp".to_string(), "**/.git/**".to_string()])
//!     .build()?;
//!
//! // One-off backup, bypassing the watcher
//! let file = std::path::Path::new("/home/user/documents/notes.txt");
//! if let Some(handle) = engine.backup_path(file)? {
//!     println!("revision {}", &handle.hash[..12]);
//! }
//!
//! // List history and restore an old version
//! for revision in engine.revisions(file)? {
//!     println!("{} {}", revision.short_hash(), revision.timestamp);
//! }
//! engine.restore(file, "a1b2c3", None)?;
//! # Ok(())
//! # }
//! ```
//!
//! Running the daemon requires a tokio runtime:
//!
//! ```rust,no_run
//! # use vigil::VigilBuilder;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = VigilBuilder::new("/var/lib/vigil")
//!     .watch("/home/user/documents")
//!     .build()?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! engine.run_daemon(shutdown_rx).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Revisions and the quiet period
//!
//! A file is backed up only after it has been unchanged for the idle
//! wait (5 seconds by default). Every change event restarts the wait,
//! so an editor writing repeatedly produces a single revision once the
//! user pauses. Content identical to the file's latest revision is
//! recognized and never recorded twice in a row.
//!
//! ### Content-addressable blobs
//!
//! Revision content is stored under its SHA-256 hash. Two files with
//! the same bytes, or one file reverted to an earlier state, share a
//! single blob while keeping independent history entries.
//!
//! ### Filename obfuscation
//!
//! Each file's history lives under an opaque name derived from a slow
//! salted hash of its real path. Someone with access to the storage
//! directory alone cannot tell which paths are being backed up.
//!
//! ### Daemon lifecycle
//!
//! One daemon per storage directory, enforced by a lock file holding
//! the owner's PID. Stale locks from crashed processes are reclaimed
//! automatically. Shutdown drains cleanly: due backups run, in-flight
//! backups finish, files still mid-edit are left for the next run's
//! startup scan.
//!
//! ## Module Organization
//!
//! - [`vigil`]: Engine facade and builder
//! - [`store`]: Content-addressable revision storage
//! - [`restore`]: Hash-prefix resolution and restore
//! - [`scheduler`]: Debounced change scheduling
//! - [`service`]: The daemon's backup loop
//! - [`watch`]: Polling filesystem watcher
//! - [`daemon`]: Instance locking and daemon control
//! - [`crypto`]: Hashing, compression and at-rest encryption
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

// Public API modules
pub mod crypto;
pub mod daemon;
pub mod error;
pub mod ignore;
pub mod restore;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;
pub mod vigil;
pub mod watch;

// Internal modules (not part of public API)
mod obfuscate;
mod utils;

// Re-export main types for convenience
pub use crypto::{content_hash, CryptoProvider};
pub use daemon::{DaemonController, DaemonStatus, InstanceLock, ProcessProbe, SignalProbe};
pub use error::{Result, VigilError};
pub use ignore::{IgnoreFilter, IgnoreSet, RootedIgnoreFilter};
pub use restore::RestoreResolver;
pub use scheduler::ChangeScheduler;
pub use service::{BackupService, ServiceConfig};
pub use store::RevisionStore;
pub use types::*;
pub use vigil::{Vigil, VigilBuilder};
pub use watch::PollingWatcher;
