//! Main engine interface
//!
//! [`Vigil`] wires the components together behind one handle: the
//! revision store, the ignore filter, the restore resolver, and the
//! daemon plumbing. Construct it through [`VigilBuilder`], which
//! validates the configuration up front so a misconfigured watch list
//! fails at startup instead of silently misbehaving later.

use crate::crypto::CryptoProvider;
use crate::daemon::{DaemonController, DaemonStatus, InstanceLock, SignalProbe};
use crate::error::{Result, VigilError};
use crate::ignore::RootedIgnoreFilter;
use crate::restore::RestoreResolver;
use crate::scheduler::ChangeScheduler;
use crate::service::{BackupService, ServiceConfig};
use crate::store::RevisionStore;
use crate::types::{RestoredFile, Revision, RevisionHandle, WatchedRoot};
use crate::utils::{is_in_dir, normalize_path};
use crate::watch::PollingWatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

const LOCK_FILE: &str = "vigil.lock";
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Builder for [`Vigil`]
///
/// ```no_run
/// use vigil::VigilBuilder;
///
/// let engine = VigilBuilder::new("/var/lib/vigil")
///     .watch("/home/user/documents")
///     .ignore_patterns(vec!["*.tmp".to_string(), "**/.git/**".to_string()])
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct VigilBuilder {
    storage_dir: PathBuf,
    roots: Vec<WatchedRoot>,
    ignore_patterns: Vec<String>,
    idle_wait: Duration,
    poll_interval: Duration,
    max_concurrent_backups: usize,
    max_file_size: Option<u64>,
    encryption: Option<(String, String)>,
    startup_scan: bool,
}

impl VigilBuilder {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        VigilBuilder {
            storage_dir: storage_dir.into(),
            roots: Vec::new(),
            ignore_patterns: Vec::new(),
            idle_wait: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            max_concurrent_backups: 4,
            max_file_size: None,
            encryption: None,
            startup_scan: true,
        }
    }

    /// Add a directory to watch
    pub fn watch(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(WatchedRoot::new(path.into()));
        self
    }

    /// Add a directory to watch with its own extra ignore patterns
    pub fn watch_with_ignores(mut self, path: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        self.roots.push(WatchedRoot {
            path: path.into(),
            ignore_patterns: patterns,
        });
        self
    }

    /// Glob patterns excluded from backup under every root
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Quiet period a file must remain unchanged before backup
    pub fn idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// How often the polling watcher rescans the roots
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Maximum backups running at once
    pub fn max_concurrent_backups(mut self, limit: usize) -> Self {
        self.max_concurrent_backups = limit.max(1);
        self
    }

    /// Skip files larger than this many bytes
    pub fn max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = Some(limit);
        self
    }

    /// Encrypt stored objects with a key derived from this passphrase
    pub fn encryption(mut self, key_id: impl Into<String>, passphrase: impl Into<String>) -> Self {
        self.encryption = Some((key_id.into(), passphrase.into()));
        self
    }

    /// Whether the daemon scans the roots at startup to catch changes
    /// made while it was down (on by default)
    pub fn startup_scan(mut self, scan: bool) -> Self {
        self.startup_scan = scan;
        self
    }

    /// Validate the configuration and open the engine
    pub fn build(self) -> Result<Vigil> {
        if self.idle_wait.is_zero() {
            return Err(VigilError::InvalidConfiguration(
                "idle wait must be positive".to_string(),
            ));
        }

        let mut roots = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            roots.push(WatchedRoot {
                path: normalize_path(&root.path)?,
                ignore_patterns: root.ignore_patterns.clone(),
            });
        }
        for (i, a) in roots.iter().enumerate() {
            for b in roots.iter().skip(i + 1) {
                if is_in_dir(&a.path, &b.path) || is_in_dir(&b.path, &a.path) {
                    return Err(VigilError::InvalidConfiguration(format!(
                        "watched roots {:?} and {:?} are nested",
                        a.path, b.path
                    )));
                }
            }
        }
        let storage_dir = normalize_path(&self.storage_dir)?;
        if roots.iter().any(|r| is_in_dir(&storage_dir, &r.path)) {
            return Err(VigilError::InvalidConfiguration(format!(
                "storage directory {:?} is inside a watched root",
                storage_dir
            )));
        }

        let crypto = Arc::new(match &self.encryption {
            Some((key_id, passphrase)) => CryptoProvider::with_passphrase(key_id, passphrase),
            None => CryptoProvider::unencrypted(),
        });
        // Compiles all patterns, so a bad glob fails here.
        let ignore = RootedIgnoreFilter::compile(&roots, &self.ignore_patterns)?;
        let store = Arc::new(
            RevisionStore::open(storage_dir.clone(), crypto)?
                .with_max_blob_size(self.max_file_size),
        );

        Ok(Vigil {
            storage_dir,
            roots,
            ignore,
            store: store.clone(),
            resolver: RestoreResolver::new(store),
            idle_wait: self.idle_wait,
            poll_interval: self.poll_interval,
            max_concurrent_backups: self.max_concurrent_backups,
            startup_scan: self.startup_scan,
        })
    }
}

/// The backup engine
pub struct Vigil {
    storage_dir: PathBuf,
    roots: Vec<WatchedRoot>,
    ignore: Arc<RootedIgnoreFilter>,
    store: Arc<RevisionStore>,
    resolver: RestoreResolver,
    idle_wait: Duration,
    poll_interval: Duration,
    max_concurrent_backups: usize,
    startup_scan: bool,
}

impl std::fmt::Debug for Vigil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vigil")
            .field("storage_dir", &self.storage_dir)
            .field("roots", &self.roots.len())
            .field("idle_wait", &self.idle_wait)
            .finish()
    }
}

impl Vigil {
    /// Back up one file immediately, bypassing the quiet period
    pub fn backup_path(&self, path: &Path) -> Result<Option<RevisionHandle>> {
        let path = normalize_path(path)?;
        self.store.backup(&path)
    }

    /// A file's revision history, newest first
    pub fn revisions(&self, path: &Path) -> Result<Vec<Revision>> {
        let path = normalize_path(path)?;
        self.store.list_revisions(&path)
    }

    /// Restore a revision identified by a hash prefix
    pub fn restore(
        &self,
        path: &Path,
        prefix: &str,
        destination: Option<&Path>,
    ) -> Result<RestoredFile> {
        let path = normalize_path(path)?;
        self.resolver.restore(&path, prefix, destination)
    }

    /// Every file with recorded history
    pub fn files(&self) -> Vec<PathBuf> {
        self.store.files()
    }

    /// The compiled ignore filter for the watched roots
    pub fn ignore_filter(&self) -> &Arc<RootedIgnoreFilter> {
        &self.ignore
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<RevisionStore> {
        &self.store
    }

    /// Path of the daemon's instance lock file
    pub fn lock_path(&self) -> PathBuf {
        self.storage_dir.join(LOCK_FILE)
    }

    /// Controller for the daemon guarding this storage directory
    pub fn controller(&self) -> DaemonController {
        DaemonController::new(self.lock_path(), Arc::new(SignalProbe))
    }

    /// Convenience wrapper over [`DaemonController::status`]
    pub fn daemon_status(&self) -> DaemonStatus {
        self.controller().status()
    }

    /// Run the daemon until the shutdown channel flips to `true`
    ///
    /// Acquires the instance lock, scans the roots so offline changes
    /// are scheduled, then runs the watcher and the service loop side
    /// by side. Returns once the drain has finished; the lock is
    /// released on return.
    pub async fn run_daemon(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let lock = InstanceLock::acquire(&self.lock_path(), &SignalProbe)?;
        info!(
            "Daemon pid {} watching {} roots",
            lock.info().pid,
            self.roots.len()
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = PollingWatcher::new(
            self.roots.clone(),
            self.poll_interval,
            event_tx,
            shutdown.clone(),
        );
        let scheduler = Arc::new(ChangeScheduler::new(self.idle_wait, self.ignore.clone()));
        let service = BackupService::new(
            self.store.clone(),
            scheduler,
            ServiceConfig {
                idle_wait: self.idle_wait,
                tick_interval: Duration::from_millis(250),
                max_concurrent_backups: self.max_concurrent_backups,
            },
            event_rx,
            shutdown,
        );
        if self.startup_scan {
            service.seed_from_scan(&self.roots);
        }

        let watcher_task = tokio::spawn(watcher.run());
        let outcome = service.run().await;
        let _ = watcher_task.await;

        drop(lock);
        outcome
    }
}
