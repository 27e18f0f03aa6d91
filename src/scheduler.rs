//! Debounced change scheduling
//!
//! Raw filesystem events arrive in bursts: editors write, truncate and
//! rename several times per save, and build tools touch the same file
//! many times per second. The scheduler coalesces this noise into at
//! most one pending entry per path and only releases a path for backup
//! once it has been quiet for the configured idle wait. Every new event
//! for a path pushes its deadline out again, so a file being written
//! continuously is not backed up mid-write.
//!
//! The scheduler is purely a bookkeeping structure driven by explicit
//! `Instant`s; it owns no clock and spawns no tasks. The service loop
//! calls [`ChangeScheduler::notify`] as events arrive and
//! [`ChangeScheduler::take_due`] on its tick, which keeps every timing
//! decision testable without sleeping.

use crate::ignore::IgnoreFilter;
use crate::types::{ChangeEvent, ChangeKind};
use crate::utils::is_in_dir;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// State of one coalesced path awaiting its quiet period
#[derive(Debug, Clone)]
struct PendingChange {
    /// Most recent event for this path
    last_event: Instant,
    /// When the path becomes eligible for backup; refreshed on every
    /// event so the quiet period restarts
    deadline: Instant,
}

/// Coalesces change events and releases paths after a quiet period
pub struct ChangeScheduler {
    idle_wait: Duration,
    ignore: Arc<dyn IgnoreFilter>,
    pending: Mutex<HashMap<PathBuf, PendingChange>>,
    accepting: AtomicBool,
}

impl std::fmt::Debug for ChangeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeScheduler")
            .field("idle_wait", &self.idle_wait)
            .field("pending", &self.pending.lock().len())
            .field("accepting", &self.accepting.load(Ordering::SeqCst))
            .finish()
    }
}

impl ChangeScheduler {
    /// Create a scheduler with the given quiet period
    pub fn new(idle_wait: Duration, ignore: Arc<dyn IgnoreFilter>) -> Self {
        ChangeScheduler {
            idle_wait,
            ignore,
            pending: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Feed one filesystem event into the scheduler
    ///
    /// Modifications create or refresh the path's pending entry. A
    /// removal cancels the entry outright: the content is gone, so a
    /// backup of it can no longer be taken, and the history that
    /// already exists is the record of the file. Directory removals
    /// cancel every pending entry underneath the directory.
    ///
    /// Events arriving after [`ChangeScheduler::stop_accepting`] are
    /// dropped.
    pub fn notify(&self, event: ChangeEvent, now: Instant) {
        if !self.accepting.load(Ordering::SeqCst) {
            trace!("Dropping event for {:?}: scheduler is draining", event.path);
            return;
        }

        match event.kind {
            ChangeKind::Modified => {
                let mut pending = self.pending.lock();
                let deadline = now + self.idle_wait;
                pending.insert(
                    event.path.clone(),
                    PendingChange {
                        last_event: now,
                        deadline,
                    },
                );
                trace!("Scheduled {:?}, quiet period restarted", event.path);
            }
            ChangeKind::Removed => self.forget(&event.path),
            ChangeKind::RemovedDir => self.forget_dir(&event.path),
        }
    }

    /// Cancel the pending entry for a removed file
    pub fn forget(&self, path: &Path) {
        if self.pending.lock().remove(path).is_some() {
            info!("Cancelled pending backup of removed {:?}", path);
        }
    }

    /// Cancel every pending entry underneath a removed directory
    pub fn forget_dir(&self, dir: &Path) {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|path, _| !is_in_dir(path, dir));
        let dropped = before - pending.len();
        if dropped > 0 {
            info!(
                "Directory {:?} removed, cancelled {} pending entries",
                dir, dropped
            );
        }
    }

    /// Remove and return every path whose quiet period has elapsed
    ///
    /// Ignore patterns are evaluated here, at fire time, not when the
    /// event arrived: a pattern list updated while an entry was pending
    /// is honored.
    pub fn take_due(&self, now: Instant) -> Vec<PathBuf> {
        let mut pending = self.pending.lock();
        let due: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, change)| change.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for path in due {
            pending.remove(&path);
            if self.ignore.is_ignored(&path) {
                debug!("Dropping due entry {:?}: matches ignore pattern", path);
            } else {
                fired.push(path);
            }
        }
        fired
    }

    /// When the earliest pending deadline expires, if any entry exists
    ///
    /// Used by the service loop to size its sleep instead of polling at
    /// a fixed rate.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.lock().values().map(|c| c.deadline).min()
    }

    /// Number of paths currently waiting out their quiet period
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Stop accepting new events; existing entries keep their deadlines
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Final flush during shutdown
    ///
    /// Returns the paths whose quiet period has already elapsed so they
    /// get their backup before the process exits, and discards entries
    /// still inside their quiet period. The discarded files are by
    /// definition being actively written; backing them up mid-write
    /// would snapshot a torn state.
    pub fn drain(&self, now: Instant) -> Vec<PathBuf> {
        self.stop_accepting();
        let fired = self.take_due(now);
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            debug!(
                "Discarding {} entries still in their quiet period",
                pending.len()
            );
            pending.clear();
        }
        fired
    }
}
