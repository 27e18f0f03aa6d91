//! Filesystem watching
//!
//! The service loop consumes plain [`ChangeEvent`]s from a channel and
//! does not care how they are produced; tests inject them directly.
//! This module provides the production source: a polling watcher that
//! snapshots (modification time, length) for every file under the
//! watched roots and diffs consecutive snapshots. Polling is less
//! immediate than OS notification but behaves identically on every
//! platform and filesystem, including network mounts that drop inotify
//! events.

use crate::types::{ChangeEvent, ChangeKind, WatchedRoot};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

#[derive(Debug, Default)]
struct Snapshot {
    files: HashMap<PathBuf, FileStamp>,
    dirs: HashSet<PathBuf>,
}

fn take_snapshot(roots: &[WatchedRoot]) -> Snapshot {
    let mut snapshot = Snapshot::default();
    for root in roots {
        for entry in walkdir::WalkDir::new(&root.path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path().to_path_buf();
            if entry.file_type().is_dir() {
                snapshot.dirs.insert(path);
            } else if entry.file_type().is_file() {
                match entry.metadata() {
                    Ok(meta) => {
                        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                        snapshot.files.insert(
                            path,
                            FileStamp {
                                modified,
                                len: meta.len(),
                            },
                        );
                    }
                    Err(e) => trace!("Skipping {:?}: {}", path, e),
                }
            }
        }
    }
    snapshot
}

/// Diff two snapshots into the events the scheduler understands
fn diff(old: &Snapshot, new: &Snapshot) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (path, stamp) in &new.files {
        if old.files.get(path) != Some(stamp) {
            events.push(ChangeEvent::modified(path.clone()));
        }
    }

    let removed_dirs: Vec<&PathBuf> = old.dirs.iter().filter(|d| !new.dirs.contains(*d)).collect();
    for dir in &removed_dirs {
        events.push(ChangeEvent {
            path: (*dir).clone(),
            kind: ChangeKind::RemovedDir,
        });
    }

    for path in old.files.keys() {
        if !new.files.contains_key(path) {
            // Files under a removed directory are covered by its event.
            if removed_dirs.iter().any(|d| path.starts_with(d)) {
                continue;
            }
            events.push(ChangeEvent::removed(path.clone()));
        }
    }

    events
}

/// Produces change events by polling the watched roots
pub struct PollingWatcher {
    roots: Vec<WatchedRoot>,
    poll_interval: Duration,
    events: mpsc::Sender<ChangeEvent>,
    shutdown: watch::Receiver<bool>,
}

impl PollingWatcher {
    pub fn new(
        roots: Vec<WatchedRoot>,
        poll_interval: Duration,
        events: mpsc::Sender<ChangeEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        PollingWatcher {
            roots,
            poll_interval,
            events,
            shutdown,
        }
    }

    /// Poll until shutdown or until the event channel closes
    ///
    /// The first snapshot establishes the baseline without emitting
    /// events; the startup scan handles pre-existing files.
    pub async fn run(mut self) {
        info!(
            "Polling {} roots every {:?}",
            self.roots.len(),
            self.poll_interval
        );
        let roots = self.roots.clone();
        let mut previous = tokio::task::spawn_blocking(move || take_snapshot(&roots))
            .await
            .unwrap_or_default();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let roots = self.roots.clone();
            let current = match tokio::task::spawn_blocking(move || take_snapshot(&roots)).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Snapshot task failed: {}", e);
                    continue;
                }
            };

            for event in diff(&previous, &current) {
                debug!("Observed {:?} {:?}", event.kind, event.path);
                if self.events.send(event).await.is_err() {
                    info!("Event channel closed, watcher stopping");
                    return;
                }
            }
            previous = current;
        }
        info!("Watcher stopped");
    }
}
