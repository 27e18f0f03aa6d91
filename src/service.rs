//! Backup service loop
//!
//! Ties the scheduler to the store: receives change events from a
//! watcher over a channel, feeds them to the scheduler, and on every
//! tick dispatches the paths whose quiet period has elapsed to a
//! bounded pool of blocking backup workers. Backups of distinct files
//! run in parallel up to the configured limit; per-file errors are
//! logged and never stop the loop.
//!
//! Shutdown is cooperative: flipping the shutdown channel (or closing
//! the event channel) makes the loop stop accepting events, run the
//! backups that are already due, wait for in-flight workers, and
//! return. Entries still inside their quiet period are discarded, since
//! their files are by definition mid-write.

use crate::error::Result;
use crate::scheduler::ChangeScheduler;
use crate::store::RevisionStore;
use crate::types::{ChangeEvent, RevisionHandle, WatchedRoot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Tuning knobs for the service loop
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Quiet period a file must stay unchanged before it is backed up
    pub idle_wait: Duration,
    /// How often due entries are checked for
    pub tick_interval: Duration,
    /// Maximum backups running at once
    pub max_concurrent_backups: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            idle_wait: Duration::from_secs(5),
            tick_interval: Duration::from_millis(500),
            max_concurrent_backups: 4,
        }
    }
}

type BackupOutcome = (PathBuf, Result<Option<RevisionHandle>>);

/// The daemon's main loop
pub struct BackupService {
    store: Arc<RevisionStore>,
    scheduler: Arc<ChangeScheduler>,
    config: ServiceConfig,
    events: mpsc::Receiver<ChangeEvent>,
    shutdown: watch::Receiver<bool>,
}

impl BackupService {
    pub fn new(
        store: Arc<RevisionStore>,
        scheduler: Arc<ChangeScheduler>,
        config: ServiceConfig,
        events: mpsc::Receiver<ChangeEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        BackupService {
            store,
            scheduler,
            config,
            events,
            shutdown,
        }
    }

    /// Schedule every file currently under the watched roots
    ///
    /// Run once at startup so changes made while the daemon was down
    /// are picked up. Each file goes through the normal quiet period;
    /// unchanged files deduplicate against their head revision and cost
    /// one hash, not one new history entry.
    pub fn seed_from_scan(&self, roots: &[WatchedRoot]) -> usize {
        let now = Instant::now();
        let mut seeded = 0;
        for root in roots {
            for entry in walkdir::WalkDir::new(&root.path)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() {
                    self.scheduler
                        .notify(ChangeEvent::modified(entry.path()), now);
                    seeded += 1;
                }
            }
        }
        info!("Startup scan seeded {} files", seeded);
        seeded
    }

    /// Run until shutdown is requested, then drain
    pub async fn run(mut self) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_backups));
        let mut workers: JoinSet<BackupOutcome> = JoinSet::new();
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Backup service running (idle wait {:?}, {} workers max)",
            self.config.idle_wait, self.config.max_concurrent_backups
        );

        loop {
            tokio::select! {
                maybe_event = self.events.recv() => match maybe_event {
                    Some(event) => self.scheduler.notify(event, Instant::now()),
                    // Watcher went away; nothing more can arrive.
                    None => break,
                },
                _ = tick.tick() => {
                    for path in self.scheduler.take_due(Instant::now()) {
                        dispatch(&mut workers, &semaphore, &self.store, path).await;
                    }
                },
                Some(result) = workers.join_next(), if !workers.is_empty() => {
                    log_outcome(result);
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                },
            }
        }

        let due = self.scheduler.drain(Instant::now());
        info!(
            "Shutting down: {} due backups to flush, {} in flight",
            due.len(),
            workers.len()
        );
        for path in due {
            dispatch(&mut workers, &semaphore, &self.store, path).await;
        }
        while let Some(result) = workers.join_next().await {
            log_outcome(result);
        }
        info!("Backup service stopped");
        Ok(())
    }
}

async fn dispatch(
    workers: &mut JoinSet<BackupOutcome>,
    semaphore: &Arc<Semaphore>,
    store: &Arc<RevisionStore>,
    path: PathBuf,
) {
    // The semaphore is never closed, so acquisition only fails if the
    // runtime is tearing down.
    let permit = match semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };
    let store = store.clone();
    workers.spawn_blocking(move || {
        let _permit = permit;
        let outcome = store.backup(&path);
        (path, outcome)
    });
}

fn log_outcome(result: std::result::Result<BackupOutcome, JoinError>) {
    match result {
        Ok((path, Ok(Some(handle)))) if handle.created => {
            info!("Backed up {:?} ({})", path, &handle.hash[..12]);
        }
        Ok((path, Ok(Some(_)))) => {
            debug!("{:?} unchanged since last revision", path);
        }
        Ok((path, Ok(None))) => {
            debug!("{:?} vanished before backup ran", path);
        }
        Ok((path, Err(e))) => {
            error!("Backup of {:?} failed: {}", path, e);
        }
        Err(e) => {
            error!("Backup worker panicked: {}", e);
        }
    }
}
