//! Integration tests exercising the full engine surface
//!
//! Everything here goes through the public [`vigil`] API the way the
//! CLI does: build an engine, back files up, list history, restore.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use ::vigil::*;

struct Workspace {
    temp_dir: TempDir,
    watched: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        fs::create_dir(&watched).unwrap();
        Workspace { temp_dir, watched }
    }

    fn storage(&self) -> PathBuf {
        self.temp_dir.path().join("store")
    }

    fn builder(&self) -> VigilBuilder {
        VigilBuilder::new(self.storage()).watch(&self.watched)
    }

    fn engine(&self) -> Vigil {
        self.builder().build().unwrap()
    }
}

#[test]
fn test_edit_history_and_rollback() {
    let ws = Workspace::new();
    let vigil = ws.engine();
    let file = ws.watched.join("report.md");

    // Three editing sessions
    fs::write(&file, b"# Draft\n").unwrap();
    let v1 = vigil.backup_path(&file).unwrap().unwrap();
    fs::write(&file, b"# Draft\n\nFirst section.\n").unwrap();
    let v2 = vigil.backup_path(&file).unwrap().unwrap();
    fs::write(&file, b"# Final\n\nFirst section, edited.\n").unwrap();
    let v3 = vigil.backup_path(&file).unwrap().unwrap();

    // Newest first
    let revisions = vigil.revisions(&file).unwrap();
    let hashes: Vec<&str> = revisions.iter().map(|r| r.hash.as_str()).collect();
    assert_eq!(hashes, vec![&v3.hash, &v2.hash, &v1.hash]);

    // Roll back to the first draft, then to the final again
    vigil.restore(&file, &v1.hash[..8], None).unwrap();
    assert_eq!(fs::read(&file).unwrap(), b"# Draft\n");
    vigil.restore(&file, &v3.hash[..8], None).unwrap();
    assert!(fs::read(&file).unwrap().starts_with(b"# Final"));

    // The rollbacks themselves were plain writes; history is intact.
    assert_eq!(vigil.revisions(&file).unwrap().len(), 3);
}

#[test]
fn test_deduplication_across_files_and_time() {
    let ws = Workspace::new();
    let vigil = ws.engine();

    let a = ws.watched.join("a.conf");
    let b = ws.watched.join("b.conf");
    fs::write(&a, b"shared = true\n").unwrap();
    fs::write(&b, b"shared = true\n").unwrap();

    let ha = vigil.backup_path(&a).unwrap().unwrap();
    let hb = vigil.backup_path(&b).unwrap().unwrap();
    assert_eq!(ha.hash, hb.hash);

    // Backing up unchanged content again records nothing new.
    let again = vigil.backup_path(&a).unwrap().unwrap();
    assert!(!again.created);
    assert_eq!(vigil.revisions(&a).unwrap().len(), 1);

    // But a change followed by a revert is two more history entries
    // sharing the original blob.
    fs::write(&a, b"shared = false\n").unwrap();
    vigil.backup_path(&a).unwrap().unwrap();
    fs::write(&a, b"shared = true\n").unwrap();
    let reverted = vigil.backup_path(&a).unwrap().unwrap();
    assert!(reverted.created);
    assert_eq!(reverted.hash, ha.hash);
    assert_eq!(vigil.revisions(&a).unwrap().len(), 3);
}

#[test]
fn test_storage_layout_reveals_no_filenames() {
    let ws = Workspace::new();
    let vigil = ws.engine();
    let file = ws.watched.join("very-secret-project-plan.txt");
    fs::write(&file, b"do not leak").unwrap();
    vigil.backup_path(&file).unwrap().unwrap();

    // No path component under the storage root mentions the real name.
    for entry in walkdir_paths(&ws.storage()) {
        let name = entry.file_name().unwrap().to_string_lossy();
        assert!(
            !name.contains("secret") && !name.contains("project-plan"),
            "storage entry {:?} leaks the filename",
            entry
        );
    }
}

fn walkdir_paths(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            out.push(path);
        }
    }
    out
}

#[test]
fn test_encrypted_store_full_cycle() {
    let ws = Workspace::new();
    let file = ws.watched.join("journal.txt");
    fs::write(&file, b"private thoughts").unwrap();

    let hash = {
        let vigil = ws
            .builder()
            .encryption("journal-key", "correct horse battery staple")
            .build()
            .unwrap();
        vigil.backup_path(&file).unwrap().unwrap().hash
    };

    // Reopening without the passphrase fails at open: the salt index
    // cannot be unsealed.
    assert!(matches!(
        ws.builder().build(),
        Err(VigilError::Encryption(_))
    ));

    // The right passphrase restores fine.
    let vigil = ws
        .builder()
        .encryption("journal-key", "correct horse battery staple")
        .build()
        .unwrap();
    let out = ws.temp_dir.path().join("out.txt");
    let restored = vigil.restore(&file, &hash[..8], Some(&out)).unwrap();
    assert_eq!(restored.hash, hash);
    assert_eq!(fs::read(&out).unwrap(), b"private thoughts");
}

#[test]
fn test_restore_after_deletion() {
    let ws = Workspace::new();
    let vigil = ws.engine();
    let file = ws.watched.join("doomed.txt");
    fs::write(&file, b"last words").unwrap();
    let handle = vigil.backup_path(&file).unwrap().unwrap();

    fs::remove_file(&file).unwrap();
    assert!(vigil.backup_path(&file).unwrap().is_none());

    // History outlives the file.
    vigil.restore(&file, &handle.hash[..8], None).unwrap();
    assert_eq!(fs::read(&file).unwrap(), b"last words");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_daemon_end_to_end() {
    let ws = Workspace::new();
    let vigil = ws
        .builder()
        .idle_wait(Duration::from_millis(80))
        .poll_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    let storage = ws.storage();
    let watched = ws.watched.clone();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let daemon = tokio::spawn(async move { vigil.run_daemon(shutdown_rx).await });

    // Let the watcher take its baseline, then simulate an editor
    // writing a file in a burst.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let file = watched.join("live.txt");
    for i in 0..5 {
        fs::write(&file, format!("draft {}\n", i)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Wait for the quiet period plus polling and scheduling slack.
    tokio::time::sleep(Duration::from_millis(600)).await;
    shutdown_tx.send(true).unwrap();
    daemon.await.unwrap().unwrap();

    // The burst collapsed into history ending at the final content.
    let vigil = VigilBuilder::new(&storage).watch(&watched).build().unwrap();
    let revisions = vigil.revisions(&file).unwrap();
    assert!(!revisions.is_empty());
    let restored = vigil
        .restore(&file, &revisions[0].hash, Some(&ws.temp_dir.path().join("check.txt")))
        .unwrap();
    assert_eq!(fs::read(restored.destination).unwrap(), b"draft 4\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startup_scan_picks_up_offline_changes() {
    let ws = Workspace::new();
    fs::write(ws.watched.join("existing.txt"), b"was here all along").unwrap();

    let vigil = ws
        .builder()
        .idle_wait(Duration::from_millis(50))
        .poll_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let daemon = tokio::spawn(async move { vigil.run_daemon(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(true).unwrap();
    daemon.await.unwrap().unwrap();

    let vigil = ws.engine();
    assert_eq!(
        vigil.revisions(&ws.watched.join("existing.txt")).unwrap().len(),
        1
    );
}
