//! Chaos tests: damaged storage and ungraceful shutdowns
//!
//! Vigil has to keep its promises with a storage directory that has
//! been chewed on: truncated blobs, garbage ledgers, lock files from
//! processes that no longer exist. Damage to one object must stay
//! contained to that object.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use ::vigil::*;

fn engine(temp_dir: &TempDir) -> Vigil {
    let watched = temp_dir.path().join("watched");
    if !watched.exists() {
        fs::create_dir(&watched).unwrap();
    }
    VigilBuilder::new(temp_dir.path().join("store"))
        .watch(&watched)
        .build()
        .unwrap()
}

fn blob_path(storage: &Path, hash: &str) -> PathBuf {
    storage.join("blobs").join(&hash[..2]).join(&hash[2..])
}

#[test]
fn test_truncated_blob_is_detected_and_contained() {
    let temp_dir = TempDir::new().unwrap();
    let vigil = engine(&temp_dir);
    let healthy = temp_dir.path().join("watched/healthy.txt");
    let victim = temp_dir.path().join("watched/victim.txt");
    fs::write(&healthy, b"intact content").unwrap();
    fs::write(&victim, b"this blob gets mangled").unwrap();
    let healthy_hash = vigil.backup_path(&healthy).unwrap().unwrap().hash;
    let victim_hash = vigil.backup_path(&victim).unwrap().unwrap().hash;

    // Truncate the victim's blob mid-envelope.
    let victim_blob = blob_path(&temp_dir.path().join("store"), &victim_hash);
    let bytes = fs::read(&victim_blob).unwrap();
    fs::write(&victim_blob, &bytes[..bytes.len() / 2]).unwrap();

    assert!(vigil.restore(&victim, &victim_hash[..8], None).is_err());

    // The other file is untouched.
    let out = temp_dir.path().join("out.txt");
    vigil
        .restore(&healthy, &healthy_hash[..8], Some(&out))
        .unwrap();
    assert_eq!(fs::read(&out).unwrap(), b"intact content");
}

#[test]
fn test_swapped_blob_fails_verification() {
    let temp_dir = TempDir::new().unwrap();
    let vigil = engine(&temp_dir);
    let a = temp_dir.path().join("watched/a.txt");
    let b = temp_dir.path().join("watched/b.txt");
    fs::write(&a, b"content of a").unwrap();
    fs::write(&b, b"content of b").unwrap();
    let ha = vigil.backup_path(&a).unwrap().unwrap().hash;
    let hb = vigil.backup_path(&b).unwrap().unwrap().hash;

    // Copy b's blob over a's: the envelope is valid but the content no
    // longer matches the hash it is filed under.
    let storage = temp_dir.path().join("store");
    fs::copy(blob_path(&storage, &hb), blob_path(&storage, &ha)).unwrap();

    match vigil.restore(&a, &ha[..8], None) {
        Err(VigilError::Storage(_)) => {}
        other => panic!("expected verification failure, got {:?}", other.map(|r| r.hash)),
    }
}

#[test]
fn test_corrupt_ledger_is_contained_to_its_file() {
    let temp_dir = TempDir::new().unwrap();
    let vigil = engine(&temp_dir);
    let broken = temp_dir.path().join("watched/broken.txt");
    let fine = temp_dir.path().join("watched/fine.txt");
    fs::write(&broken, b"history to lose").unwrap();
    fs::write(&fine, b"history to keep").unwrap();
    vigil.backup_path(&broken).unwrap().unwrap();
    vigil.backup_path(&fine).unwrap().unwrap();

    // Overwrite every ledger that is NOT the fine file's with noise.
    // We cannot know which opaque name belongs to which file, so mangle
    // one and check that exactly one file's history breaks.
    let ledgers_dir = temp_dir.path().join("store/ledgers");
    let mut ledgers: Vec<PathBuf> = fs::read_dir(&ledgers_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    ledgers.sort();
    assert_eq!(ledgers.len(), 2);
    fs::write(&ledgers[0], b"definitely not an envelope").unwrap();

    let outcomes = [
        vigil.revisions(&broken).is_ok(),
        vigil.revisions(&fine).is_ok(),
    ];
    assert_eq!(
        outcomes.iter().filter(|ok| **ok).count(),
        1,
        "exactly one file's history should survive"
    );
}

#[test]
fn test_stale_lock_from_crashed_daemon_is_reclaimed() {
    let temp_dir = TempDir::new().unwrap();
    let vigil = engine(&temp_dir);

    // Fake a crash: a lock file naming a PID that cannot exist.
    let lock_path = vigil.lock_path();
    fs::write(
        &lock_path,
        serde_json::json!({
            "pid": 4_000_000u32,
            "started_at": "2026-01-01T00:00:00Z"
        })
        .to_string(),
    )
    .unwrap();

    assert!(matches!(vigil.daemon_status(), DaemonStatus::Stale(_)));
    let lock = InstanceLock::acquire(&lock_path, &SignalProbe).unwrap();
    assert_eq!(lock.info().pid, std::process::id());
}

#[test]
fn test_interrupted_write_leaves_previous_revision_readable() {
    // Simulate a crash mid-backup: a stray temp file in the storage
    // tree must not confuse anything, and the last committed revision
    // stays readable.
    let temp_dir = TempDir::new().unwrap();
    let vigil = engine(&temp_dir);
    let file = temp_dir.path().join("watched/doc.txt");
    fs::write(&file, b"committed state").unwrap();
    let handle = vigil.backup_path(&file).unwrap().unwrap();

    let ledgers_dir = temp_dir.path().join("store/ledgers");
    fs::write(ledgers_dir.join(".tmpXYZ123"), b"half-written garbage").unwrap();

    let out = temp_dir.path().join("out.txt");
    vigil.restore(&file, &handle.hash[..8], Some(&out)).unwrap();
    assert_eq!(fs::read(&out).unwrap(), b"committed state");
    assert_eq!(vigil.revisions(&file).unwrap().len(), 1);
}

#[test]
fn test_unknown_format_version_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    {
        let _ = engine(&temp_dir);
    }
    let metadata_path = temp_dir.path().join("store/metadata.json");
    let mut metadata: serde_json::Value =
        serde_json::from_slice(&fs::read(&metadata_path).unwrap()).unwrap();
    metadata["format_version"] = serde_json::json!(99);
    fs::write(&metadata_path, metadata.to_string()).unwrap();

    let result = VigilBuilder::new(temp_dir.path().join("store"))
        .watch(temp_dir.path().join("watched"))
        .build();
    assert!(matches!(result, Err(VigilError::Storage(_))));
}
