//! Main test module for Vigil
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end backup and restore scenarios
//! - Chaos tests for corrupted storage and crashed daemons
//! - Property-based tests for invariants

pub mod chaos;
pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use std::fs;
    use tempfile::TempDir;
    use ::vigil::*;

    fn engine(temp_dir: &TempDir, watched: &std::path::Path) -> Vigil {
        VigilBuilder::new(temp_dir.path().join("store"))
            .watch(watched)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        fs::create_dir(&watched).unwrap();
        let vigil = engine(&temp_dir, &watched);

        let file = watched.join("empty.txt");
        fs::write(&file, b"").unwrap();
        let handle = vigil.backup_path(&file).unwrap().unwrap();
        assert!(handle.created);

        fs::write(&file, b"no longer empty").unwrap();
        vigil.backup_path(&file).unwrap().unwrap();
        vigil.restore(&file, &handle.hash[..8], None).unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"");
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        fs::create_dir(&watched).unwrap();
        let vigil = engine(&temp_dir, &watched);

        for name in ["with spaces.txt", "uni-文字-码.md", "dots...everywhere", "-dash"] {
            let file = watched.join(name);
            fs::write(&file, name.as_bytes()).unwrap();
            let handle = vigil.backup_path(&file).unwrap().unwrap();
            assert!(handle.created, "backup of {:?} should create a revision", name);
            assert_eq!(vigil.revisions(&file).unwrap().len(), 1);
        }
        assert_eq!(vigil.files().len(), 4);
    }

    #[test]
    fn test_binary_content() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        fs::create_dir(&watched).unwrap();
        let vigil = engine(&temp_dir, &watched);

        let content: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let file = watched.join("blob.bin");
        fs::write(&file, &content).unwrap();
        let handle = vigil.backup_path(&file).unwrap().unwrap();

        let out = temp_dir.path().join("restored.bin");
        vigil.restore(&file, &handle.hash, Some(&out)).unwrap();
        assert_eq!(fs::read(&out).unwrap(), content);
    }

    #[test]
    fn test_relative_path_arguments_normalize() {
        let temp_dir = TempDir::new().unwrap();
        let watched = temp_dir.path().join("watched");
        fs::create_dir(&watched).unwrap();
        let vigil = engine(&temp_dir, &watched);

        let file = watched.join("doc.txt");
        fs::write(&file, b"content").unwrap();
        vigil.backup_path(&file).unwrap().unwrap();

        // A path with redundant components reaches the same ledger.
        let roundabout = watched.join("sub/../doc.txt");
        assert_eq!(vigil.revisions(&roundabout).unwrap().len(), 1);
    }
}
