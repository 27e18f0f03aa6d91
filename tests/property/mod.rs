//! Property-based testing for Vigil
//!
//! Uses proptest to verify storage and resolution invariants across
//! randomly generated file contents and edit sequences.

use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;
use ::vigil::*;

/// Generate random file content
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // Small text files
        "[a-zA-Z0-9 \n]{1,1000}".prop_map(|s| s.into_bytes()),
        // Binary data
        prop::collection::vec(any::<u8>(), 0..4096),
        // Repetitive patterns that compress well
        (any::<u8>(), 1..2000usize).prop_map(|(byte, count)| vec![byte; count]),
    ]
}

/// Generate short flat filenames
fn filename_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}\\.(txt|rs|md)"
}

fn engine(temp_dir: &TempDir) -> anyhow::Result<Vigil> {
    let watched = temp_dir.path().join("watched");
    if !watched.exists() {
        fs::create_dir(&watched)?;
    }
    Ok(VigilBuilder::new(temp_dir.path().join("store"))
        .watch(&watched)
        .build()?)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Identical content always maps to one blob, whatever files or
    /// order produced it.
    #[test]
    fn prop_identical_content_shares_one_blob(
        content in content_strategy(),
        names in prop::collection::btree_set(filename_strategy(), 2..5),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let vigil = engine(&temp_dir).unwrap();

        let mut hashes = Vec::new();
        for name in &names {
            let path = temp_dir.path().join("watched").join(name);
            fs::write(&path, &content).unwrap();
            hashes.push(vigil.backup_path(&path).unwrap().unwrap().hash);
        }
        prop_assert!(hashes.windows(2).all(|w| w[0] == w[1]));

        // Exactly one blob exists for this content.
        prop_assert_eq!(&hashes[0], &content_hash(&content));
        prop_assert!(vigil.store().blob_exists(&hashes[0]));
    }

    /// Whatever was backed up restores byte for byte via its full hash.
    #[test]
    fn prop_full_hash_restore_roundtrips(
        contents in prop::collection::vec(content_strategy(), 1..6),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let vigil = engine(&temp_dir).unwrap();
        let file = temp_dir.path().join("watched/subject.txt");

        let mut expected: Vec<(String, Vec<u8>)> = Vec::new();
        for content in &contents {
            fs::write(&file, content).unwrap();
            let handle = vigil.backup_path(&file).unwrap().unwrap();
            expected.push((handle.hash, content.clone()));
        }

        let out = temp_dir.path().join("restored");
        for (hash, content) in &expected {
            let restored = vigil.restore(&file, hash, Some(&out)).unwrap();
            prop_assert_eq!(&restored.hash, hash);
            prop_assert_eq!(&fs::read(&out).unwrap(), content);
        }
    }

    /// History length equals the number of content transitions: a run
    /// of identical consecutive writes records one revision.
    #[test]
    fn prop_history_counts_transitions(
        contents in prop::collection::vec(prop_oneof![Just(b"a".to_vec()), Just(b"b".to_vec()), Just(b"c".to_vec())], 1..20),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let vigil = engine(&temp_dir).unwrap();
        let file = temp_dir.path().join("watched/toggle.txt");

        let mut transitions = 0;
        let mut previous: Option<&Vec<u8>> = None;
        for content in &contents {
            fs::write(&file, content).unwrap();
            vigil.backup_path(&file).unwrap().unwrap();
            if previous != Some(content) {
                transitions += 1;
            }
            previous = Some(content);
        }

        prop_assert_eq!(vigil.revisions(&file).unwrap().len(), transitions);
    }

    /// Every sealed envelope opens back to its plaintext, encrypted or
    /// not, and the two providers agree on the content hash.
    #[test]
    fn prop_envelope_roundtrip(content in content_strategy(), encrypt in any::<bool>()) {
        let crypto = if encrypt {
            CryptoProvider::with_passphrase("prop-key", "prop-pass")
        } else {
            CryptoProvider::unencrypted()
        };
        let sealed = crypto.seal(&content).unwrap();
        prop_assert_eq!(crypto.unseal(&sealed).unwrap(), content);
    }

    /// A distinct unambiguous prefix of any stored revision resolves to
    /// that revision's content.
    #[test]
    fn prop_distinct_prefix_resolves(
        seed in any::<u64>(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let vigil = engine(&temp_dir).unwrap();
        let file = temp_dir.path().join("watched/prefixed.txt");

        // Two contents whose hashes differ in the first character, so
        // one-character prefixes are unambiguous.
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut n = seed;
        while payloads.len() < 2 {
            let candidate = format!("payload {}", n).into_bytes();
            let first = content_hash(&candidate).chars().next().unwrap();
            if payloads
                .iter()
                .all(|p| content_hash(p).chars().next().unwrap() != first)
            {
                payloads.push(candidate);
            }
            n = n.wrapping_add(1);
        }

        let restored_to = temp_dir.path().join("out.txt");
        let mut hashes = Vec::new();
        for payload in &payloads {
            fs::write(&file, payload).unwrap();
            hashes.push(vigil.backup_path(&file).unwrap().unwrap().hash);
        }
        for (payload, hash) in payloads.iter().zip(&hashes) {
            let restored = vigil
                .restore(&file, &hash[..1], Some(&restored_to))
                .unwrap();
            prop_assert_eq!(&restored.hash, hash);
            prop_assert_eq!(&fs::read(&restored_to).unwrap(), payload);
        }
    }
}
