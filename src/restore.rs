//! Revision resolution and restore
//!
//! Users identify revisions by hex hash prefixes, the way they would
//! with git. Resolution is scoped to one file's history: a prefix only
//! has to be unambiguous among that file's revisions, not across the
//! whole store. Ambiguity is counted over *distinct* content hashes; a
//! file whose history went a -> b -> a has two revisions with the same
//! hash, and a prefix of that hash resolves cleanly to the newest of
//! them.

use crate::error::{Result, VigilError};
use crate::store::RevisionStore;
use crate::types::{RestoredFile, Revision};
use crate::utils::atomic_write;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Resolves hash prefixes and restores revision content to disk
pub struct RestoreResolver {
    store: Arc<RevisionStore>,
}

impl RestoreResolver {
    pub fn new(store: Arc<RevisionStore>) -> Self {
        RestoreResolver { store }
    }

    /// Resolve a hash prefix against one file's history
    ///
    /// Matching is case-insensitive. The empty prefix matches every
    /// revision, which resolves successfully only when the file's
    /// history contains a single distinct content hash. Among matching
    /// revisions that share the resolved hash, the newest is returned.
    pub fn resolve(&self, real_path: &Path, prefix: &str) -> Result<Revision> {
        let needle = prefix.to_lowercase();
        // Newest first, so the first match for the resolved hash wins.
        let revisions = self.store.list_revisions(real_path)?;

        let matching: Vec<&Revision> = revisions
            .iter()
            .filter(|r| r.hash.starts_with(&needle))
            .collect();

        let distinct: BTreeSet<&str> = matching.iter().map(|r| r.hash.as_str()).collect();
        match distinct.len() {
            0 => Err(VigilError::NoMatchingRevision {
                path: real_path.to_path_buf(),
                prefix: prefix.to_string(),
            }),
            1 => Ok(matching[0].clone()),
            _ => Err(VigilError::AmbiguousHash {
                prefix: prefix.to_string(),
                candidates: distinct.into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Restore a revision of a file
    ///
    /// With no destination the real path itself is overwritten. A
    /// destination that is an existing directory receives the file
    /// under its original name; any other destination is written
    /// verbatim. The write is atomic either way.
    pub fn restore(
        &self,
        real_path: &Path,
        prefix: &str,
        destination: Option<&Path>,
    ) -> Result<RestoredFile> {
        let revision = self.resolve(real_path, prefix)?;
        let content = self.store.read_blob(&revision.hash)?;

        let target: PathBuf = match destination {
            None => real_path.to_path_buf(),
            Some(dest) if dest.is_dir() => match real_path.file_name() {
                Some(name) => dest.join(name),
                None => dest.to_path_buf(),
            },
            Some(dest) => dest.to_path_buf(),
        };

        atomic_write(&target, &content)?;
        info!(
            "Restored {:?} revision {} to {:?}",
            real_path,
            revision.short_hash(),
            target
        );
        Ok(RestoredFile {
            hash: revision.hash,
            destination: target,
        })
    }
}
