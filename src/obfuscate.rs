//! Filename obfuscation
//!
//! Maps real paths to opaque, salted storage identifiers so that the
//! on-disk layout of the revision store reveals nothing about which
//! files are being backed up. Each real path gets a random 16-byte salt
//! (generated once and persisted) and an opaque name computed as a slow
//! salted hash of the path; the association is kept in a local salt
//! index so later resolutions are deterministic without recomputation.
//!
//! When an encryption key is configured the index file is sealed as a
//! unit. If the key is later changed, an index written under the old
//! key stays under the old key; no re-encryption pass is attempted.

use crate::crypto::CryptoProvider;
use crate::error::Result;
use crate::types::StorageIdentifier;
use crate::utils::atomic_write;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted form of the salt index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SaltIndex {
    version: u32,
    /// Real path -> identifier, ordered for stable serialization
    entries: BTreeMap<PathBuf, StorageIdentifier>,
}

/// Resolves real paths to stable opaque storage identifiers
pub struct FilenameObfuscator {
    index_path: PathBuf,
    crypto: Arc<CryptoProvider>,
    index: RwLock<SaltIndex>,
}

impl std::fmt::Debug for FilenameObfuscator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilenameObfuscator")
            .field("index_path", &self.index_path)
            .field("entries", &self.index.read().entries.len())
            .finish()
    }
}

impl FilenameObfuscator {
    /// Open the obfuscator, loading the salt index if it exists
    pub fn open(index_path: PathBuf, crypto: Arc<CryptoProvider>) -> Result<Self> {
        let index = if index_path.exists() {
            let sealed = std::fs::read(&index_path)?;
            let plaintext = crypto.unseal(&sealed)?;
            let index: SaltIndex = serde_json::from_slice(&plaintext)?;
            debug!("Loaded salt index with {} entries", index.entries.len());
            index
        } else {
            SaltIndex {
                version: 1,
                entries: BTreeMap::new(),
            }
        };

        Ok(FilenameObfuscator {
            index_path,
            crypto,
            index: RwLock::new(index),
        })
    }

    /// Resolve a real path to its storage identifier
    ///
    /// On first use for a path this generates a fresh salt, derives the
    /// opaque name and persists the index before returning, so the
    /// identifier is stable across restarts.
    pub fn resolve(&self, real_path: &Path) -> Result<StorageIdentifier> {
        if let Some(id) = self.index.read().entries.get(real_path) {
            return Ok(id.clone());
        }

        let salt = self.crypto.generate_salt();
        let name = self.crypto.slow_path_hash(real_path, &salt);
        let id = StorageIdentifier {
            salt: hex::encode(salt),
            name,
        };

        let mut index = self.index.write();
        // A concurrent resolve may have won the race; keep its entry so
        // the identifier stays stable.
        if let Some(existing) = index.entries.get(real_path) {
            return Ok(existing.clone());
        }
        index.entries.insert(real_path.to_path_buf(), id.clone());
        if let Err(e) = self.persist(&index) {
            // The cache must only hold identifiers that are on disk,
            // or a later restart would mint a different salt.
            index.entries.remove(real_path);
            return Err(e);
        }
        info!("Assigned storage identifier to {:?}", real_path);
        Ok(id)
    }

    /// All real paths known to the index, in sorted order
    pub fn known_paths(&self) -> Vec<PathBuf> {
        self.index.read().entries.keys().cloned().collect()
    }

    fn persist(&self, index: &SaltIndex) -> Result<()> {
        let plaintext = serde_json::to_vec(index)?;
        let sealed = self.crypto.seal(&plaintext)?;
        atomic_write(&self.index_path, &sealed)
    }
}
