//! Revision store
//!
//! Persists file history as two cooperating structures:
//!
//! - a **content-addressable blob store** keyed by the SHA-256 hash of
//!   the plaintext, sharded into 256 subdirectories by the first two
//!   hex characters so no single directory grows unbounded. Identical
//!   content is stored exactly once no matter how many files or
//!   revisions reference it.
//! - a **ledger per watched file**, the append-ordered list of
//!   (hash, timestamp) revisions, stored under the file's opaque name
//!   and rewritten in full on every successful backup.
//!
//! Every persisted object passes through the crypto provider's
//! envelope, so compression and at-rest encryption are uniform across
//! blobs, ledgers and the salt index. Writes use the write-temp-then-
//! rename pattern; a crash leaves either the old object or the new one.
//!
//! Concurrent backups of different files proceed in parallel; backups
//! of the same file are serialized by a per-identifier mutex so the
//! read-modify-write of the ledger cannot interleave.

use crate::crypto::{content_hash, CryptoProvider};
use crate::error::{Result, VigilError};
use crate::obfuscate::FilenameObfuscator;
use crate::types::{Revision, RevisionHandle, Ledger, StorageIdentifier, StoreMetadata};
use crate::utils::{atomic_write, ensure_dir};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

const METADATA_FILE: &str = "metadata.json";
const SALT_INDEX_FILE: &str = "salts.idx";
const BLOBS_DIR: &str = "blobs";
const LEDGERS_DIR: &str = "ledgers";

/// Content-addressable revision storage for watched files
pub struct RevisionStore {
    root: PathBuf,
    crypto: Arc<CryptoProvider>,
    obfuscator: FilenameObfuscator,
    max_blob_size: Option<u64>,
    /// Serializes ledger read-modify-write per storage identifier
    file_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for RevisionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionStore")
            .field("root", &self.root)
            .field("encrypting", &self.crypto.is_encrypting())
            .finish()
    }
}

impl RevisionStore {
    /// Open (or initialize) a store at the given directory
    pub fn open(root: PathBuf, crypto: Arc<CryptoProvider>) -> Result<Self> {
        ensure_dir(&root)?;
        ensure_dir(&root.join(BLOBS_DIR))?;
        ensure_dir(&root.join(LEDGERS_DIR))?;

        let metadata_path = root.join(METADATA_FILE);
        if metadata_path.exists() {
            let metadata: StoreMetadata =
                serde_json::from_slice(&std::fs::read(&metadata_path)?)?;
            if metadata.format_version != FORMAT_VERSION {
                return Err(VigilError::storage(format!(
                    "unsupported store format version {} (this build supports {})",
                    metadata.format_version, FORMAT_VERSION
                )));
            }
            debug!("Opened existing store at {:?}", root);
        } else {
            let metadata = StoreMetadata {
                format_version: FORMAT_VERSION,
                vigil_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: Utc::now(),
                encrypted: crypto.is_encrypting(),
            };
            atomic_write(&metadata_path, &serde_json::to_vec_pretty(&metadata)?)?;
            info!("Initialized new store at {:?}", root);
        }

        let obfuscator = FilenameObfuscator::open(root.join(SALT_INDEX_FILE), crypto.clone())?;

        Ok(RevisionStore {
            root,
            crypto,
            obfuscator,
            max_blob_size: None,
            file_locks: DashMap::new(),
        })
    }

    /// Skip files larger than the given size instead of backing them up
    pub fn with_max_blob_size(mut self, limit: Option<u64>) -> Self {
        self.max_blob_size = limit;
        self
    }

    /// Back up the current content of a file
    ///
    /// Returns `Ok(None)` when the file no longer exists by the time
    /// the backup runs; the file was deleted or moved after its change
    /// event fired, which is routine, not an error.
    ///
    /// When the content equals the file's most recent revision no new
    /// history entry is written and the returned handle has
    /// `created: false`.
    pub fn backup(&self, real_path: &Path) -> Result<Option<RevisionHandle>> {
        let content = match std::fs::read(real_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Skipping backup of vanished file {:?}", real_path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(limit) = self.max_blob_size {
            if content.len() as u64 > limit {
                warn!(
                    "Skipping {:?}: {} bytes exceeds the {} byte limit",
                    real_path,
                    content.len(),
                    limit
                );
                return Ok(None);
            }
        }
        self.backup_content(real_path, &content).map(Some)
    }

    /// Back up explicit content on behalf of a real path
    pub fn backup_content(&self, real_path: &Path, content: &[u8]) -> Result<RevisionHandle> {
        let id = self.obfuscator.resolve(real_path)?;

        let lock = self
            .file_locks
            .entry(id.name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        let hash = content_hash(content);
        self.store_blob(&hash, content)?;

        let mut ledger = self.load_ledger(&id)?;
        if let Some(head) = ledger.head() {
            if head.hash == hash {
                debug!(
                    "Content of {:?} unchanged from head revision {}",
                    real_path,
                    head.short_hash()
                );
                return Ok(RevisionHandle {
                    hash,
                    timestamp: head.timestamp,
                    created: false,
                });
            }
        }

        let revision = Revision {
            hash: hash.clone(),
            timestamp: Utc::now(),
        };
        ledger.revisions.push(revision.clone());
        self.write_ledger(&id, &ledger)?;

        info!(
            "Backed up {:?} as revision {} ({} total)",
            real_path,
            revision.short_hash(),
            ledger.revisions.len()
        );
        Ok(RevisionHandle {
            hash,
            timestamp: revision.timestamp,
            created: true,
        })
    }

    /// List a file's revisions, newest first
    ///
    /// A file with no history yields an empty list, not an error.
    pub fn list_revisions(&self, real_path: &Path) -> Result<Vec<Revision>> {
        let id = self.obfuscator.resolve(real_path)?;
        let mut revisions = self.load_ledger(&id)?.revisions;
        revisions.reverse();
        Ok(revisions)
    }

    /// Read the content of one of a file's revisions by full hash
    ///
    /// Unlike [`RevisionStore::read_blob`] this checks the hash is
    /// actually part of the file's history first, so a caller cannot
    /// read unrelated blobs through the wrong file.
    pub fn read_revision(&self, real_path: &Path, hash: &str) -> Result<Vec<u8>> {
        let needle = hash.to_lowercase();
        let revisions = self.list_revisions(real_path)?;
        if !revisions.iter().any(|r| r.hash == needle) {
            return Err(VigilError::NoMatchingRevision {
                path: real_path.to_path_buf(),
                prefix: hash.to_string(),
            });
        }
        self.read_blob(&needle)
    }

    /// Read the plaintext content of a revision by full hash
    ///
    /// Verifies the content against its hash after unsealing, so silent
    /// blob corruption surfaces here rather than in the restored file.
    pub fn read_blob(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(hash);
        let sealed = match std::fs::read(&path) {
            Ok(sealed) => sealed,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VigilError::BlobNotFound(hash.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let content = self.crypto.unseal(&sealed)?;
        if content_hash(&content) != hash.to_lowercase() {
            return Err(VigilError::storage(format!(
                "blob {} failed content verification",
                &hash[..hash.len().min(12)]
            )));
        }
        Ok(content)
    }

    /// Whether a blob with this hash exists
    pub fn blob_exists(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    /// Every real path the store has history for, in sorted order
    pub fn files(&self) -> Vec<PathBuf> {
        self.obfuscator.known_paths()
    }

    /// Storage directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        let hash = hash.to_lowercase();
        let (shard, rest) = hash.split_at(2.min(hash.len()));
        self.root.join(BLOBS_DIR).join(shard).join(rest)
    }

    fn store_blob(&self, hash: &str, content: &[u8]) -> Result<()> {
        let path = self.blob_path(hash);
        // Content-addressed: an existing blob is by definition the
        // same bytes.
        if path.exists() {
            debug!("Blob {} already present, deduplicated", &hash[..12]);
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let sealed = self.crypto.seal(content)?;
        atomic_write(&path, &sealed)
    }

    fn ledger_path(&self, id: &StorageIdentifier) -> PathBuf {
        self.root.join(LEDGERS_DIR).join(&id.name)
    }

    fn load_ledger(&self, id: &StorageIdentifier) -> Result<Ledger> {
        let path = self.ledger_path(id);
        if !path.exists() {
            return Ok(Ledger::new(id.salt.clone()));
        }
        let sealed = std::fs::read(&path)?;
        let plaintext = self.crypto.unseal(&sealed)?;
        let ledger: Ledger = serde_json::from_slice(&plaintext).map_err(|e| {
            warn!("Corrupt ledger for {}: {}", &id.name[..12], e);
            VigilError::storage(format!("corrupt ledger: {}", e))
        })?;
        Ok(ledger)
    }

    fn write_ledger(&self, id: &StorageIdentifier, ledger: &Ledger) -> Result<()> {
        let plaintext = serde_json::to_vec(ledger)?;
        let sealed = self.crypto.seal(&plaintext)?;
        atomic_write(&self.ledger_path(id), &sealed)
    }
}
