//! Cryptography provider
//!
//! Central capability for everything cryptographic in vigil:
//!
//! - **Content hashing**: SHA-256 hex digests used as blob keys
//! - **Slow path hashing**: PBKDF2-HMAC-SHA256 with a per-file salt,
//!   used by the filename obfuscator so the storage layout does not
//!   reveal which paths are backed up
//! - **Envelope sealing**: every persisted object (blob, ledger, salt
//!   index) goes through [`CryptoProvider::seal`], which compresses
//!   with LZ4 and, when a key is configured, encrypts with
//!   XChaCha20-Poly1305. The envelope header records the at-rest state
//!   per object, so data written under an earlier encryption context
//!   remains readable as whatever it was written as.
//!
//! Key material is derived from a passphrase and a key identifier; the
//! passphrase management UI is outside this crate.

use crate::error::{Result, VigilError};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Magic bytes of the storage envelope format
const ENVELOPE_MAGIC: &[u8; 4] = b"VGL1";
/// Envelope flag: payload is AEAD-encrypted
const FLAG_ENCRYPTED: u8 = 0b0000_0001;
/// XChaCha20-Poly1305 nonce length
const NONCE_LEN: usize = 24;
/// PBKDF2 rounds for the slow salted path hash
const PATH_HASH_ROUNDS: u32 = 100_000;
/// PBKDF2 rounds for passphrase-to-key derivation
const KEY_DERIVATION_ROUNDS: u32 = 100_000;

/// Compute the SHA-256 hash of content as a 64-character hex string
///
/// This is the content-addressing function: two revisions with equal
/// plaintext always produce the same hash and share one blob.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// High-level crypto interface for hashing, sealing and unsealing
///
/// Constructed once per engine; cheap to share behind an `Arc`. With no
/// key configured the provider still hashes and compresses, but refuses
/// to read encrypted objects.
pub struct CryptoProvider {
    key_id: Option<String>,
    cipher: Option<XChaCha20Poly1305>,
}

impl std::fmt::Debug for CryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoProvider")
            .field("key_id", &self.key_id)
            .field("encrypting", &self.cipher.is_some())
            .finish()
    }
}

impl CryptoProvider {
    /// A provider without encryption; objects are stored compressed
    /// but in the clear
    pub fn unencrypted() -> Self {
        CryptoProvider {
            key_id: None,
            cipher: None,
        }
    }

    /// Derive a provider from a key identifier and passphrase
    ///
    /// The 32-byte AEAD key is PBKDF2-derived from the passphrase with
    /// the key identifier as salt, so distinct key ids yield distinct
    /// keys even for an identical passphrase.
    pub fn with_passphrase(key_id: &str, passphrase: &str) -> Self {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            passphrase.as_bytes(),
            key_id.as_bytes(),
            KEY_DERIVATION_ROUNDS,
            &mut key,
        );
        debug!(key_id, "derived encryption key from passphrase");
        CryptoProvider {
            key_id: Some(key_id.to_string()),
            cipher: Some(XChaCha20Poly1305::new(Key::from_slice(&key))),
        }
    }

    /// Whether new objects will be written encrypted
    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    /// Configured key identifier, if any
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Generate a fresh 16-byte salt for a storage identifier
    pub fn generate_salt(&self) -> [u8; 16] {
        let mut salt = [0u8; 16];
        rand::rng().fill_bytes(&mut salt);
        salt
    }

    /// Slow salted one-way hash of a real path
    ///
    /// Iterated PBKDF2-HMAC-SHA256 over the path bytes. The round count
    /// makes brute-forcing a candidate path list against a stolen
    /// storage directory expensive.
    pub fn slow_path_hash(&self, path: &Path, salt: &[u8]) -> String {
        let mut out = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            path.to_string_lossy().as_bytes(),
            salt,
            PATH_HASH_ROUNDS,
            &mut out,
        );
        hex::encode(out)
    }

    /// Seal plaintext into the storage envelope
    ///
    /// Compresses, then encrypts when a key is configured. The envelope
    /// header records whether this particular object is encrypted.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let compressed = lz4_flex::compress_prepend_size(plaintext);

        let (flags, payload) = match &self.cipher {
            Some(cipher) => {
                let mut nonce = [0u8; NONCE_LEN];
                rand::rng().fill_bytes(&mut nonce);
                let ciphertext = cipher
                    .encrypt(XNonce::from_slice(&nonce), compressed.as_slice())
                    .map_err(|_| VigilError::encryption("AEAD encryption failed"))?;
                let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                payload.extend_from_slice(&nonce);
                payload.extend_from_slice(&ciphertext);
                (FLAG_ENCRYPTED, payload)
            }
            None => (0u8, compressed),
        };

        let mut out = Vec::with_capacity(5 + payload.len());
        out.extend_from_slice(ENVELOPE_MAGIC);
        out.push(flags);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Open a storage envelope, returning the original plaintext
    ///
    /// Fails with [`VigilError::Encryption`] if the object is encrypted
    /// and no key (or the wrong key) is configured, and with
    /// [`VigilError::Storage`] on a corrupt envelope.
    pub fn unseal(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 5 || &data[..4] != ENVELOPE_MAGIC {
            return Err(VigilError::storage("corrupt envelope: bad magic"));
        }
        let flags = data[4];
        let payload = &data[5..];

        let compressed = if flags & FLAG_ENCRYPTED != 0 {
            let cipher = self.cipher.as_ref().ok_or_else(|| {
                VigilError::encryption("object is encrypted but no key is configured")
            })?;
            if payload.len() < NONCE_LEN {
                return Err(VigilError::storage("corrupt envelope: truncated nonce"));
            }
            let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
            cipher
                .decrypt(XNonce::from_slice(nonce), ciphertext)
                .map_err(|_| {
                    VigilError::encryption("decryption failed (wrong key or corrupt data)")
                })?
        } else {
            payload.to_vec()
        };

        lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| VigilError::storage(format!("decompression failed: {}", e)))
    }
}
