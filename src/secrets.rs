//! Local encrypted secret store.
//!
//! Authenticated encryption via XChaCha20-Poly1305, chosen over the more
//! common AES-GCM because its 24-byte nonce lets every secret use a fresh
//! random nonce for the lifetime of a single passphrase without a
//! birthday-bound collision risk the 12-byte AES-GCM nonce would carry at
//! this write volume. Key derivation is a single SHA-256 of the passphrase
//! bytes, a deliberate simplification. A salted KDF (e.g. `argon2`) is the
//! natural upgrade path if this store ever needs to survive a leaked
//! ciphertext corpus.

use std::{fs, io, path::PathBuf};

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    constants::{SECRETS_INDEX_FILE_NAME, SECRET_FILE_EXT},
    runtime, state_dir,
};

/// Errors raised by the secret store.
#[derive(Debug, Error)]
pub enum SecretError {
    /// Underlying I/O failure.
    #[error("secret store I/O error: {0}")]
    Io(#[from] io::Error),

    /// The secret index file contained invalid JSON.
    #[error("secret index is corrupt: {0}")]
    CorruptIndex(#[from] serde_json::Error),

    /// No secret exists under the requested name.
    #[error("no secret named '{0}'")]
    NotFound(String),

    /// The stored ciphertext was shorter than one nonce.
    #[error("secret blob for '{0}' is truncated")]
    Truncated(String),

    /// Decryption failed (wrong passphrase, corrupted ciphertext, or a tag
    /// mismatch from tampering).
    #[error("failed to decrypt secret '{0}': authentication failed")]
    DecryptionFailed(String),

    /// Sealing a new secret failed at the AEAD layer.
    #[error("failed to encrypt secret '{0}'")]
    EncryptionFailed(String),

    /// The bootstrap passphrase file could not be created or read.
    #[error("passphrase file error at {path}: {source}")]
    Passphrase {
        /// Path to the passphrase file.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

fn secrets_dir() -> PathBuf {
    runtime::state_dir().join("secrets")
}

fn passphrase_path() -> PathBuf {
    secrets_dir().join("passphrase")
}

fn index_path() -> PathBuf {
    secrets_dir().join(SECRETS_INDEX_FILE_NAME)
}

/// One entry in the on-disk secret index: the secret's name and when it was
/// last written. Kept separate from the encrypted blobs themselves so
/// `list` never needs to touch key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretIndexEntry {
    /// Secret name.
    pub name: String,
    /// UTC timestamp of the most recent `Store` call for this name.
    pub last_rotated: DateTime<Utc>,
}

/// Ordered sequence of index entries, insertion order preserved by reading
/// from the index rather than the directory, rather than a sorted map.
type SecretIndex = Vec<SecretIndexEntry>;

fn load_index() -> Result<SecretIndex, SecretError> {
    match fs::read(index_path()) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(SecretIndex::new()),
        Err(err) => Err(err.into()),
    }
}

fn save_index(index: &SecretIndex) -> Result<(), SecretError> {
    state_dir::atomic_write_json(&index_path(), index, state_dir::OWNER_ONLY_FILE_MODE)?;
    Ok(())
}

/// Inserts or updates `name`'s entry in place, preserving its original
/// position on re-store and appending on first use.
fn touch_index_entry(index: &mut SecretIndex, name: &str) {
    let now = Utc::now();
    if let Some(entry) = index.iter_mut().find(|entry| entry.name == name) {
        entry.last_rotated = now;
    } else {
        index.push(SecretIndexEntry {
            name: name.to_string(),
            last_rotated: now,
        });
    }
}

/// Creates the passphrase file (32 random bytes, hex-encoded) if it does
/// not already exist, and returns its contents either way.
fn bootstrap_passphrase() -> Result<String, SecretError> {
    let path = passphrase_path();
    if let Ok(existing) = fs::read_to_string(&path) {
        return Ok(existing.trim().to_string());
    }

    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let passphrase = hex::encode(bytes);

    state_dir::atomic_write_file(&path, passphrase.as_bytes(), state_dir::OWNER_ONLY_FILE_MODE)
        .map_err(|source| SecretError::Passphrase {
            path: path.clone(),
            source,
        })?;
    info!("bootstrapped secret-store passphrase at {}", path.display());
    Ok(passphrase)
}

fn derive_key(passphrase: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.finalize().into()
}

fn cipher_for(passphrase: &str) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new((&derive_key(passphrase)).into())
}

/// Warns if `path`'s mode is wider than owner-only. Never rejects the
/// caller's operation; this is an audit, not an enforcement gate.
fn warn_if_not_owner_only(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = fs::metadata(path) {
        let mode = metadata.permissions().mode() & 0o777;
        if mode != state_dir::OWNER_ONLY_FILE_MODE {
            warn!(
                "secret blob {} has mode {:o}, expected {:o}",
                path.display(),
                mode,
                state_dir::OWNER_ONLY_FILE_MODE
            );
        }
    }
}

/// A local, passphrase-protected store of encrypted secret values.
pub struct SecretStore {
    passphrase: String,
}

impl SecretStore {
    /// Opens the store, bootstrapping a fresh passphrase file on first use.
    pub fn open() -> Result<Self, SecretError> {
        state_dir::ensure_state_directory(&secrets_dir())?;
        let passphrase = bootstrap_passphrase()?;
        Ok(Self { passphrase })
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        secrets_dir().join(format!("{name}{SECRET_FILE_EXT}"))
    }

    /// Encrypts `value` under a fresh random nonce and stores it as `name`.
    pub fn store(&self, name: &str, value: &[u8]) -> Result<(), SecretError> {
        let cipher = cipher_for(&self.passphrase);
        let mut nonce_bytes = [0u8; 24];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, value)
            .map_err(|_| SecretError::EncryptionFailed(name.to_string()))?;

        let mut blob = Vec::with_capacity(24 + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        let blob_path = self.blob_path(name);
        state_dir::atomic_write_file(&blob_path, &blob, state_dir::OWNER_ONLY_FILE_MODE)?;
        warn_if_not_owner_only(&blob_path);

        let mut index = load_index()?;
        touch_index_entry(&mut index, name);
        save_index(&index)?;

        info!("stored secret '{name}'");
        Ok(())
    }

    /// Decrypts and returns the value stored under `name`.
    pub fn retrieve(&self, name: &str) -> Result<Vec<u8>, SecretError> {
        let blob_path = self.blob_path(name);
        warn_if_not_owner_only(&blob_path);
        let blob = fs::read(&blob_path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                SecretError::NotFound(name.to_string())
            } else {
                SecretError::Io(err)
            }
        })?;

        if blob.len() < 24 {
            return Err(SecretError::Truncated(name.to_string()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(24);
        let nonce = XNonce::from_slice(nonce_bytes);

        let cipher = cipher_for(&self.passphrase);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SecretError::DecryptionFailed(name.to_string()))
    }

    /// Removes a secret and its index entry. Missing secrets are a no-op.
    pub fn delete(&self, name: &str) -> Result<(), SecretError> {
        let path = self.blob_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let mut index = load_index()?;
        index.retain(|entry| entry.name != name);
        save_index(&index)?;
        Ok(())
    }

    /// Returns every known secret name, in insertion order.
    pub fn list(&self) -> Result<Vec<String>, SecretError> {
        Ok(load_index()?.into_iter().map(|entry| entry.name).collect())
    }

    /// Audits on-disk permissions of the secrets directory and every blob,
    /// returning the paths whose mode is wider than owner-only.
    pub fn audit_permissions(&self) -> Result<Vec<PathBuf>, SecretError> {
        use std::os::unix::fs::PermissionsExt;

        let mut offenders = Vec::new();
        let dir = secrets_dir();
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if let Ok(metadata) = fs::metadata(&path) {
                    let mode = metadata.permissions().mode() & 0o777;
                    if path.is_dir() {
                        if mode & 0o077 != 0 && mode != state_dir::STATE_DIR_MODE {
                            offenders.push(path);
                        }
                    } else if mode != state_dir::OWNER_ONLY_FILE_MODE {
                        offenders.push(path);
                    }
                }
            }
        }
        Ok(offenders)
    }
}
