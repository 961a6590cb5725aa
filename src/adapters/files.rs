//! File adapter: on-disk formats for contexts, ciphertexts and reports.
//!
//! Context blobs are written as produced by `ContextManager` (bincode). A
//! ciphertext travels as a JSON `CiphertextEnvelope` so that its tags can be
//! inspected without the crypto backend.
//!
//! # Security
//!
//! Files holding a secret are created with mode `0600` on unix. A private
//! context is additionally sealed with a passphrase when one is configured
//! (see [`crate::domain::kdf`]).

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::domain::kdf::{self, KdfError, Passphrase};
use crate::domain::{CiphertextVector, ContextFingerprint, SchemaVersion};

/// Current envelope format.
pub const ENVELOPE_VERSION: u32 = 1;

/// Error type for file storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid base64 ciphertext: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Unsupported envelope version {found} (expected {ENVELOPE_VERSION})")]
    UnsupportedVersion { found: u32 },

    #[error("{path} is sealed: a key passphrase is required")]
    PassphraseRequired { path: PathBuf },

    #[error("Sealed file {path}: {source}")]
    Sealed {
        path: PathBuf,
        #[source]
        source: KdfError,
    },
}

/// Whether a written file holds secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    Public,
    Secret,
}

/// JSON wrapper for one ciphertext vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiphertextEnvelope {
    pub format_version: u32,
    pub schema_version: SchemaVersion,
    pub fingerprint: ContextFingerprint,
    pub slots: usize,
    pub created_at: DateTime<Utc>,
    /// Base64 of the backend ciphertext.
    pub ciphertext: String,
}

impl CiphertextEnvelope {
    #[must_use]
    pub fn wrap(vector: &CiphertextVector) -> Self {
        Self {
            format_version: ENVELOPE_VERSION,
            schema_version: vector.schema_version().clone(),
            fingerprint: vector.fingerprint().clone(),
            slots: vector.slots(),
            created_at: Utc::now(),
            ciphertext: STANDARD.encode(vector.ciphertext()),
        }
    }

    /// # Errors
    /// Returns `StoreError` on an unknown format version or bad base64.
    pub fn into_vector(self) -> Result<CiphertextVector, StoreError> {
        if self.format_version != ENVELOPE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: self.format_version,
            });
        }
        let ciphertext = STANDARD.decode(self.ciphertext.as_bytes())?;
        Ok(CiphertextVector::new(
            ciphertext,
            self.schema_version,
            self.fingerprint,
            self.slots,
        ))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write raw bytes, restricting permissions for secret material.
///
/// # Errors
/// Returns `StoreError::Io` if the file cannot be written.
pub fn write_blob(path: &Path, bytes: &[u8], sensitivity: Sensitivity) -> Result<(), StoreError> {
    #[cfg(unix)]
    if sensitivity == Sensitivity::Secret {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(io_error(path))?;
        file.write_all(bytes).map_err(io_error(path))?;
        tracing::debug!("Wrote {} secret bytes", bytes.len());
        return Ok(());
    }

    #[cfg(not(unix))]
    let _ = sensitivity;

    fs::write(path, bytes).map_err(io_error(path))?;
    tracing::debug!("Wrote {} bytes", bytes.len());
    Ok(())
}

/// # Errors
/// Returns `StoreError::Io` if the file cannot be read.
pub fn read_blob(path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(io_error(path))
}

/// Write a serialized private context, sealing it when a passphrase is given.
///
/// # Errors
/// Returns `StoreError` on sealing or I/O failure.
pub fn write_private_context(
    path: &Path,
    bytes: &[u8],
    passphrase: Option<&Passphrase>,
) -> Result<(), StoreError> {
    match passphrase {
        Some(passphrase) => {
            let sealed = kdf::seal(bytes, passphrase).map_err(|source| StoreError::Sealed {
                path: path.to_path_buf(),
                source,
            })?;
            write_blob(path, &sealed, Sensitivity::Secret)
        }
        None => {
            tracing::warn!("Private context written without a passphrase");
            write_blob(path, bytes, Sensitivity::Secret)
        }
    }
}

/// Read a private context written by [`write_private_context`].
///
/// Unsealed files are returned as-is whether or not a passphrase is given.
///
/// # Errors
/// `PassphraseRequired` for a sealed file without a passphrase, `Sealed` for
/// a wrong passphrase or tampered file, `Io` if the file cannot be read.
pub fn read_private_context(
    path: &Path,
    passphrase: Option<&Passphrase>,
) -> Result<Zeroizing<Vec<u8>>, StoreError> {
    let bytes = Zeroizing::new(read_blob(path)?);
    if !kdf::is_sealed(&bytes) {
        return Ok(bytes);
    }
    let passphrase = passphrase.ok_or_else(|| StoreError::PassphraseRequired {
        path: path.to_path_buf(),
    })?;
    kdf::open(&bytes, passphrase).map_err(|source| StoreError::Sealed {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize any value as pretty JSON.
///
/// # Errors
/// Returns `StoreError` on serialization or I/O failure.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_blob(path, &json, Sensitivity::Public)
}

/// # Errors
/// Returns `StoreError` on I/O or parse failure.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = read_blob(path)?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// # Errors
/// Returns `StoreError` on I/O failure.
pub fn write_ciphertext(path: &Path, vector: &CiphertextVector) -> Result<(), StoreError> {
    write_json(path, &CiphertextEnvelope::wrap(vector))
}

/// # Errors
/// Returns `StoreError` on I/O, parse or envelope failure.
pub fn read_ciphertext(path: &Path) -> Result<CiphertextVector, StoreError> {
    read_json::<CiphertextEnvelope>(path)?.into_vector()
}
