//! Passphrase sealing for private context files.
//!
//! A sealed blob is `MAGIC | salt (16) | nonce (12) | AES-256-GCM ciphertext`.
//! The key is derived with Argon2id from the passphrase and salt; the magic
//! bytes are bound as associated data.
//!
//! # Security
//!
//! - Fresh random salt and nonce for every seal
//! - A wrong passphrase and a tampered blob both fail the GCM tag check
//! - Derived keys and opened plaintext are zeroized on drop

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore, TryRngCore};
use zeroize::Zeroizing;

const MAGIC: &[u8; 8] = b"GPSEAL01";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

/// Argon2id memory cost in KiB (46 MiB), one pass, one lane.
const ARGON2_MEMORY_KIB: u32 = 47_104;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KdfError {
    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Sealing failed: {0}")]
    Seal(String),

    #[error("Wrong passphrase or corrupted sealed file")]
    Open,

    #[error("Not a sealed blob")]
    InvalidFormat,

    #[error("Passphrase must not be empty")]
    EmptyPassphrase,
}

/// A non-empty passphrase, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// Trailing newlines are stripped so that secrets read from files work.
    ///
    /// # Errors
    /// Returns `KdfError::EmptyPassphrase` for an empty value.
    pub fn new(value: impl Into<String>) -> Result<Self, KdfError> {
        let mut value = Zeroizing::new(value.into());
        let trimmed = value.trim_end_matches(['\r', '\n']).len();
        value.truncate(trimmed);
        if value.is_empty() {
            return Err(KdfError::EmptyPassphrase);
        }
        Ok(Self(value))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// Whether `bytes` starts like a sealed blob.
#[must_use]
pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

fn derive_key(passphrase: &Passphrase, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, KdfError> {
    let params = Params::new(ARGON2_MEMORY_KIB, 1, 1, Some(32))
        .map_err(|e| KdfError::Derivation(e.to_string()))?;
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| KdfError::Derivation(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` under a key derived from `passphrase`.
///
/// # Errors
/// Returns `KdfError` if key derivation or encryption fails.
pub fn seal(plaintext: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, KdfError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.unwrap_err().fill_bytes(&mut salt);
    OsRng.unwrap_err().fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|e| KdfError::Seal(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: MAGIC,
            },
        )
        .map_err(|e| KdfError::Seal(e.to_string()))?;

    let mut sealed = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    sealed.extend_from_slice(MAGIC);
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a blob produced by [`seal`].
///
/// # Errors
/// `InvalidFormat` for a blob without the sealed header, `Open` for a wrong
/// passphrase or tampered contents.
pub fn open(sealed: &[u8], passphrase: &Passphrase) -> Result<Zeroizing<Vec<u8>>, KdfError> {
    if !is_sealed(sealed) || sealed.len() < HEADER_LEN {
        return Err(KdfError::InvalidFormat);
    }
    let (salt, rest) = sealed[MAGIC.len()..].split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| KdfError::Open)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: MAGIC,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| KdfError::Open)
}
