//! Cryptographic context and ciphertext types.
//!
//! Opaque wrappers around the serialized BFV material with the bookkeeping the
//! protocol needs: parameter descriptions, context fingerprints and the
//! schema/fingerprint tags carried next to every ciphertext.
//!
//! # Public vs private
//!
//! [`PublicContext`] and [`PrivateContext`] are distinct types. Contributor and
//! aggregator APIs only accept a `PublicContext`; the only way to obtain one from
//! a private context is [`PrivateContext::public`], which never carries the
//! secret along.
//!
//! # Memory Security
//!
//! Secret material implements `Zeroize` and `ZeroizeOnDrop` and is never shown
//! by `Debug`.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::schema::SchemaVersion;

/// Error type for cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid context parameters: {0}")]
    InvalidParameters(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Homomorphic evaluation failed: {0}")]
    Computation(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid context format: {0}")]
    InvalidContextFormat(String),
}

/// BFV scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextParameters {
    /// Ring (polynomial) degree; also the number of SIMD slots.
    pub degree: usize,
    /// Plaintext modulus. Must be prime and `1 mod 2*degree` for batching.
    pub plaintext_modulus: u64,
    /// Bit sizes of the ciphertext moduli.
    pub moduli_sizes: Vec<usize>,
}

impl Default for ContextParameters {
    fn default() -> Self {
        Self {
            degree: 4096,
            plaintext_modulus: 1_032_193,
            moduli_sizes: vec![36, 36, 37],
        }
    }
}

impl ContextParameters {
    /// Check the structural constraints of the parameters. Primality of the
    /// plaintext modulus is left to the crypto backend.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidParameters` describing the first violation.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if !self.degree.is_power_of_two() || !(1024..=32768).contains(&self.degree) {
            return Err(CryptoError::InvalidParameters(format!(
                "degree {} must be a power of two in [1024, 32768]",
                self.degree
            )));
        }
        if self.plaintext_modulus < 3 {
            return Err(CryptoError::InvalidParameters(format!(
                "plaintext modulus {} too small",
                self.plaintext_modulus
            )));
        }
        if self.plaintext_modulus % (2 * self.degree as u64) != 1 {
            return Err(CryptoError::InvalidParameters(format!(
                "plaintext modulus {} is not 1 mod {} (SIMD batching unavailable)",
                self.plaintext_modulus,
                2 * self.degree
            )));
        }
        if self.moduli_sizes.is_empty() {
            return Err(CryptoError::InvalidParameters(
                "at least one ciphertext modulus is required".into(),
            ));
        }
        Ok(())
    }

    /// Number of plaintext slots available to a vector.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.degree
    }

    /// Largest number of contributors whose summed dosages still fit below
    /// the plaintext modulus in every slot.
    #[must_use]
    pub fn max_contributors(&self) -> u64 {
        (self.plaintext_modulus - 1) / 2
    }
}

/// Identifier of one generated context: scheme configuration plus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextFingerprint(String);

impl ContextFingerprint {
    /// Fingerprint of serialized parameters and public key.
    #[must_use]
    pub fn of(params_blob: &[u8], public_key: &[u8]) -> Self {
        Self(compute_fingerprint(&[params_blob, public_key]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public half of a campaign context: encryption and addition only.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicContext {
    pub(crate) parameters: ContextParameters,
    pub(crate) fingerprint: ContextFingerprint,
    /// Serialized backend parameters.
    pub(crate) params_blob: Vec<u8>,
    /// Serialized backend public key.
    pub(crate) public_key: Vec<u8>,
}

impl PublicContext {
    /// Assemble a public context from backend blobs.
    pub fn from_parts(parameters: ContextParameters, params_blob: Vec<u8>, public_key: Vec<u8>) -> Self {
        let fingerprint = ContextFingerprint::of(&params_blob, &public_key);
        Self {
            parameters,
            fingerprint,
            params_blob,
            public_key,
        }
    }

    #[must_use]
    pub fn parameters(&self) -> &ContextParameters {
        &self.parameters
    }

    #[must_use]
    pub fn fingerprint(&self) -> &ContextFingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn params_blob(&self) -> &[u8] {
        &self.params_blob
    }

    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl std::fmt::Debug for PublicContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicContext")
            .field("parameters", &self.parameters)
            .field("fingerprint", &self.fingerprint)
            .field("public_key_bytes", &self.public_key.len())
            .finish()
    }
}

/// Backend-specific secret key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial {
    inner: Vec<u8>,
}

impl SecretMaterial {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { inner: bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("size_bytes", &self.inner.len())
            .finish()
    }
}

/// Key holder's context: everything in the public context plus the secret.
///
/// This MUST stay inside the key holder's trust boundary.
#[derive(Clone, Debug)]
pub struct PrivateContext {
    public: PublicContext,
    secret: SecretMaterial,
}

impl PrivateContext {
    pub fn new(public: PublicContext, secret: SecretMaterial) -> Self {
        Self { public, secret }
    }

    /// The public half, safe to distribute to contributors and aggregators.
    #[must_use]
    pub fn public(&self) -> &PublicContext {
        &self.public
    }

    #[must_use]
    pub fn fingerprint(&self) -> &ContextFingerprint {
        &self.public.fingerprint
    }

    #[must_use]
    pub fn parameters(&self) -> &ContextParameters {
        &self.public.parameters
    }

    #[must_use]
    pub fn secret(&self) -> &SecretMaterial {
        &self.secret
    }
}

/// Encrypted vector of L+1 slots, tagged for validation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextVector {
    /// Opaque backend ciphertext.
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) schema_version: SchemaVersion,
    pub(crate) fingerprint: ContextFingerprint,
    /// Number of meaningful slots (variants plus sentinel).
    pub(crate) slots: usize,
}

impl CiphertextVector {
    pub fn new(
        ciphertext: Vec<u8>,
        schema_version: SchemaVersion,
        fingerprint: ContextFingerprint,
        slots: usize,
    ) -> Self {
        Self {
            ciphertext,
            schema_version,
            fingerprint,
            slots,
        }
    }

    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    #[must_use]
    pub fn schema_version(&self) -> &SchemaVersion {
        &self.schema_version
    }

    #[must_use]
    pub fn fingerprint(&self) -> &ContextFingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Get the size of the ciphertext in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.ciphertext.len()
    }
}

impl std::fmt::Debug for CiphertextVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiphertextVector")
            .field("schema_version", &self.schema_version)
            .field("fingerprint", &self.fingerprint)
            .field("slots", &self.slots)
            .field("size_bytes", &self.ciphertext.len())
            .finish()
    }
}

/// Short SHA-256 identifier (first 8 bytes, hex) over the concatenated parts.
///
/// Each part is length-prefixed so that different splits of the same bytes
/// never collide.
pub(crate) fn compute_fingerprint(parts: &[&[u8]]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let result = hasher.finalize();

    result[..8].iter().map(|b| format!("{b:02x}")).collect()
}
