//! Homomorphic engine port: Trait for the BFV primitives the protocol uses.
//!
//! This trait abstracts the crypto library from the application logic. The
//! protocol only ever adds ciphertexts, so the evaluation handle exposes
//! addition and nothing else: there is no multiplication to call by mistake.

use crate::domain::{
    ContextParameters, CryptoError, PrivateContext, PublicContext, SecretMaterial,
};

/// Addition-only evaluation handle bound to one public context.
///
/// Operands and results are the backend's opaque ciphertext bytes. Inputs are
/// never modified.
pub trait AdditiveEvaluator: Send + Sync {
    /// Homomorphic addition of two ciphertexts.
    ///
    /// # Errors
    /// Returns `CryptoError::Computation` if either operand is not a valid
    /// ciphertext for this context.
    fn add(&self, lhs: &[u8], rhs: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Trait for homomorphic encryption operations.
///
/// Implementations provide:
/// - Context generation with CSPRNG
/// - Vector encryption under a public context
/// - An addition-only evaluator
/// - Decryption under a private context
pub trait HomomorphicEngine: Send + Sync {
    type Evaluator: AdditiveEvaluator;

    /// Generate a fresh context pair for the given parameters.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidParameters` or `CryptoError::KeyGeneration`.
    fn generate(
        &self,
        parameters: &ContextParameters,
    ) -> Result<(PublicContext, PrivateContext), CryptoError>;

    /// Encrypt plaintext slot values.
    ///
    /// # Errors
    /// Returns `CryptoError::Encryption` if the values cannot be represented
    /// under the context (too many slots, value not below the plaintext
    /// modulus).
    fn encrypt(&self, values: &[u64], ctx: &PublicContext) -> Result<Vec<u8>, CryptoError>;

    /// Build an addition-only evaluator for `ctx`.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidContextFormat` if the context is corrupt.
    fn evaluator(&self, ctx: &PublicContext) -> Result<Self::Evaluator, CryptoError>;

    /// Decrypt a ciphertext and return the first `slots` values.
    ///
    /// # Errors
    /// Returns `CryptoError::Decryption` if the ciphertext cannot be decrypted.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        slots: usize,
        ctx: &PrivateContext,
    ) -> Result<Vec<u64>, CryptoError>;

    /// Rebuild a private context from its public half and secret material,
    /// checking that they belong together.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidContextFormat` if the secret does not match.
    fn restore_private(
        &self,
        public: PublicContext,
        secret: SecretMaterial,
    ) -> Result<PrivateContext, CryptoError>;
}
