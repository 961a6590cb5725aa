//! BFV adapter: Implementation of HomomorphicEngine using the `fhe` crate.
//!
//! # Key material
//!
//! The secret key is derived from a 32-byte seed drawn from the OS CSPRNG
//! (ChaCha20 keyed by the seed drives `SecretKey::random`). The seed is the
//! only secret that is ever serialized; it lives in `SecretMaterial` and is
//! zeroized on drop. The public key is generated from fresh OS randomness and
//! stored serialized in the `PublicContext`.
//!
//! # Encoding
//!
//! Vectors use SIMD (batched) encoding, one value per slot, so homomorphic
//! addition adds slot-wise. The plaintext modulus must therefore be prime and
//! `1 mod 2n`; `ContextParameters::validate` checks the congruence and the
//! `fhe` parameter builder the rest.
//!
//! # Evaluation
//!
//! `BfvEvaluator` only implements addition. Nothing in this adapter
//! multiplies ciphertexts or generates relinearization keys.

use std::sync::Arc;

use fhe::bfv::{
    BfvParameters, BfvParametersBuilder, Ciphertext, Encoding, Plaintext, PublicKey, SecretKey,
};
use fhe_traits::{
    Deserialize, DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter,
    Serialize,
};
use rand::rngs::OsRng;
use rand::{SeedableRng, TryRngCore};
use rand_chacha::ChaCha20Rng;
use zeroize::Zeroizing;

use crate::domain::{
    ContextFingerprint, ContextParameters, CryptoError, PrivateContext, PublicContext,
    SecretMaterial,
};
use crate::ports::{AdditiveEvaluator, HomomorphicEngine};

/// Length of the secret-key seed.
const SEED_LEN: usize = 32;

/// Values used to check that a secret matches a public key.
const PROBE: [u64; 4] = [1, 0, 2, 1];

/// BFV adapter for homomorphic operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct BfvAdapter;

impl BfvAdapter {
    /// Create a new BFV adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn build_parameters(parameters: &ContextParameters) -> Result<Arc<BfvParameters>, CryptoError> {
        parameters.validate()?;
        BfvParametersBuilder::new()
            .set_degree(parameters.degree)
            .set_plaintext_modulus(parameters.plaintext_modulus)
            .set_moduli_sizes(&parameters.moduli_sizes)
            .build_arc()
            .map_err(|e| CryptoError::InvalidParameters(e.to_string()))
    }

    /// Deserialize the backend parameters of a context and check them against
    /// its declared parameters and fingerprint.
    fn load_parameters(ctx: &PublicContext) -> Result<Arc<BfvParameters>, CryptoError> {
        if ContextFingerprint::of(ctx.params_blob(), ctx.public_key()) != *ctx.fingerprint() {
            return Err(CryptoError::InvalidContextFormat(
                "context fingerprint does not match its contents".into(),
            ));
        }

        let params = BfvParameters::try_deserialize(ctx.params_blob()).map_err(|e| {
            CryptoError::InvalidContextFormat(format!("Failed to deserialize parameters: {e}"))
        })?;

        let declared = ctx.parameters();
        if params.degree() != declared.degree || params.plaintext() != declared.plaintext_modulus {
            return Err(CryptoError::InvalidContextFormat(format!(
                "backend parameters (degree {}, t {}) disagree with declared (degree {}, t {})",
                params.degree(),
                params.plaintext(),
                declared.degree,
                declared.plaintext_modulus
            )));
        }
        Ok(Arc::new(params))
    }

    fn load_public_key(
        ctx: &PublicContext,
        params: &Arc<BfvParameters>,
    ) -> Result<PublicKey, CryptoError> {
        PublicKey::from_bytes(ctx.public_key(), params).map_err(|e| {
            CryptoError::InvalidContextFormat(format!("Failed to deserialize public key: {e}"))
        })
    }

    fn secret_key_from_seed(params: &Arc<BfvParameters>, seed: &[u8]) -> Result<SecretKey, CryptoError> {
        let seed: [u8; SEED_LEN] = seed.try_into().map_err(|_| {
            CryptoError::InvalidContextFormat(format!(
                "secret material must be {SEED_LEN} bytes, got {}",
                seed.len()
            ))
        })?;
        let seed = Zeroizing::new(seed);
        let mut rng = ChaCha20Rng::from_seed(*seed);
        Ok(SecretKey::random(params, &mut rng))
    }

    fn decrypt_with(
        sk: &SecretKey,
        params: &Arc<BfvParameters>,
        ciphertext: &[u8],
    ) -> Result<Vec<u64>, CryptoError> {
        let ct = Ciphertext::from_bytes(ciphertext, params).map_err(|e| {
            CryptoError::Decryption(format!("Failed to deserialize ciphertext: {e}"))
        })?;
        let pt = sk
            .try_decrypt(&ct)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        Vec::<u64>::try_decode(&pt, Encoding::simd())
            .map_err(|e| CryptoError::Decryption(format!("Failed to decode plaintext: {e}")))
    }
}

impl HomomorphicEngine for BfvAdapter {
    type Evaluator = BfvEvaluator;

    fn generate(
        &self,
        parameters: &ContextParameters,
    ) -> Result<(PublicContext, PrivateContext), CryptoError> {
        tracing::info!(
            "Generating BFV context (degree={}, t={})...",
            parameters.degree,
            parameters.plaintext_modulus
        );

        let params = Self::build_parameters(parameters)?;

        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        OsRng
            .try_fill_bytes(&mut seed[..])
            .map_err(|e| CryptoError::KeyGeneration(format!("OS randomness unavailable: {e}")))?;

        let sk = Self::secret_key_from_seed(&params, &seed[..])?;
        let pk = PublicKey::new(&sk, &mut OsRng.unwrap_err());

        let public = PublicContext::from_parts(parameters.clone(), params.to_bytes(), pk.to_bytes());
        let private = PrivateContext::new(public.clone(), SecretMaterial::from_bytes(seed.to_vec()));

        tracing::info!(
            "Generated context - fingerprint: {}, public key size: {} bytes",
            public.fingerprint(),
            public.public_key().len()
        );
        Ok((public, private))
    }

    fn encrypt(&self, values: &[u64], ctx: &PublicContext) -> Result<Vec<u8>, CryptoError> {
        let params = Self::load_parameters(ctx)?;

        if values.len() > params.degree() {
            return Err(CryptoError::Encryption(format!(
                "{} values do not fit in {} slots",
                values.len(),
                params.degree()
            )));
        }
        let t = params.plaintext();
        if let Some((slot, &value)) = values.iter().enumerate().find(|&(_, &v)| v >= t) {
            return Err(CryptoError::Encryption(format!(
                "value {value} at slot {slot} is not below the plaintext modulus {t}"
            )));
        }

        let pk = Self::load_public_key(ctx, &params)?;
        let pt = Plaintext::try_encode(values, Encoding::simd(), &params)
            .map_err(|e| CryptoError::Encryption(format!("Failed to encode plaintext: {e}")))?;
        let ct: Ciphertext = pk
            .try_encrypt(&pt, &mut OsRng.unwrap_err())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let bytes = ct.to_bytes();
        tracing::trace!("Encrypted {} slots ({} bytes)", values.len(), bytes.len());
        Ok(bytes)
    }

    fn evaluator(&self, ctx: &PublicContext) -> Result<BfvEvaluator, CryptoError> {
        let params = Self::load_parameters(ctx)?;
        Ok(BfvEvaluator { params })
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        slots: usize,
        ctx: &PrivateContext,
    ) -> Result<Vec<u64>, CryptoError> {
        tracing::debug!("Decrypting aggregate ({} slots)...", slots);

        let params = Self::load_parameters(ctx.public())?;
        let sk = Self::secret_key_from_seed(&params, ctx.secret().as_bytes())?;
        let mut values = Self::decrypt_with(&sk, &params, ciphertext)?;

        if slots > values.len() {
            return Err(CryptoError::Decryption(format!(
                "requested {slots} slots, plaintext has {}",
                values.len()
            )));
        }
        values.truncate(slots);
        Ok(values)
    }

    fn restore_private(
        &self,
        public: PublicContext,
        secret: SecretMaterial,
    ) -> Result<PrivateContext, CryptoError> {
        let params = Self::load_parameters(&public)?;
        let sk = Self::secret_key_from_seed(&params, secret.as_bytes())?;

        // The secret must open what the public key encrypts.
        let probe = self.encrypt(&PROBE, &public)?;
        let opened = Self::decrypt_with(&sk, &params, &probe)?;
        if opened.get(..PROBE.len()) != Some(&PROBE[..]) {
            return Err(CryptoError::InvalidContextFormat(
                "secret material does not match the public key".into(),
            ));
        }

        Ok(PrivateContext::new(public, secret))
    }
}

/// Addition-only evaluator over one set of BFV parameters.
#[derive(Debug, Clone)]
pub struct BfvEvaluator {
    params: Arc<BfvParameters>,
}

impl AdditiveEvaluator for BfvEvaluator {
    fn add(&self, lhs: &[u8], rhs: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let a = Ciphertext::from_bytes(lhs, &self.params).map_err(|e| {
            CryptoError::Computation(format!("Failed to deserialize left operand: {e}"))
        })?;
        let b = Ciphertext::from_bytes(rhs, &self.params).map_err(|e| {
            CryptoError::Computation(format!("Failed to deserialize right operand: {e}"))
        })?;
        Ok((&a + &b).to_bytes())
    }
}
