//! Context manager: generation and (de)serialization of campaign contexts.
//!
//! A context blob is a bincode envelope holding a versioned header (format
//! version, kind, parameters, fingerprint) followed by the backend blobs.
//! On load the fingerprint is recomputed from the blobs; a blob whose
//! contents do not hash to its recorded fingerprint is rejected.

use std::sync::Arc;

use bincode::Options;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::domain::{
    ContextFingerprint, ContextParameters, CryptoError, PrivateContext, PublicContext,
    SecretMaterial,
};
use crate::ports::HomomorphicEngine;

/// Envelope format understood by this build.
pub const CONTEXT_FORMAT_VERSION: u16 = 1;

/// Upper bound on a context blob accepted by `deserialize`.
const MAX_CONTEXT_BYTES: u64 = 64 * 1024 * 1024;

/// Whether `serialize_private` writes the secret.
///
/// There is deliberately no `Default`: every caller states its intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretExport {
    /// Write the full private context. The result must stay with the key holder.
    IncludeSecret,
    /// Write only the public half; the blob loads as a public context.
    PublicOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ContextKind {
    Public,
    Private,
}

/// A deserialized context of either kind.
#[derive(Debug, Clone)]
pub enum Context {
    Public(PublicContext),
    Private(PrivateContext),
}

impl Context {
    /// The public half, whichever kind was loaded.
    #[must_use]
    pub fn public(&self) -> &PublicContext {
        match self {
            Self::Public(ctx) => ctx,
            Self::Private(ctx) => ctx.public(),
        }
    }

    #[must_use]
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }
}

#[derive(Serialize, Deserialize)]
struct ContextEnvelope {
    format_version: u16,
    kind: ContextKind,
    parameters: ContextParameters,
    fingerprint: ContextFingerprint,
    params_blob: Vec<u8>,
    public_key: Vec<u8>,
    secret: Option<Vec<u8>>,
}

impl Drop for ContextEnvelope {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_CONTEXT_BYTES)
}

/// Service for creating and persisting contexts.
pub struct ContextManager<E: HomomorphicEngine> {
    engine: Arc<E>,
}

impl<E: HomomorphicEngine> ContextManager<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Generate a fresh context pair from OS randomness.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidParameters` or `CryptoError::KeyGeneration`.
    pub fn generate(
        &self,
        parameters: &ContextParameters,
    ) -> Result<(PublicContext, PrivateContext), CryptoError> {
        let (public, private) = self.engine.generate(parameters)?;
        tracing::info!("Context {} ready", public.fingerprint());
        Ok((public, private))
    }

    /// # Errors
    /// Returns `CryptoError::Serialization` if encoding fails.
    pub fn serialize_public(&self, ctx: &PublicContext) -> Result<Vec<u8>, CryptoError> {
        Self::write_envelope(ContextKind::Public, ctx, None)
    }

    /// # Errors
    /// Returns `CryptoError::Serialization` if encoding fails.
    pub fn serialize_private(
        &self,
        ctx: &PrivateContext,
        export: SecretExport,
    ) -> Result<Vec<u8>, CryptoError> {
        match export {
            SecretExport::IncludeSecret => Self::write_envelope(
                ContextKind::Private,
                ctx.public(),
                Some(ctx.secret().as_bytes().to_vec()),
            ),
            SecretExport::PublicOnly => Self::write_envelope(ContextKind::Public, ctx.public(), None),
        }
    }

    fn write_envelope(
        kind: ContextKind,
        ctx: &PublicContext,
        secret: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, CryptoError> {
        let envelope = ContextEnvelope {
            format_version: CONTEXT_FORMAT_VERSION,
            kind,
            parameters: ctx.parameters().clone(),
            fingerprint: ctx.fingerprint().clone(),
            params_blob: ctx.params_blob().to_vec(),
            public_key: ctx.public_key().to_vec(),
            secret,
        };
        codec()
            .serialize(&envelope)
            .map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    /// Load a context blob of either kind.
    ///
    /// # Errors
    /// Returns `CryptoError::Serialization` for undecodable bytes and
    /// `CryptoError::InvalidContextFormat` for an unknown version, a
    /// fingerprint that does not match the contents, or a secret that does
    /// not match the public key.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Context, CryptoError> {
        let mut envelope: ContextEnvelope = codec()
            .deserialize(bytes)
            .map_err(|e| CryptoError::Serialization(e.to_string()))?;

        if envelope.format_version != CONTEXT_FORMAT_VERSION {
            return Err(CryptoError::InvalidContextFormat(format!(
                "unsupported context format version {} (expected {CONTEXT_FORMAT_VERSION})",
                envelope.format_version
            )));
        }
        envelope.parameters.validate()?;

        let public = PublicContext::from_parts(
            envelope.parameters.clone(),
            std::mem::take(&mut envelope.params_blob),
            std::mem::take(&mut envelope.public_key),
        );
        if public.fingerprint() != &envelope.fingerprint {
            return Err(CryptoError::InvalidContextFormat(format!(
                "fingerprint mismatch: header says {}, contents hash to {}",
                envelope.fingerprint,
                public.fingerprint()
            )));
        }

        match (envelope.kind, envelope.secret.take()) {
            (ContextKind::Public, None) => {
                tracing::debug!("Loaded public context {}", public.fingerprint());
                Ok(Context::Public(public))
            }
            (ContextKind::Private, Some(secret)) => {
                let private = self
                    .engine
                    .restore_private(public, SecretMaterial::from_bytes(secret))?;
                tracing::debug!("Loaded private context {}", private.fingerprint());
                Ok(Context::Private(private))
            }
            (ContextKind::Public, Some(mut secret)) => {
                secret.zeroize();
                Err(CryptoError::InvalidContextFormat(
                    "public context blob carries secret material".into(),
                ))
            }
            (ContextKind::Private, None) => Err(CryptoError::InvalidContextFormat(
                "private context blob has no secret material".into(),
            )),
        }
    }

    /// Load a blob that must be a public context.
    ///
    /// # Errors
    /// As [`Self::deserialize`], plus `CryptoError::InvalidContextFormat` for a
    /// private blob.
    pub fn deserialize_public(&self, bytes: &[u8]) -> Result<PublicContext, CryptoError> {
        match self.deserialize(bytes)? {
            Context::Public(ctx) => Ok(ctx),
            Context::Private(_) => Err(CryptoError::InvalidContextFormat(
                "expected a public context, found a private one".into(),
            )),
        }
    }

    /// Load a blob that must be a private context.
    ///
    /// # Errors
    /// As [`Self::deserialize`], plus `CryptoError::InvalidContextFormat` for a
    /// public blob.
    pub fn deserialize_private(&self, bytes: &[u8]) -> Result<PrivateContext, CryptoError> {
        match self.deserialize(bytes)? {
            Context::Private(ctx) => Ok(ctx),
            Context::Public(_) => Err(CryptoError::InvalidContextFormat(
                "expected a private context, found a public one".into(),
            )),
        }
    }
}
