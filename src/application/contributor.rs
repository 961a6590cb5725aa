//! Contributor service: genome to encrypted contribution.
//!
//! Runs entirely inside the contributor's trust boundary. Only the
//! `CiphertextVector` it returns ever leaves.

use std::sync::Arc;

use rayon::prelude::*;

use crate::domain::{
    encode, CiphertextVector, CryptoError, GenotypeVector, PublicContext, VariantSchema,
};
use crate::ports::{GenomeSource, HomomorphicEngine};
use crate::GenopoolError;

/// Value of the trailing slot of every contribution; sums to the
/// contributor count.
pub const SENTINEL: u64 = 1;

pub struct ContributorService<E: HomomorphicEngine> {
    engine: Arc<E>,
}

impl<E: HomomorphicEngine> ContributorService<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Read a genome and encode it under `schema`.
    ///
    /// # Errors
    /// Returns `GenopoolError::Genome` if the source fails and
    /// `GenopoolError::Encode` for a malformed schema.
    pub fn encode<S: GenomeSource>(
        &self,
        source: &mut S,
        schema: &VariantSchema,
    ) -> crate::Result<GenotypeVector> {
        let records = source
            .read_records()
            .map_err(|e| GenopoolError::Genome(Box::new(e)))?;
        Ok(encode(records, schema)?)
    }

    /// Encrypt an encoded genome, appending the sentinel slot.
    ///
    /// # Errors
    /// Returns `CryptoError::Encryption` if the `L + 1` slots do not fit in
    /// the context.
    pub fn encrypt(
        &self,
        vector: &GenotypeVector,
        ctx: &PublicContext,
    ) -> Result<CiphertextVector, CryptoError> {
        let slots = vector.len() + 1;
        let capacity = ctx.parameters().slot_count();
        if slots > capacity {
            return Err(CryptoError::Encryption(format!(
                "{slots} slots requested, context provides {capacity}"
            )));
        }

        let values: Vec<u64> = vector
            .dosages()
            .iter()
            .map(|&d| u64::from(d))
            .chain(std::iter::once(SENTINEL))
            .collect();

        let ciphertext = self.engine.encrypt(&values, ctx)?;
        tracing::debug!(
            "Encrypted contribution for {} ({} slots, {} bytes)",
            vector.schema_version(),
            slots,
            ciphertext.len()
        );

        Ok(CiphertextVector::new(
            ciphertext,
            vector.schema_version().clone(),
            ctx.fingerprint().clone(),
            slots,
        ))
    }

    /// Read, encode and encrypt one genome.
    ///
    /// # Errors
    /// Any error of [`Self::encode`] or [`Self::encrypt`].
    pub fn contribute<S: GenomeSource>(
        &self,
        source: &mut S,
        schema: &VariantSchema,
        ctx: &PublicContext,
    ) -> crate::Result<CiphertextVector> {
        let vector = self.encode(source, schema)?;
        Ok(self.encrypt(&vector, ctx)?)
    }

    /// Encrypt many encoded genomes in parallel. Output order matches input.
    ///
    /// # Errors
    /// Returns the first encryption error encountered.
    pub fn encrypt_batch(
        &self,
        vectors: &[GenotypeVector],
        ctx: &PublicContext,
    ) -> Result<Vec<CiphertextVector>, CryptoError> {
        tracing::info!("Encrypting {} contributions...", vectors.len());
        vectors
            .par_iter()
            .map(|vector| self.encrypt(vector, ctx))
            .collect()
    }
}
