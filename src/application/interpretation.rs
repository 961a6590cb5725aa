//! Interpretation service: decrypt, gate and interpret an aggregate.
//!
//! This is the only service that touches a `PrivateContext`.

use std::sync::Arc;

use crate::domain::{
    interpret, AggregateResult, CiphertextVector, CryptoError, DisclosurePolicy, FrequencyReport,
    InterpretError, PrivateContext, VariantSchema,
};
use crate::ports::HomomorphicEngine;

pub struct InterpretationService<E: HomomorphicEngine> {
    engine: Arc<E>,
    policy: DisclosurePolicy,
}

impl<E: HomomorphicEngine> InterpretationService<E> {
    pub fn new(engine: Arc<E>, policy: DisclosurePolicy) -> Self {
        Self { engine, policy }
    }

    #[must_use]
    pub fn policy(&self) -> DisclosurePolicy {
        self.policy
    }

    /// Decrypt an aggregate into counts and contributor count.
    ///
    /// # Errors
    /// Returns `CryptoError::Decryption` if the ciphertext was produced under
    /// another context, or its slot count is impossible for the context.
    pub fn decrypt(
        &self,
        aggregate: &CiphertextVector,
        ctx: &PrivateContext,
    ) -> Result<AggregateResult, CryptoError> {
        if aggregate.fingerprint() != ctx.fingerprint() {
            return Err(CryptoError::Decryption(format!(
                "aggregate was produced under context {}, key belongs to {}",
                aggregate.fingerprint(),
                ctx.fingerprint()
            )));
        }
        let capacity = ctx.parameters().slot_count();
        if aggregate.slots() == 0 || aggregate.slots() > capacity {
            return Err(CryptoError::Decryption(format!(
                "aggregate claims {} slots, context provides 1..={capacity}",
                aggregate.slots()
            )));
        }

        let slots = self
            .engine
            .decrypt(aggregate.ciphertext(), aggregate.slots(), ctx)?;
        let result = AggregateResult::from_slots(aggregate.schema_version().clone(), slots)
            .ok_or_else(|| CryptoError::Decryption("decrypted vector is empty".into()))?;

        tracing::info!(
            "Decrypted aggregate for {} ({} contributors)",
            result.schema_version,
            result.contributor_count
        );
        Ok(result)
    }

    /// # Errors
    /// See [`interpret`].
    pub fn interpret(
        &self,
        result: &AggregateResult,
        schema: &VariantSchema,
    ) -> Result<FrequencyReport, InterpretError> {
        interpret(result, schema)
    }

    /// Decrypt, apply the disclosure policy, then interpret.
    ///
    /// # Errors
    /// `Crypto` for decryption failures, `Disclosure` when the aggregate
    /// covers too few contributors, `Interpret` for inconsistent counts.
    pub fn release(
        &self,
        aggregate: &CiphertextVector,
        ctx: &PrivateContext,
        schema: &VariantSchema,
    ) -> crate::Result<FrequencyReport> {
        let result = self.decrypt(aggregate, ctx)?;
        self.policy.check(result.contributor_count)?;
        Ok(self.interpret(&result, schema)?)
    }
}
