//! Aggregation service: homomorphic summation of contributions.
//!
//! The aggregator holds only a public context. Every input is checked
//! against an [`AggregationReference`] before any ciphertext is touched, so a
//! failed call performs no homomorphic work at all.
//!
//! Three reduction strategies produce identical ciphertexts: BFV addition is
//! exactly associative and commutative modulo q.
//! - [`AggregationService::aggregate`]: sequential left fold
//! - [`AggregationService::aggregate_parallel`]: rayon tree reduction
//! - [`AggregationSession`]: streaming fold as contributions arrive

use std::sync::Arc;

use rayon::prelude::*;

use crate::domain::{
    CiphertextVector, ContextFingerprint, CryptoError, PublicContext, SchemaVersion, VariantSchema,
};
use crate::ports::{AdditiveEvaluator, HomomorphicEngine};

/// Error type for aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("no ciphertexts to aggregate")]
    Empty,

    #[error("contribution {index} uses schema {found}, expected {expected}")]
    SchemaVersionMismatch {
        index: usize,
        expected: SchemaVersion,
        found: SchemaVersion,
    },

    #[error("contribution {index} was encrypted under context {found}, expected {expected}")]
    ParameterMismatch {
        index: usize,
        expected: ContextFingerprint,
        found: ContextFingerprint,
    },

    #[error("contribution {index} has {found} slots, expected {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("{contributors} contributions could overflow plaintext modulus {plaintext_modulus}")]
    CapacityExceeded {
        contributors: usize,
        plaintext_modulus: u64,
    },

    #[error("reference targets context {found}, aggregator holds {expected}")]
    ContextMismatch {
        expected: ContextFingerprint,
        found: ContextFingerprint,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// What every contribution to one aggregation must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationReference {
    pub schema_version: SchemaVersion,
    pub fingerprint: ContextFingerprint,
    /// Variant slots plus the sentinel.
    pub slots: usize,
}

impl AggregationReference {
    #[must_use]
    pub fn new(schema: &VariantSchema, ctx: &PublicContext) -> Self {
        Self {
            schema_version: schema.version().clone(),
            fingerprint: ctx.fingerprint().clone(),
            slots: schema.slot_count(),
        }
    }

    fn check(&self, index: usize, ct: &CiphertextVector) -> Result<(), AggregationError> {
        if ct.schema_version() != &self.schema_version {
            return Err(AggregationError::SchemaVersionMismatch {
                index,
                expected: self.schema_version.clone(),
                found: ct.schema_version().clone(),
            });
        }
        if ct.fingerprint() != &self.fingerprint {
            return Err(AggregationError::ParameterMismatch {
                index,
                expected: self.fingerprint.clone(),
                found: ct.fingerprint().clone(),
            });
        }
        if ct.slots() != self.slots {
            return Err(AggregationError::LengthMismatch {
                index,
                expected: self.slots,
                found: ct.slots(),
            });
        }
        Ok(())
    }
}

/// Service summing contributions under one public context.
pub struct AggregationService<E: HomomorphicEngine> {
    fingerprint: ContextFingerprint,
    plaintext_modulus: u64,
    max_contributors: u64,
    evaluator: E::Evaluator,
}

impl<E: HomomorphicEngine> AggregationService<E> {
    /// # Errors
    /// Returns `CryptoError` if the context cannot be loaded by the engine.
    pub fn new(engine: Arc<E>, ctx: &PublicContext) -> Result<Self, CryptoError> {
        let evaluator = engine.evaluator(ctx)?;
        Ok(Self {
            fingerprint: ctx.fingerprint().clone(),
            plaintext_modulus: ctx.parameters().plaintext_modulus,
            max_contributors: ctx.parameters().max_contributors(),
            evaluator,
        })
    }

    /// Check every input without aggregating; one entry per rejected input.
    #[must_use]
    pub fn validate_each(
        &self,
        inputs: &[CiphertextVector],
        reference: &AggregationReference,
    ) -> Vec<(usize, AggregationError)> {
        inputs
            .iter()
            .enumerate()
            .filter_map(|(index, ct)| reference.check(index, ct).err().map(|e| (index, e)))
            .collect()
    }

    fn validate(
        &self,
        inputs: &[CiphertextVector],
        reference: &AggregationReference,
    ) -> Result<(), AggregationError> {
        if reference.fingerprint != self.fingerprint {
            return Err(AggregationError::ContextMismatch {
                expected: self.fingerprint.clone(),
                found: reference.fingerprint.clone(),
            });
        }
        if inputs.is_empty() {
            return Err(AggregationError::Empty);
        }
        for (index, ct) in inputs.iter().enumerate() {
            reference.check(index, ct)?;
        }
        self.check_capacity(inputs.len())
    }

    /// Every slot sum must stay below t: dosage slots reach `2 * N`.
    fn check_capacity(&self, contributors: usize) -> Result<(), AggregationError> {
        if contributors as u64 > self.max_contributors {
            return Err(AggregationError::CapacityExceeded {
                contributors,
                plaintext_modulus: self.plaintext_modulus,
            });
        }
        Ok(())
    }

    fn tag(reference: &AggregationReference, ciphertext: Vec<u8>) -> CiphertextVector {
        CiphertextVector::new(
            ciphertext,
            reference.schema_version.clone(),
            reference.fingerprint.clone(),
            reference.slots,
        )
    }

    /// Sum all inputs with a sequential fold.
    ///
    /// # Errors
    /// Validation errors name the offending input; `Crypto` if the backend
    /// rejects a ciphertext during addition.
    pub fn aggregate(
        &self,
        inputs: &[CiphertextVector],
        reference: &AggregationReference,
    ) -> Result<CiphertextVector, AggregationError> {
        self.validate(inputs, reference)?;
        tracing::info!(
            "Aggregating {} contributions for {}",
            inputs.len(),
            reference.schema_version
        );

        let (first, rest) = inputs.split_first().ok_or(AggregationError::Empty)?;
        let mut acc = first.ciphertext().to_vec();
        for ct in rest {
            acc = self.evaluator.add(&acc, ct.ciphertext())?;
        }
        Ok(Self::tag(reference, acc))
    }

    /// Sum all inputs with a parallel tree reduction.
    ///
    /// # Errors
    /// As [`Self::aggregate`].
    pub fn aggregate_parallel(
        &self,
        inputs: &[CiphertextVector],
        reference: &AggregationReference,
    ) -> Result<CiphertextVector, AggregationError> {
        self.validate(inputs, reference)?;
        tracing::info!(
            "Aggregating {} contributions for {} (parallel)",
            inputs.len(),
            reference.schema_version
        );

        let sum = inputs
            .par_iter()
            .map(|ct| Ok::<_, CryptoError>(ct.ciphertext().to_vec()))
            .try_reduce_with(|a, b| self.evaluator.add(&a, &b))
            .ok_or(AggregationError::Empty)??;
        Ok(Self::tag(reference, sum))
    }

    /// Start a streaming aggregation.
    ///
    /// # Errors
    /// Returns `ContextMismatch` if `reference` names another context.
    pub fn session(
        &self,
        reference: AggregationReference,
    ) -> Result<AggregationSession<'_, E>, AggregationError> {
        if reference.fingerprint != self.fingerprint {
            return Err(AggregationError::ContextMismatch {
                expected: self.fingerprint.clone(),
                found: reference.fingerprint,
            });
        }
        Ok(AggregationSession {
            service: self,
            reference,
            accumulator: None,
            accepted: 0,
            received: 0,
            rejected: Vec::new(),
        })
    }
}

/// Incremental aggregation that folds contributions as they arrive.
///
/// Each submission is validated on arrival. A rejected one is recorded with
/// its arrival index and does not affect the running sum.
pub struct AggregationSession<'a, E: HomomorphicEngine> {
    service: &'a AggregationService<E>,
    reference: AggregationReference,
    accumulator: Option<Vec<u8>>,
    accepted: usize,
    received: usize,
    rejected: Vec<(usize, AggregationError)>,
}

impl<E: HomomorphicEngine> AggregationSession<'_, E> {
    /// Fold one contribution into the running sum.
    ///
    /// # Errors
    /// Returns the reason the submission was rejected; the session stays
    /// usable.
    pub fn submit(&mut self, ct: &CiphertextVector) -> Result<(), AggregationError> {
        let index = self.received;
        self.received += 1;

        let outcome = self.fold(index, ct);
        match &outcome {
            Ok(()) => {
                self.accepted += 1;
                tracing::debug!("Accepted contribution {}", index);
            }
            Err(e) => {
                tracing::warn!("Rejected contribution {}: {}", index, e);
                self.rejected.push((index, e.clone()));
            }
        }
        outcome
    }

    fn fold(&mut self, index: usize, ct: &CiphertextVector) -> Result<(), AggregationError> {
        self.reference.check(index, ct)?;
        self.service.check_capacity(self.accepted + 1)?;

        let next = match &self.accumulator {
            None => ct.ciphertext().to_vec(),
            Some(acc) => self.service.evaluator.add(acc, ct.ciphertext())?,
        };
        self.accumulator = Some(next);
        Ok(())
    }

    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    #[must_use]
    pub fn rejected(&self) -> &[(usize, AggregationError)] {
        &self.rejected
    }

    /// Close the session and return the sum of all accepted contributions.
    ///
    /// # Errors
    /// Returns `AggregationError::Empty` if nothing was accepted.
    pub fn finish(self) -> Result<CiphertextVector, AggregationError> {
        let acc = self.accumulator.ok_or(AggregationError::Empty)?;
        tracing::info!(
            "Session closed: {} accepted, {} rejected",
            self.accepted,
            self.rejected.len()
        );
        Ok(AggregationService::<E>::tag(&self.reference, acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BfvAdapter;
    use crate::domain::{AliasPolicy, ContextParameters, PrivateContext, VariantId, VariantSpec};

    struct Fixture {
        engine: Arc<BfvAdapter>,
        public: PublicContext,
        private: PrivateContext,
        schema: VariantSchema,
    }

    impl Fixture {
        fn new() -> Self {
            let engine = Arc::new(BfvAdapter::new());
            let (public, private) = engine.generate(&ContextParameters::default()).unwrap();
            let schema = VariantSchema::define(
                "pair",
                vec![
                    VariantSpec::new(VariantId::named("rs1")),
                    VariantSpec::new(VariantId::named("rs2")),
                ],
                AliasPolicy::Strict,
            )
            .unwrap();
            Self {
                engine,
                public,
                private,
                schema,
            }
        }

        fn contribution(&self, values: [u64; 3]) -> CiphertextVector {
            let ct = self.engine.encrypt(&values, &self.public).unwrap();
            CiphertextVector::new(
                ct,
                self.schema.version().clone(),
                self.public.fingerprint().clone(),
                3,
            )
        }

        fn service(&self) -> AggregationService<BfvAdapter> {
            AggregationService::new(Arc::clone(&self.engine), &self.public).unwrap()
        }

        fn reference(&self) -> AggregationReference {
            AggregationReference::new(&self.schema, &self.public)
        }

        fn open(&self, ct: &CiphertextVector) -> Vec<u64> {
            self.engine.decrypt(ct.ciphertext(), 3, &self.private).unwrap()
        }
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let f = Fixture::new();
        let inputs: Vec<_> = [[0, 1, 1], [2, 1, 1], [1, 0, 1], [2, 2, 1]]
            .into_iter()
            .map(|v| f.contribution(v))
            .collect();
        let service = f.service();

        let seq = service.aggregate(&inputs, &f.reference()).unwrap();
        let par = service.aggregate_parallel(&inputs, &f.reference()).unwrap();
        assert_eq!(f.open(&seq), vec![5, 4, 4]);
        assert_eq!(f.open(&par), vec![5, 4, 4]);
        assert_eq!(seq.schema_version(), f.schema.version());
        assert_eq!(seq.slots(), 3);
    }

    #[test]
    fn test_empty_rejected() {
        let f = Fixture::new();
        assert_eq!(
            f.service().aggregate(&[], &f.reference()),
            Err(AggregationError::Empty)
        );
        assert_eq!(
            f.service().aggregate_parallel(&[], &f.reference()),
            Err(AggregationError::Empty)
        );
    }

    #[test]
    fn test_mismatches_name_the_index() {
        let f = Fixture::new();
        let good = f.contribution([0, 0, 1]);

        let mut wrong_len = good.clone();
        wrong_len.slots = 4;
        let err = f
            .service()
            .aggregate(&[good.clone(), wrong_len], &f.reference())
            .unwrap_err();
        assert!(matches!(err, AggregationError::LengthMismatch { index: 1, .. }));

        let mut wrong_schema = good.clone();
        wrong_schema.schema_version.digest = "ffffffffffffffff".into();
        let err = f
            .service()
            .aggregate(&[wrong_schema, good.clone()], &f.reference())
            .unwrap_err();
        assert!(matches!(
            err,
            AggregationError::SchemaVersionMismatch { index: 0, .. }
        ));

        let (other, _) = f.engine.generate(&ContextParameters::default()).unwrap();
        let mut foreign = good.clone();
        foreign.fingerprint = other.fingerprint().clone();
        let inputs = [good.clone(), good.clone(), foreign];
        let err = f.service().aggregate(&inputs, &f.reference()).unwrap_err();
        assert!(matches!(err, AggregationError::ParameterMismatch { index: 2, .. }));

        let failures = f.service().validate_each(&inputs, &f.reference());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 2);
    }

    #[test]
    fn test_inputs_untouched() {
        let f = Fixture::new();
        let inputs = vec![f.contribution([1, 2, 1]), f.contribution([1, 0, 1])];
        let before = inputs.clone();
        f.service().aggregate(&inputs, &f.reference()).unwrap();
        assert_eq!(inputs, before);
    }

    #[test]
    fn test_session_skips_rejected() {
        let f = Fixture::new();
        let service = f.service();
        let mut session = service.session(f.reference()).unwrap();

        session.submit(&f.contribution([1, 1, 1])).unwrap();
        let mut bad = f.contribution([2, 2, 1]);
        bad.slots = 2;
        assert!(session.submit(&bad).is_err());
        session.submit(&f.contribution([0, 2, 1])).unwrap();

        assert_eq!(session.accepted(), 2);
        assert_eq!(session.rejected().len(), 1);
        assert_eq!(session.rejected()[0].0, 1);

        let sum = session.finish().unwrap();
        assert_eq!(f.open(&sum), vec![1, 3, 2]);
    }

    #[test]
    fn test_empty_session() {
        let f = Fixture::new();
        let service = f.service();
        let session = service.session(f.reference()).unwrap();
        assert!(matches!(session.finish(), Err(AggregationError::Empty)));
    }

    #[test]
    fn test_capacity_boundary() {
        let f = Fixture::new();
        let service = f.service();
        let limit = ContextParameters::default().max_contributors();
        assert_eq!(service.max_contributors, limit);

        let limit = usize::try_from(limit).unwrap();
        assert_eq!(service.check_capacity(limit), Ok(()));
        assert_eq!(
            service.check_capacity(limit + 1),
            Err(AggregationError::CapacityExceeded {
                contributors: limit + 1,
                plaintext_modulus: ContextParameters::default().plaintext_modulus,
            })
        );
    }

    #[test]
    fn test_session_stops_at_capacity() {
        let f = Fixture::new();
        let service = f.service();
        let mut session = service.session(f.reference()).unwrap();
        session.submit(&f.contribution([1, 2, 1])).unwrap();

        // Pretend the rest of a full campaign has already been folded in.
        session.accepted = usize::try_from(service.max_contributors).unwrap();
        let err = session.submit(&f.contribution([2, 2, 1])).unwrap_err();
        assert!(matches!(err, AggregationError::CapacityExceeded { .. }));
        assert_eq!(session.rejected().len(), 1);
        assert_eq!(session.rejected()[0].0, 1);

        // The rejected contribution never reached the running sum.
        let sum = session.finish().unwrap();
        assert_eq!(f.open(&sum), vec![1, 2, 1]);
    }

    #[test]
    fn test_foreign_reference_rejected() {
        let f = Fixture::new();
        let (other, _) = f.engine.generate(&ContextParameters::default()).unwrap();
        let reference = AggregationReference::new(&f.schema, &other);
        let input = f.contribution([0, 0, 1]);
        assert!(matches!(
            f.service().aggregate(&[input], &reference),
            Err(AggregationError::ContextMismatch { .. })
        ));
    }
}
