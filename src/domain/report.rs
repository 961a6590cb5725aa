//! Decrypted aggregates and their per-variant interpretation.

use serde::{Deserialize, Serialize};

use super::schema::{SchemaVersion, VariantSchema};
use super::variant::VariantSpec;

/// Errors raised while interpreting a decrypted aggregate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpretError {
    #[error("aggregate for {found} does not match schema {expected}")]
    SchemaVersionMismatch {
        expected: SchemaVersion,
        found: SchemaVersion,
    },

    #[error("aggregate has {found} variant counts, schema has {expected}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("count {count} at slot {slot} exceeds {max} alleles from {contributors} contributors")]
    CountOutOfRange {
        slot: usize,
        count: u64,
        max: u64,
        contributors: u64,
    },
}

/// Errors raised by the disclosure gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisclosureError {
    #[error("aggregate covers {contributors} contributors, policy requires at least {required}")]
    TooFewContributors { contributors: u64, required: u64 },
}

/// Decrypted aggregate: summed dosages per slot plus the contributor count
/// taken from the sentinel slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub schema_version: SchemaVersion,
    pub counts: Vec<u64>,
    pub contributor_count: u64,
}

impl AggregateResult {
    /// Split a decrypted L+1 slot vector into counts and contributor count.
    ///
    /// Returns `None` for an empty vector (no sentinel slot).
    #[must_use]
    pub fn from_slots(schema_version: SchemaVersion, mut slots: Vec<u64>) -> Option<Self> {
        let contributor_count = slots.pop()?;
        Some(Self {
            schema_version,
            counts: slots,
            contributor_count,
        })
    }

    /// Total alleles observed per slot (two per contributor).
    #[must_use]
    pub fn allele_total(&self) -> u64 {
        self.contributor_count.saturating_mul(2)
    }
}

/// Frequency of the alternate allele at one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum AlleleFrequency {
    Defined(f64),
    /// The aggregate covers zero contributors; there is nothing to divide by.
    Undefined,
}

impl AlleleFrequency {
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Defined(f) => Some(*f),
            Self::Undefined => None,
        }
    }
}

impl std::fmt::Display for AlleleFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defined(v) => write!(f, "{v:.4}"),
            Self::Undefined => write!(f, "n/a"),
        }
    }
}

/// Interpreted statistics for one schema slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantReport {
    pub slot: usize,
    pub spec: VariantSpec,
    pub alt_allele_count: u64,
    pub allele_frequency: AlleleFrequency,
}

/// Population-level report derived from one aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyReport {
    pub schema_version: SchemaVersion,
    pub contributor_count: u64,
    pub variants: Vec<VariantReport>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl FrequencyReport {
    /// Frequencies in slot order.
    #[must_use]
    pub fn frequencies(&self) -> Vec<AlleleFrequency> {
        self.variants.iter().map(|v| v.allele_frequency).collect()
    }
}

/// Minimum aggregate size the key holder is willing to release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosurePolicy {
    pub min_contributors: u64,
}

impl Default for DisclosurePolicy {
    fn default() -> Self {
        Self { min_contributors: 1 }
    }
}

impl DisclosurePolicy {
    /// # Errors
    /// Returns `DisclosureError::TooFewContributors` below the threshold.
    pub fn check(&self, contributor_count: u64) -> Result<(), DisclosureError> {
        if contributor_count < self.min_contributors {
            return Err(DisclosureError::TooFewContributors {
                contributors: contributor_count,
                required: self.min_contributors,
            });
        }
        Ok(())
    }
}

/// Turn a decrypted aggregate into per-variant allele frequencies.
///
/// `frequency[i] = counts[i] / (2 * contributor_count)`. With zero
/// contributors every frequency is [`AlleleFrequency::Undefined`].
///
/// # Errors
/// Fails when the aggregate does not belong to `schema`, or when a count
/// exceeds the number of alleles the contributors can carry, which means the
/// sum wrapped or the ciphertext was not produced by this protocol.
pub fn interpret(
    result: &AggregateResult,
    schema: &VariantSchema,
) -> Result<FrequencyReport, InterpretError> {
    if &result.schema_version != schema.version() {
        return Err(InterpretError::SchemaVersionMismatch {
            expected: schema.version().clone(),
            found: result.schema_version.clone(),
        });
    }
    if result.counts.len() != schema.len() {
        return Err(InterpretError::LengthMismatch {
            expected: schema.len(),
            found: result.counts.len(),
        });
    }

    let alleles = result.allele_total();
    let variants = result
        .counts
        .iter()
        .zip(schema.specs())
        .enumerate()
        .map(|(slot, (&count, spec))| {
            if count > alleles {
                return Err(InterpretError::CountOutOfRange {
                    slot,
                    count,
                    max: alleles,
                    contributors: result.contributor_count,
                });
            }
            let allele_frequency = if alleles == 0 {
                AlleleFrequency::Undefined
            } else {
                AlleleFrequency::Defined(count as f64 / alleles as f64)
            };
            Ok(VariantReport {
                slot,
                spec: spec.clone(),
                alt_allele_count: count,
                allele_frequency,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FrequencyReport {
        schema_version: result.schema_version.clone(),
        contributor_count: result.contributor_count,
        variants,
        generated_at: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AliasPolicy, VariantId};

    fn schema() -> VariantSchema {
        VariantSchema::define(
            "three",
            vec![
                VariantSpec::new(VariantId::named("rs1")),
                VariantSpec::new(VariantId::named("rs2")),
                VariantSpec::new(VariantId::named("rs3")),
            ],
            AliasPolicy::Strict,
        )
        .unwrap()
    }

    #[test]
    fn test_split_sentinel() {
        let s = schema();
        let r = AggregateResult::from_slots(s.version().clone(), vec![1, 2, 2, 2]).unwrap();
        assert_eq!(r.counts, vec![1, 2, 2]);
        assert_eq!(r.contributor_count, 2);
        assert!(AggregateResult::from_slots(s.version().clone(), Vec::new()).is_none());
    }

    #[test]
    fn test_frequencies() {
        let s = schema();
        let r = AggregateResult::from_slots(s.version().clone(), vec![1, 2, 2, 2]).unwrap();
        let report = interpret(&r, &s).unwrap();
        assert_eq!(
            report.frequencies(),
            vec![
                AlleleFrequency::Defined(0.25),
                AlleleFrequency::Defined(0.5),
                AlleleFrequency::Defined(0.5)
            ]
        );
        assert_eq!(report.variants[1].spec.id, VariantId::named("rs2"));
    }

    #[test]
    fn test_zero_contributors_is_undefined() {
        let s = schema();
        let r = AggregateResult::from_slots(s.version().clone(), vec![0, 0, 0, 0]).unwrap();
        let report = interpret(&r, &s).unwrap();
        assert!(report
            .frequencies()
            .iter()
            .all(|f| *f == AlleleFrequency::Undefined));
        assert_eq!(report.variants[0].allele_frequency.value(), None);
    }

    #[test]
    fn test_count_above_allele_total_rejected() {
        let s = schema();
        let r = AggregateResult::from_slots(s.version().clone(), vec![0, 5, 0, 2]).unwrap();
        assert_eq!(
            interpret(&r, &s),
            Err(InterpretError::CountOutOfRange {
                slot: 1,
                count: 5,
                max: 4,
                contributors: 2
            })
        );
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let s = schema();
        let r = AggregateResult::from_slots(s.version().clone(), vec![0, 0, 1]).unwrap();
        assert!(matches!(
            interpret(&r, &s),
            Err(InterpretError::LengthMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn test_disclosure_policy() {
        let policy = DisclosurePolicy { min_contributors: 5 };
        assert!(policy.check(5).is_ok());
        assert_eq!(
            policy.check(4),
            Err(DisclosureError::TooFewContributors {
                contributors: 4,
                required: 5
            })
        );
        assert!(DisclosurePolicy::default().check(1).is_ok());
    }
}
