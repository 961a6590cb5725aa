//! Genotype records and the schema-ordered dosage vector built from them.
//!
//! # Missing calls
//!
//! A site whose genotype has any uncalled allele (`./.`, `0/.`) is encoded as
//! dosage 0, the same as homozygous reference. This is a deliberate policy: it
//! keeps every vector total over the schema, at the cost of biasing allele
//! frequencies downward for sites that are poorly called across contributors.
//! A variant absent from the genome is likewise encoded as 0 and is not an
//! error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::schema::{SchemaVersion, VariantSchema};
use super::variant::VariantId;

/// Largest dosage a diploid site can carry.
pub const MAX_DOSAGE: u8 = 2;

/// Errors raised while encoding a genome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("dosage {value} at slot {slot} is outside 0..=2")]
    InvalidDosage { slot: usize, value: u8 },
}

/// Per-sample genotype call: one allele index per chromosome copy, `None`
/// where the caller emitted `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genotype {
    pub alleles: Vec<Option<u32>>,
}

impl Genotype {
    pub fn new(alleles: Vec<Option<u32>>) -> Self {
        Self { alleles }
    }

    /// Parse a VCF `GT` value such as `0/1`, `1|1` or `./.`.
    #[must_use]
    pub fn parse(gt: &str) -> Self {
        let alleles = gt
            .split(['/', '|'])
            .map(|a| a.trim().parse::<u32>().ok())
            .collect();
        Self { alleles }
    }

    /// True when at least one allele is uncalled (or the call is empty).
    #[must_use]
    pub fn has_missing(&self) -> bool {
        self.alleles.is_empty() || self.alleles.iter().any(Option::is_none)
    }

    /// Number of called non-reference alleles, capped at [`MAX_DOSAGE`].
    /// Any missing allele yields 0 (see module docs).
    #[must_use]
    pub fn dosage(&self) -> u8 {
        if self.has_missing() {
            return 0;
        }
        let alt = self
            .alleles
            .iter()
            .filter(|a| matches!(a, Some(idx) if *idx > 0))
            .count();
        alt.min(MAX_DOSAGE as usize) as u8
    }
}

/// One parsed variant call for a single sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    /// dbSNP-style identifier; `.` in VCF is stored as `None`.
    pub id: Option<String>,
    pub chrom: String,
    pub pos: u64,
    pub alts: Vec<String>,
    pub genotype: Genotype,
}

impl VariantRecord {
    /// Identities under which this record can be found: the named id when
    /// present, and the coordinate triple built from the first alternate allele.
    pub fn identities(&self) -> impl Iterator<Item = VariantId> + '_ {
        let named = self
            .id
            .as_deref()
            .filter(|id| !id.is_empty() && *id != ".")
            .map(VariantId::named);
        let locus = self
            .alts
            .first()
            .map(|alt| VariantId::locus(self.chrom.clone(), self.pos, alt.clone()));
        named.into_iter().chain(locus)
    }
}

/// Schema-ordered dosages of one contributor. Write-once.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenotypeVector {
    schema_version: SchemaVersion,
    dosages: Vec<u8>,
}

impl GenotypeVector {
    /// Wrap raw dosages produced elsewhere, validating them against `schema`.
    ///
    /// # Errors
    /// Returns [`EncodeError::SchemaMismatch`] on a length mismatch and
    /// [`EncodeError::InvalidDosage`] for values above 2.
    pub fn from_dosages(dosages: Vec<u8>, schema: &VariantSchema) -> Result<Self, EncodeError> {
        if dosages.len() != schema.len() {
            return Err(EncodeError::SchemaMismatch(format!(
                "expected {} dosages for schema {}, got {}",
                schema.len(),
                schema.version(),
                dosages.len()
            )));
        }
        if let Some((slot, &value)) = dosages.iter().enumerate().find(|&(_, &d)| d > MAX_DOSAGE) {
            return Err(EncodeError::InvalidDosage { slot, value });
        }
        Ok(Self {
            schema_version: schema.version().clone(),
            dosages,
        })
    }

    #[must_use]
    pub fn schema_version(&self) -> &SchemaVersion {
        &self.schema_version
    }

    #[must_use]
    pub fn dosages(&self) -> &[u8] {
        &self.dosages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dosages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dosages.is_empty()
    }
}

// Dosages are genotype data; keep them out of logs.
impl std::fmt::Debug for GenotypeVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenotypeVector")
            .field("schema_version", &self.schema_version)
            .field("len", &self.dosages.len())
            .finish()
    }
}

/// Encode a genome into the slot order of `schema`.
///
/// Later records override earlier ones that share an identity. Each slot takes
/// the dosage of its canonical identity, then of its aliases when the schema
/// unifies them, and 0 when none is present.
///
/// # Errors
/// Returns [`EncodeError::SchemaMismatch`] only when the schema is malformed.
pub fn encode<I>(records: I, schema: &VariantSchema) -> Result<GenotypeVector, EncodeError>
where
    I: IntoIterator<Item = VariantRecord>,
{
    if schema.is_empty() {
        return Err(EncodeError::SchemaMismatch(format!(
            "schema {} has no variant slots",
            schema.version()
        )));
    }

    let mut by_identity: HashMap<VariantId, u8> = HashMap::new();
    let mut seen = 0usize;
    for record in records {
        let dosage = record.genotype.dosage();
        for id in record.identities() {
            by_identity.insert(id, dosage);
        }
        seen += 1;
    }

    let dosages: Vec<u8> = (0..schema.len())
        .map(|slot| {
            schema
                .slot_identities(slot)
                .find_map(|id| by_identity.get(id).copied())
                .unwrap_or(0)
        })
        .collect();

    let found = (0..schema.len())
        .filter(|&slot| schema.slot_identities(slot).any(|id| by_identity.contains_key(id)))
        .count();
    tracing::debug!(
        schema = %schema.version(),
        records = seen,
        matched_slots = found,
        "Encoded genome"
    );

    Ok(GenotypeVector {
        schema_version: schema.version().clone(),
        dosages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AliasPolicy, VariantSpec};

    fn record(id: Option<&str>, chrom: &str, pos: u64, alt: &str, gt: &str) -> VariantRecord {
        VariantRecord {
            id: id.map(str::to_string),
            chrom: chrom.into(),
            pos,
            alts: vec![alt.into()],
            genotype: Genotype::parse(gt),
        }
    }

    fn schema(policy: AliasPolicy) -> VariantSchema {
        VariantSchema::define(
            "t",
            vec![
                VariantSpec::new(VariantId::named("rs429358"))
                    .with_alias(VariantId::locus("19", 44908684, "C")),
                VariantSpec::new(VariantId::named("rs7412")),
                VariantSpec::new(VariantId::locus("19", 44892362, "G")),
            ],
            policy,
        )
        .unwrap()
    }

    #[test]
    fn test_dosage_values() {
        assert_eq!(Genotype::parse("0/0").dosage(), 0);
        assert_eq!(Genotype::parse("0|1").dosage(), 1);
        assert_eq!(Genotype::parse("1/1").dosage(), 2);
        assert_eq!(Genotype::parse("1").dosage(), 1);
        assert_eq!(Genotype::parse("1/2").dosage(), 2);
        assert_eq!(Genotype::parse("1/1/1").dosage(), 2);
    }

    #[test]
    fn test_missing_allele_is_reference() {
        assert_eq!(Genotype::parse("./.").dosage(), 0);
        assert_eq!(Genotype::parse("1/.").dosage(), 0);
        assert_eq!(Genotype::parse("").dosage(), 0);
        assert!(Genotype::parse(".|1").has_missing());
    }

    #[test]
    fn test_encode_by_named_and_locus() {
        let genome = vec![
            record(Some("rs429358"), "19", 44908684, "C", "0/1"),
            record(Some("."), "19", 44892362, "G", "1/1"),
        ];
        let v = encode(genome, &schema(AliasPolicy::Strict)).unwrap();
        assert_eq!(v.dosages(), &[1, 0, 2]);
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn test_absent_variant_is_zero() {
        let v = encode(Vec::new(), &schema(AliasPolicy::Strict)).unwrap();
        assert_eq!(v.dosages(), &[0, 0, 0]);
    }

    #[test]
    fn test_alias_only_used_when_unified() {
        let genome = vec![record(None, "19", 44908684, "C", "1/1")];
        let strict = encode(genome.clone(), &schema(AliasPolicy::Strict)).unwrap();
        assert_eq!(strict.dosages(), &[0, 0, 0]);
        let unified = encode(genome, &schema(AliasPolicy::Unify)).unwrap();
        assert_eq!(unified.dosages(), &[2, 0, 0]);
    }

    #[test]
    fn test_canonical_identity_wins_over_alias() {
        let genome = vec![
            record(None, "19", 44908684, "C", "1/1"),
            record(Some("rs429358"), "19", 1, "T", "0/1"),
        ];
        let v = encode(genome, &schema(AliasPolicy::Unify)).unwrap();
        assert_eq!(v.dosages()[0], 1);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let genome = vec![
            record(Some("rs7412"), "19", 44908822, "T", "0/1"),
            record(Some("rs429358"), "19", 44908684, "C", "1/1"),
        ];
        let s = schema(AliasPolicy::Strict);
        let a = encode(genome.clone(), &s).unwrap();
        let b = encode(genome, &s).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_dosages_validates() {
        let s = schema(AliasPolicy::Strict);
        assert!(GenotypeVector::from_dosages(vec![0, 1, 2], &s).is_ok());
        assert!(matches!(
            GenotypeVector::from_dosages(vec![0, 1], &s),
            Err(EncodeError::SchemaMismatch(_))
        ));
        assert_eq!(
            GenotypeVector::from_dosages(vec![0, 3, 0], &s),
            Err(EncodeError::InvalidDosage { slot: 1, value: 3 })
        );
    }

    #[test]
    fn test_debug_hides_dosages() {
        let s = schema(AliasPolicy::Strict);
        let v = GenotypeVector::from_dosages(vec![2, 1, 2], &s).unwrap();
        let out = format!("{v:?}");
        assert!(!out.contains("[2, 1, 2]"));
        assert!(out.contains("len"));
    }
}
