//! Local analysis: plaintext report for a single genome.
//!
//! Mirrors what the encrypted protocol would compute for one contributor,
//! without any encryption. Runs on the contributor's own machine.

use serde::{Deserialize, Serialize};

use crate::domain::{
    log_odds_contribution, EncodeError, GenotypeVector, RiskLevel, SchemaVersion, VariantSchema,
    VariantSpec,
};

/// One schema slot of a local report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVariant {
    pub slot: usize,
    pub spec: VariantSpec,
    /// Number of alternate alleles carried (0, 1 or 2).
    pub genotype_count: u8,
    /// `genotype_count / 2`.
    pub allele_frequency: f64,
    pub risk_level: RiskLevel,
    /// `genotype_count * ln(odds ratio)` when the slot is weighted.
    pub log_odds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalReport {
    pub schema_version: SchemaVersion,
    pub variants: Vec<LocalVariant>,
    /// Sum of `log_odds` over weighted slots; `None` if no slot is weighted.
    pub log_odds_score: Option<f64>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl LocalReport {
    /// Slots carrying at least one alternate allele.
    pub fn carriers(&self) -> impl Iterator<Item = &LocalVariant> {
        self.variants.iter().filter(|v| v.genotype_count > 0)
    }

    /// Odds ratio implied by the summed log-odds score.
    #[must_use]
    pub fn combined_odds_ratio(&self) -> Option<f64> {
        self.log_odds_score.map(f64::exp)
    }
}

/// Build a local report from an encoded genome.
///
/// # Errors
/// Returns `EncodeError::SchemaMismatch` if `vector` was not encoded under
/// `schema`.
pub fn analyze(vector: &GenotypeVector, schema: &VariantSchema) -> Result<LocalReport, EncodeError> {
    if vector.schema_version() != schema.version() || vector.len() != schema.len() {
        return Err(EncodeError::SchemaMismatch(format!(
            "vector encoded for {}, analysis requested for {}",
            vector.schema_version(),
            schema.version()
        )));
    }

    let variants: Vec<LocalVariant> = vector
        .dosages()
        .iter()
        .zip(schema.specs())
        .enumerate()
        .map(|(slot, (&dosage, spec))| LocalVariant {
            slot,
            spec: spec.clone(),
            genotype_count: dosage,
            allele_frequency: f64::from(dosage) / 2.0,
            risk_level: RiskLevel::from_dosage(dosage),
            log_odds: log_odds_contribution(dosage, spec.weight),
        })
        .collect();

    let weighted: Vec<f64> = variants.iter().filter_map(|v| v.log_odds).collect();
    let log_odds_score = (!weighted.is_empty()).then(|| weighted.iter().sum::<f64>());

    tracing::debug!("Local analysis over {} slots", variants.len());
    Ok(LocalReport {
        schema_version: schema.version().clone(),
        variants,
        log_odds_score,
        generated_at: chrono::Utc::now(),
    })
}
