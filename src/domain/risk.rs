//! Single-genome risk labels used by local (unencrypted) analysis.

use serde::{Deserialize, Serialize};

/// Risk-allele load at one site for one individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Homozygous reference
    NoRiskAlleles,
    /// One risk allele
    Heterozygous,
    /// Two risk alleles
    Homozygous,
}

impl RiskLevel {
    /// Classify a dosage. Values above 2 never come out of the encoder.
    #[must_use]
    pub fn from_dosage(dosage: u8) -> Self {
        match dosage {
            0 => Self::NoRiskAlleles,
            1 => Self::Heterozygous,
            _ => Self::Homozygous,
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NoRiskAlleles => "No risk alleles",
            Self::Heterozygous => "One risk allele (heterozygous)",
            Self::Homozygous => "Two risk alleles (homozygous)",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRiskAlleles => write!(f, "NONE"),
            Self::Heterozygous => write!(f, "HET"),
            Self::Homozygous => write!(f, "HOM"),
        }
    }
}

/// Log-odds contribution of one site: `dosage * ln(odds_ratio)`.
///
/// Returns `None` when the weight is missing or not a positive finite number.
#[must_use]
pub fn log_odds_contribution(dosage: u8, odds_ratio: Option<f64>) -> Option<f64> {
    let or = odds_ratio.filter(|w| w.is_finite() && *w > 0.0)?;
    Some(f64::from(dosage) * or.ln())
}
