//! Variant identities and per-variant clinical metadata.

use serde::{Deserialize, Serialize};

/// Stable identity of a genomic variant.
///
/// The same physical variant may be referenced by its dbSNP identifier in one
/// data source and by coordinates in another. The two forms never compare equal;
/// unifying them is an explicit schema decision (see [`super::AliasPolicy`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantId {
    /// Named identifier such as `rs429358`.
    Named(String),
    /// Coordinate triple: chromosome, 1-based position, alternate allele.
    Locus {
        chrom: String,
        pos: u64,
        allele: String,
    },
}

impl VariantId {
    /// Build a named identity.
    pub fn named(id: impl Into<String>) -> Self {
        Self::Named(id.into())
    }

    /// Build a coordinate identity.
    pub fn locus(chrom: impl Into<String>, pos: u64, allele: impl Into<String>) -> Self {
        Self::Locus {
            chrom: chrom.into(),
            pos,
            allele: allele.into(),
        }
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(id) => write!(f, "{id}"),
            Self::Locus { chrom, pos, allele } => write!(f, "{chrom}:{pos}:{allele}"),
        }
    }
}

/// Descriptive clinical metadata attached to a variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInfo {
    #[serde(default)]
    pub gene: Option<String>,
    #[serde(default)]
    pub risk_allele: Option<String>,
    #[serde(default)]
    pub significance: Option<String>,
    /// Human-readable position, e.g. `19:44908684`.
    #[serde(default)]
    pub position: Option<String>,
}

/// One entry of a variant schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Canonical identity of the slot.
    pub id: VariantId,

    /// Alternate identities of the same variant. Only consulted when the
    /// schema unifies aliases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<VariantId>,

    /// Effect weight (odds ratio of the risk allele).
    #[serde(default)]
    pub weight: Option<f64>,

    #[serde(default)]
    pub info: ClinicalInfo,
}

impl VariantSpec {
    /// Spec with no alias, weight or metadata.
    pub fn new(id: VariantId) -> Self {
        Self {
            id,
            aliases: Vec::new(),
            weight: None,
            info: ClinicalInfo::default(),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: VariantId) -> Self {
        self.aliases.push(alias);
        self
    }

    #[must_use]
    pub fn with_info(mut self, info: ClinicalInfo) -> Self {
        self.info = info;
        self
    }

    /// Gene symbol, or `Unknown` when the panel carries no metadata.
    #[must_use]
    pub fn gene(&self) -> &str {
        self.info.gene.as_deref().unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_and_locus_never_equal() {
        let named = VariantId::named("rs429358");
        let locus = VariantId::locus("19", 44908684, "C");
        assert_ne!(named, locus);
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(VariantId::named("rs7412").to_string(), "rs7412");
        assert_eq!(VariantId::locus("19", 44908822, "T").to_string(), "19:44908822:T");
    }

    #[test]
    fn test_untagged_json_forms() {
        let named: VariantId = serde_json::from_str(r#""rs6857""#).expect("named");
        assert_eq!(named, VariantId::named("rs6857"));

        let locus: VariantId =
            serde_json::from_str(r#"{"chrom":"19","pos":44888997,"allele":"A"}"#).expect("locus");
        assert_eq!(locus, VariantId::locus("19", 44888997, "A"));
    }

    #[test]
    fn test_unknown_gene_fallback() {
        let spec = VariantSpec::new(VariantId::named("rs1"));
        assert_eq!(spec.gene(), "Unknown");
    }
}
