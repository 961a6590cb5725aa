//! Variant schema: the fixed, ordered slot layout shared by every vector in a
//! campaign.
//!
//! A schema is immutable once defined. Its [`SchemaVersion`] is derived from the
//! name and the exact slot layout, so two schemas that disagree on even one
//! slot never carry the same version tag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::crypto::compute_fingerprint;
use super::variant::{VariantId, VariantSpec};

/// Errors raised while defining a schema. All are fatal to that schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema '{name}' defines no variants")]
    Empty { name: String },

    #[error("duplicate variant {id} at slots {first} and {second}")]
    DuplicateVariant {
        id: VariantId,
        first: usize,
        second: usize,
    },

    #[error("alias {alias} of slot {second} already identifies slot {first}")]
    AliasConflict {
        alias: VariantId,
        first: usize,
        second: usize,
    },
}

/// Whether alternate identities of a variant resolve to its slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasPolicy {
    /// Only the canonical identity of each spec is indexed.
    #[default]
    Strict,
    /// Declared aliases are indexed to their canonical slot.
    Unify,
}

/// Version tag binding a vector to one slot layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub name: String,
    pub digest: String,
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.digest)
    }
}

/// Serialized form of a schema; deserialization re-runs validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    #[serde(default)]
    pub alias_policy: AliasPolicy,
    pub variants: Vec<VariantSpec>,
}

/// Ordered catalogue of variants. Length L fixes the dimensionality of every
/// vector (L slots plus the trailing contributor sentinel).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDefinition", into = "SchemaDefinition")]
pub struct VariantSchema {
    version: SchemaVersion,
    policy: AliasPolicy,
    specs: Vec<VariantSpec>,
    index: HashMap<VariantId, usize>,
}

impl VariantSchema {
    /// Define a schema from an ordered list of specs.
    ///
    /// # Errors
    /// Returns [`SchemaError::DuplicateVariant`] if two slots share an identity,
    /// [`SchemaError::AliasConflict`] if a unified alias points at a second
    /// slot, and [`SchemaError::Empty`] for an empty list.
    pub fn define(
        name: impl Into<String>,
        specs: Vec<VariantSpec>,
        policy: AliasPolicy,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if specs.is_empty() {
            return Err(SchemaError::Empty { name });
        }

        let mut index: HashMap<VariantId, usize> = HashMap::with_capacity(specs.len());
        for (slot, spec) in specs.iter().enumerate() {
            if let Some(&first) = index.get(&spec.id) {
                return Err(SchemaError::DuplicateVariant {
                    id: spec.id.clone(),
                    first,
                    second: slot,
                });
            }
            index.insert(spec.id.clone(), slot);
        }

        if policy == AliasPolicy::Unify {
            for (slot, spec) in specs.iter().enumerate() {
                for alias in &spec.aliases {
                    match index.get(alias) {
                        Some(&first) if first == slot => {}
                        Some(&first) => {
                            return Err(SchemaError::AliasConflict {
                                alias: alias.clone(),
                                first,
                                second: slot,
                            });
                        }
                        None => {
                            index.insert(alias.clone(), slot);
                        }
                    }
                }
            }
        }

        let digest = layout_digest(&name, policy, &specs);
        tracing::debug!(schema = %name, slots = specs.len(), %digest, "Defined variant schema");

        Ok(Self {
            version: SchemaVersion { name, digest },
            policy,
            specs,
            index,
        })
    }

    /// Slot index of a variant identity, if the schema knows it.
    #[must_use]
    pub fn lookup(&self, id: &VariantId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Identities that resolve to `slot`, canonical first.
    pub fn slot_identities(&self, slot: usize) -> impl Iterator<Item = &VariantId> {
        let spec = self.specs.get(slot);
        let unify = self.policy == AliasPolicy::Unify;
        spec.into_iter().flat_map(move |s| {
            std::iter::once(&s.id).chain(s.aliases.iter().filter(move |_| unify))
        })
    }

    #[must_use]
    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.version.name
    }

    #[must_use]
    pub fn policy(&self) -> AliasPolicy {
        self.policy
    }

    #[must_use]
    pub fn specs(&self) -> &[VariantSpec] {
        &self.specs
    }

    /// Number of variant slots (L).
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Slots in every protocol vector: L variants plus the sentinel.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.specs.len() + 1
    }
}

impl TryFrom<SchemaDefinition> for VariantSchema {
    type Error = SchemaError;

    fn try_from(def: SchemaDefinition) -> Result<Self, Self::Error> {
        Self::define(def.name, def.variants, def.alias_policy)
    }
}

impl From<VariantSchema> for SchemaDefinition {
    fn from(schema: VariantSchema) -> Self {
        Self {
            name: schema.version.name,
            alias_policy: schema.policy,
            variants: schema.specs,
        }
    }
}

fn layout_digest(name: &str, policy: AliasPolicy, specs: &[VariantSpec]) -> String {
    fn push_id(buf: &mut Vec<u8>, id: &VariantId) {
        match id {
            VariantId::Named(rsid) => {
                buf.push(b'N');
                buf.extend_from_slice(rsid.as_bytes());
            }
            VariantId::Locus { chrom, pos, allele } => {
                buf.push(b'L');
                buf.extend_from_slice(chrom.as_bytes());
                buf.push(0);
                buf.extend_from_slice(&pos.to_le_bytes());
                buf.extend_from_slice(allele.as_bytes());
            }
        }
        buf.push(0);
    }

    let mut layout = Vec::new();
    layout.push(match policy {
        AliasPolicy::Strict => 0u8,
        AliasPolicy::Unify => 1u8,
    });
    for spec in specs {
        push_id(&mut layout, &spec.id);
        if policy == AliasPolicy::Unify {
            for alias in &spec.aliases {
                layout.push(b'=');
                push_id(&mut layout, alias);
            }
        }
        layout.push(b'\n');
    }
    compute_fingerprint(&[name.as_bytes(), &layout])
}
