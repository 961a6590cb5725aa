//! Domain layer: Core protocol types and pure logic.
//!
//! Nothing here touches the crypto backend or the filesystem (the built-in
//! panel file is embedded at compile time). All types are immutable once
//! built and validate on construction.

mod crypto;
mod genotype;
pub mod kdf;
pub mod panel;
mod report;
mod risk;
mod schema;
mod variant;

pub use crypto::{
    CiphertextVector, ContextFingerprint, ContextParameters, CryptoError, PrivateContext,
    PublicContext, SecretMaterial,
};
pub use genotype::{encode, EncodeError, Genotype, GenotypeVector, VariantRecord, MAX_DOSAGE};
pub use kdf::{KdfError, Passphrase};
pub use panel::{Panel, PanelCatalogue, PanelError};
pub use report::{
    interpret, AggregateResult, AlleleFrequency, DisclosureError, DisclosurePolicy,
    FrequencyReport, InterpretError, VariantReport,
};
pub use risk::{log_odds_contribution, RiskLevel};
pub use schema::{AliasPolicy, SchemaDefinition, SchemaError, SchemaVersion, VariantSchema};
pub use variant::{ClinicalInfo, VariantId, VariantSpec};
