//! # genopool
//!
//! Privacy-preserving aggregation of genomic allele counts using BFV
//! homomorphic encryption.
//!
//! Contributors encode their genotype at a fixed, versioned variant panel and
//! encrypt it under a public context. An aggregator sums the ciphertexts
//! without decrypting them. Only the key holder decrypts, and only the sum:
//! per-variant alternate-allele counts plus the number of contributors.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Schemas, genotype vectors, context and ciphertext types, reports
//! - `ports`: Trait definitions for the crypto backend and genome sources
//! - `adapters`: Concrete implementations (fhe.rs BFV, VCF, files, log sanitizer)
//! - `application`: Services for the key holder, contributor and aggregator roles
//! - `config`: Environment-driven runtime configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{
    AggregationError, AggregationReference, AggregationService, ContextManager,
    ContributorService, InterpretationService, SecretExport,
};
pub use domain::{
    encode, interpret, AggregateResult, AlleleFrequency, CiphertextVector, ContextParameters,
    FrequencyReport, GenotypeVector, PrivateContext, PublicContext, VariantSchema,
};

/// Result type for genopool operations
pub type Result<T> = std::result::Result<T, GenopoolError>;

/// Main error type for genopool
#[derive(Debug, thiserror::Error)]
pub enum GenopoolError {
    #[error("Schema error: {0}")]
    Schema(#[from] domain::SchemaError),

    #[error("Panel error: {0}")]
    Panel(#[from] domain::PanelError),

    #[error("Encoding failed: {0}")]
    Encode(#[from] domain::EncodeError),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] domain::CryptoError),

    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] application::AggregationError),

    #[error("Interpretation failed: {0}")]
    Interpret(#[from] domain::InterpretError),

    #[error("Release refused: {0}")]
    Disclosure(#[from] domain::DisclosureError),

    #[error("Genome source error: {0}")]
    Genome(Box<dyn std::error::Error + Send + Sync>),

    #[error("VCF error: {0}")]
    Vcf(#[from] adapters::VcfError),

    #[error("Storage error: {0}")]
    Store(#[from] adapters::StoreError),
}
