//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `bfv`: fhe.rs for BFV encryption and addition
//! - `vcf`: VCF genome files (plain or gzip)
//! - `files`: on-disk context and ciphertext formats
//! - `sanitize`: genotype and secret filtering for logs

pub mod bfv;
pub mod files;
pub mod sanitize;
pub mod vcf;

pub use bfv::{BfvAdapter, BfvEvaluator};
pub use files::{CiphertextEnvelope, Sensitivity, StoreError};
pub use vcf::{VcfError, VcfReader};
