//! Ports layer: Trait definitions for external collaborators.
//!
//! These traits define the boundaries between the protocol and the crypto
//! library and genome parser it depends on.

mod genome;
mod homomorphic;

pub use genome::GenomeSource;
pub use homomorphic::{AdditiveEvaluator, HomomorphicEngine};
