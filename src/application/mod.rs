//! Application layer: Use cases and services.
//!
//! Each service corresponds to one protocol role:
//! - key holder: `ContextManager`, `InterpretationService`
//! - contributor: `ContributorService`, `local::analyze`
//! - aggregator: `AggregationService`, `AggregationSession`

mod aggregation;
mod context;
mod contributor;
mod interpretation;
pub mod local;

pub use aggregation::{
    AggregationError, AggregationReference, AggregationService, AggregationSession,
};
pub use context::{Context, ContextManager, SecretExport, CONTEXT_FORMAT_VERSION};
pub use contributor::{ContributorService, SENTINEL};
pub use interpretation::InterpretationService;
pub use local::{analyze, LocalReport, LocalVariant};
