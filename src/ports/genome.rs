//! Genome source port: where variant calls come from.

use crate::domain::VariantRecord;

/// A single-sample source of variant calls (e.g. a VCF file).
pub trait GenomeSource {
    /// Error type for reading records.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read every record of the sample.
    ///
    /// # Errors
    /// Returns error if the underlying data cannot be read or parsed.
    fn read_records(&mut self) -> Result<Vec<VariantRecord>, Self::Error>;
}
