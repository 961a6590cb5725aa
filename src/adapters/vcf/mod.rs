//! VCF adapter: Reads the first sample's genotype calls from a VCF file.
//!
//! Plain text and gzip/bgzf compressed files are both accepted (detected by
//! the `.gz`/`.bgz` extension). Header lines are skipped; only CHROM, POS,
//! ID, ALT, FORMAT and the first sample column are used.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::domain::{Genotype, VariantRecord};
use crate::ports::GenomeSource;

const READ_BUFFER: usize = 256 * 1024;

/// Errors raised while reading a VCF.
#[derive(Debug, thiserror::Error)]
pub enum VcfError {
    #[error("failed to open VCF {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading VCF: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed VCF line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("VCF line {line} has no sample column")]
    NoSample { line: usize },
}

/// Single-sample VCF reader.
pub struct VcfReader {
    reader: Box<dyn BufRead + Send>,
}

impl VcfReader {
    /// Open a VCF file, auto-detecting gzip compression.
    ///
    /// # Errors
    /// Returns `VcfError::Open` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VcfError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| VcfError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let gzipped = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "gz" || ext == "bgz");

        tracing::debug!("Opening VCF (gzip: {})", gzipped);
        let reader: Box<dyn BufRead + Send> = if gzipped {
            Box::new(BufReader::with_capacity(READ_BUFFER, MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER, file))
        };
        Ok(Self { reader })
    }

    /// Read VCF text from any buffered source.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }
}

impl std::fmt::Debug for VcfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcfReader").finish_non_exhaustive()
    }
}

impl GenomeSource for VcfReader {
    type Error = VcfError;

    fn read_records(&mut self) -> Result<Vec<VariantRecord>, VcfError> {
        let mut records = Vec::new();
        let mut line_buf = String::new();
        let mut line_no = 0usize;

        loop {
            line_buf.clear();
            if self.reader.read_line(&mut line_buf)? == 0 {
                break;
            }
            line_no += 1;

            let line = line_buf.trim_end_matches('\n').trim_end_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            records.push(parse_line(line, line_no)?);
        }

        tracing::debug!("Read {} VCF records", records.len());
        Ok(records)
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<VariantRecord, VcfError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 8 {
        return Err(VcfError::Malformed {
            line: line_no,
            message: format!("expected at least 8 columns, found {}", fields.len()),
        });
    }
    if fields.len() < 10 {
        return Err(VcfError::NoSample { line: line_no });
    }

    let pos = fields[1].parse::<u64>().map_err(|_| VcfError::Malformed {
        line: line_no,
        message: "POS is not a positive integer".into(),
    })?;

    let id = match fields[2] {
        "." | "" => None,
        id => Some(id.to_string()),
    };

    let alts = fields[4]
        .split(',')
        .filter(|alt| !alt.is_empty() && *alt != ".")
        .map(str::to_string)
        .collect();

    // GT is conventionally first in FORMAT but not required to be.
    let genotype = fields[8]
        .split(':')
        .position(|key| key == "GT")
        .and_then(|idx| fields[9].split(':').nth(idx))
        .map(Genotype::parse)
        .unwrap_or_default();

    Ok(VariantRecord {
        id,
        chrom: fields[0].to_string(),
        pos,
        alts,
        genotype,
    })
}
