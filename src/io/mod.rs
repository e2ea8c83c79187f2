// src/io/mod.rs
//! FASTA/FASTQ readers and writers, gzip-aware.

pub mod fasta;
pub mod fastq;

pub use fasta::{open_fasta, stream_fasta_records, FastaRecord, FastaWriter};
pub use fastq::{open_fastq, stream_fastq_records, FastqRecord};

use std::path::Path;

use crate::error::Result;

/// Whether a path looks like FASTQ rather than FASTA.
fn is_fastq(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = name.strip_suffix(".gz").unwrap_or(&name);
    stem.ends_with(".fq") || stem.ends_with(".fastq")
}

/// Read every sequence of a FASTA or FASTQ file (picked by extension) as
/// `(name, sequence)` pairs, uppercased.
pub fn read_sequences(path: &Path) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    if is_fastq(path) {
        for record in stream_fastq_records(open_fastq(path)?) {
            out.push((record.header, record.sequence.to_uppercase()));
        }
    } else {
        for record in stream_fasta_records(open_fasta(path)?) {
            out.push((record.header, record.sequence.to_uppercase()));
        }
    }
    Ok(out)
}
