// src/prg/aligner.rs
//! Seam to the external sequence-to-sequence aligner used by the base-level
//! mapping rescue. The trait keeps inference testable; the production
//! implementation shells out to minimap2 and counts primary alignments per
//! candidate sequence from its PAF output.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use ahash::AHashMap;
use tracing::warn;

use crate::error::Result;

pub trait ReadAligner {
    /// Align the locus reads in `reads` against the named candidate
    /// sequences and return the number of primary alignments per candidate.
    ///
    /// An empty map means "no signal"; the caller falls back to its
    /// coverage-based tie-breaking.
    fn count_primary_hits(
        &self,
        targets: &[(String, String)],
        reads: &Path,
    ) -> Result<AHashMap<String, u32>>;
}

/// Aligner backed by a minimap2 subprocess.
pub struct Minimap2Aligner {
    pub k: u32,
}

impl Minimap2Aligner {
    pub fn new(k: u32) -> Self {
        // minimap2 caps its k-mer size at 28
        Minimap2Aligner { k: k.min(28) }
    }
}

impl ReadAligner for Minimap2Aligner {
    fn count_primary_hits(
        &self,
        targets: &[(String, String)],
        reads: &Path,
    ) -> Result<AHashMap<String, u32>> {
        let mut counts = AHashMap::new();
        if targets.is_empty() {
            return Ok(counts);
        }

        // the target set is tiny, so it travels as a temporary FASTA that is
        // removed on every exit path by its Drop
        let mut target_file = match tempfile::Builder::new().suffix(".fa").tempfile() {
            Ok(f) => f,
            Err(e) => {
                warn!("could not create temporary target FASTA: {}", e);
                return Ok(counts);
            }
        };
        for (name, seq) in targets {
            if writeln!(target_file, ">{}\n{}", name, seq).is_err() {
                warn!("could not write temporary target FASTA");
                return Ok(counts);
            }
        }
        if target_file.flush().is_err() {
            return Ok(counts);
        }

        let output = Command::new("minimap2")
            .arg("-c")
            .arg("-k")
            .arg(self.k.to_string())
            .arg(target_file.path())
            .arg(reads)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();

        let output = match output {
            Ok(out) => out,
            Err(e) => {
                warn!("minimap2 unavailable ({}); falling back to coverage", e);
                return Ok(counts);
            }
        };
        if !output.status.success() {
            warn!(
                "minimap2 exited with {}; falling back to coverage",
                output.status
            );
            return Ok(counts);
        }

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 12 {
                continue;
            }
            let is_primary = fields.iter().any(|f| *f == "tp:A:P");
            if is_primary {
                *counts.entry(fields[5].to_string()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
