// src/assembly/mod.rs
//! Local assembly between anchor k-mers: build a de Bruijn graph of the
//! region's reads, locate a start/end anchor pair in either orientation,
//! and enumerate every bounded-length path between them.

pub mod debruijn;
pub mod dfs;

pub use debruijn::DeBruijnGraph;
pub use dfs::{dfs_tree, paths_between, DfsTree};

use std::path::Path;

use ahash::AHashSet;
use tracing::{debug, info};

use crate::error::{PrgMapError, Result};
use crate::io::{read_sequences, FastaWriter};
use crate::seq::reverse_complement;

#[derive(Debug, Clone)]
pub struct LocalAssemblyParams {
    pub kmer_size: usize,
    pub max_path_length: usize,
    pub clean_graph: bool,
    pub min_coverage: u32,
    pub fasta_line_width: usize,
}

impl Default for LocalAssemblyParams {
    fn default() -> Self {
        LocalAssemblyParams {
            kmer_size: 11,
            max_path_length: 250,
            clean_graph: false,
            min_coverage: 2,
            fasta_line_width: 80,
        }
    }
}

/// The first `n` k-mers of a flanking sequence, as anchor candidates.
/// `n` shrinks when the sequence is short; too-short sequences give an
/// empty set.
pub fn generate_start_kmers(sequence: &str, k: usize, n: usize) -> AHashSet<String> {
    let len = sequence.len();
    if k > len || k == 0 {
        return AHashSet::new();
    }
    let n = n.min(len - k + 1);
    (0..n).map(|i| sequence[i..i + k].to_string()).collect()
}

/// The last `n` k-mers of a flanking sequence, stepping back from the end.
pub fn generate_end_kmers(sequence: &str, k: usize, n: usize) -> AHashSet<String> {
    let len = sequence.len();
    if k > len || k == 0 {
        return AHashSet::new();
    }
    let n = n.min(len - k + 1);
    (0..n)
        .map(|i| sequence[len - k - i..len - i].to_string())
        .collect()
}

/// Assemble the region between a start and an end anchor from the reads in
/// `reads_path`, writing one FASTA record per discovered path.
///
/// Anchor pairs are tried in the forward orientation first; when no start
/// anchor is present, the reverse complements of the end anchors are paired
/// with reverse complements of the starts. Returns the number of paths
/// written.
pub fn local_assembly(
    reads_path: &Path,
    start_kmers: &AHashSet<String>,
    end_kmers: &AHashSet<String>,
    out_path: &Path,
    params: &LocalAssemblyParams,
) -> Result<usize> {
    info!(
        "local assembly of {} (k = {}, max path length = {}, clean = {}, min coverage = {})",
        reads_path.display(),
        params.kmer_size,
        params.max_path_length,
        params.clean_graph,
        params.min_coverage
    );
    if params.kmer_size > params.max_path_length {
        return Err(PrgMapError::InvalidParameters(format!(
            "kmer size {} exceeds max path length {}",
            params.kmer_size, params.max_path_length
        )));
    }

    let reads: Vec<String> = read_sequences(reads_path)?
        .into_iter()
        .map(|(_, seq)| seq)
        .collect();
    let mut graph = DeBruijnGraph::build(reads, params.kmer_size, params.min_coverage)?;
    debug!("de Bruijn graph has {} kmers", graph.len());

    if params.clean_graph {
        graph.clean_tips(2 * params.kmer_size);
        debug!("after tip clipping: {} kmers", graph.len());
    }

    let (start, end) = find_anchor_pair(&graph, start_kmers, end_kmers)?;
    info!("using start anchor {} and end anchor {}", start, end);

    let tree = dfs_tree(&start, &graph);
    let paths = paths_between(&start, &end, &tree, params.max_path_length);

    let mut writer = FastaWriter::new(out_path, params.fasta_line_width)?;
    for path in &paths {
        writer.write_record("path", path)?;
    }
    info!(
        "local assembly wrote {} paths to {}",
        paths.len(),
        out_path.display()
    );
    Ok(paths.len())
}

/// Find a `(start, end)` anchor pair present in the graph, trying forward
/// orientation first and reverse complements second.
fn find_anchor_pair(
    graph: &DeBruijnGraph,
    start_kmers: &AHashSet<String>,
    end_kmers: &AHashSet<String>,
) -> Result<(String, String)> {
    // sorted for a deterministic choice when several anchors exist
    let mut starts: Vec<&String> = start_kmers.iter().collect();
    starts.sort();
    let mut ends: Vec<&String> = end_kmers.iter().collect();
    ends.sort();

    for start in &starts {
        let start_found = graph.contains(start);
        for end in &ends {
            if start_kmers.contains(*end) {
                continue;
            }
            if start_found {
                if graph.contains(end) {
                    return Ok(((*start).clone(), (*end).clone()));
                }
            } else {
                let revcomp_start = reverse_complement(end);
                let revcomp_end = reverse_complement(start);
                if graph.contains(&revcomp_start) && graph.contains(&revcomp_end) {
                    debug!("found anchors on reverse inspection");
                    return Ok((revcomp_start, revcomp_end));
                }
                break; // next start anchor
            }
        }
    }
    Err(PrgMapError::AnchorsNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{open_fasta, stream_fasta_records};

    fn write_reads(dir: &Path, reads: &[&str]) -> std::path::PathBuf {
        let path = dir.join("reads.fa");
        let mut text = String::new();
        for (i, read) in reads.iter().enumerate() {
            text.push_str(&format!(">r{}\n{}\n", i, read));
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_generate_start_and_end_kmers() {
        let starts = generate_start_kmers("ACGTACGT", 4, 2);
        assert_eq!(starts.len(), 2);
        assert!(starts.contains("ACGT"));
        assert!(starts.contains("CGTA"));

        let ends = generate_end_kmers("ACGTACGT", 4, 2);
        assert_eq!(ends.len(), 2);
        assert!(ends.contains("ACGT"));
        assert!(ends.contains("TACG"));

        // n clamps to what the sequence can provide
        assert_eq!(generate_start_kmers("ACGT", 3, 10).len(), 2);
        // k longer than the sequence: nothing
        assert!(generate_start_kmers("ACG", 5, 2).is_empty());
    }

    #[test]
    fn test_single_path_assembly() {
        // one 23 bp sequence; its first and last 21-mers are the anchors
        let seq = "ACGTACGTACGTACGTACGTACG";
        let start = &seq[..21];
        let end = &seq[2..23];
        assert_eq!(end, "GTACGTACGTACGTACGTACG");

        let dir = tempfile::tempdir().unwrap();
        let reads = write_reads(dir.path(), &[seq, seq]);
        let out = dir.path().join("paths.fa");

        let params = LocalAssemblyParams {
            kmer_size: 21,
            max_path_length: 30,
            clean_graph: false,
            min_coverage: 1,
            fasta_line_width: 80,
        };
        let n = local_assembly(
            &reads,
            &AHashSet::from_iter([start.to_string()]),
            &AHashSet::from_iter([end.to_string()]),
            &out,
            &params,
        )
        .unwrap();
        assert_eq!(n, 1);

        let records: Vec<_> = stream_fasta_records(open_fasta(&out).unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header, "path");
        assert_eq!(records[0].sequence, seq);
        assert!(records[0].sequence.len() <= 30);
    }

    #[test]
    fn test_anchors_found_by_reverse_complement() {
        let seq = "TGATCCAGCTTGA";
        let rc = reverse_complement(seq);

        let dir = tempfile::tempdir().unwrap();
        // reads are on the opposite strand of the anchors
        let reads = write_reads(dir.path(), &[&rc]);
        let out = dir.path().join("paths.fa");

        let params = LocalAssemblyParams {
            kmer_size: 5,
            max_path_length: 30,
            clean_graph: false,
            min_coverage: 1,
            fasta_line_width: 80,
        };
        let n = local_assembly(
            &reads,
            &AHashSet::from_iter([seq[..5].to_string()]),
            &AHashSet::from_iter([seq[seq.len() - 5..].to_string()]),
            &out,
            &params,
        )
        .unwrap();
        assert_eq!(n, 1);

        let records: Vec<_> = stream_fasta_records(open_fasta(&out).unwrap()).collect();
        // the assembled path spells the reverse complement strand
        assert_eq!(records[0].sequence, rc);
    }

    #[test]
    fn test_missing_anchors_fail() {
        let dir = tempfile::tempdir().unwrap();
        let reads = write_reads(dir.path(), &["TGATCCAGC"]);
        let out = dir.path().join("paths.fa");

        let params = LocalAssemblyParams {
            kmer_size: 5,
            max_path_length: 30,
            clean_graph: false,
            min_coverage: 1,
            fasta_line_width: 80,
        };
        let result = local_assembly(
            &reads,
            &AHashSet::from_iter(["AAAAA".to_string()]),
            &AHashSet::from_iter(["TTTTT".to_string()]),
            &out,
            &params,
        );
        assert!(matches!(result, Err(PrgMapError::AnchorsNotFound)));
    }

    #[test]
    fn test_kmer_size_must_fit_path_bound() {
        let dir = tempfile::tempdir().unwrap();
        let reads = write_reads(dir.path(), &["TGATCCAGC"]);
        let out = dir.path().join("paths.fa");

        let params = LocalAssemblyParams {
            kmer_size: 31,
            max_path_length: 30,
            ..LocalAssemblyParams::default()
        };
        let result = local_assembly(
            &reads,
            &AHashSet::from_iter(["AAAAA".to_string()]),
            &AHashSet::from_iter(["TTTTT".to_string()]),
            &out,
            &params,
        );
        assert!(matches!(result, Err(PrgMapError::InvalidParameters(_))));
    }
}
