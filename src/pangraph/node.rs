// src/pangraph/node.rs
use std::sync::Arc;

use ahash::AHashSet;

use crate::prg::{KmerGraphWithCoverage, LocalPrg};

/// One locus observed in the reads: the PRG it maps to, the reads that hit
/// it, and the coverage accumulated over its k-mer graph.
#[derive(Debug, Clone)]
pub struct PanNode {
    pub node_id: u32,
    pub prg_id: u32,
    pub name: String,
    pub prg: Arc<LocalPrg>,
    pub reads: AHashSet<u32>,
    /// One count per accepted cluster, not per distinct read.
    pub covg: u32,
    /// Distinct reads per sample, for per-sample inference.
    pub sample_read_counts: Vec<u32>,
    pub kmer_coverage: KmerGraphWithCoverage,
}

impl PanNode {
    pub fn new(prg: Arc<LocalPrg>, num_samples: usize) -> Self {
        let kmer_coverage = KmerGraphWithCoverage::new(prg.kmer_graph.clone(), num_samples);
        PanNode {
            node_id: prg.id,
            prg_id: prg.id,
            name: prg.name.clone(),
            prg,
            reads: AHashSet::new(),
            covg: 0,
            sample_read_counts: vec![0; num_samples],
            kmer_coverage,
        }
    }
}
