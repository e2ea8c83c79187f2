// src/map/hits.rs
//! Minimizer hits: one read minimizer matched to one indexed PRG k-mer.

use crate::index::MinimizerIndex;
use crate::map::minimizer::Minimizer;
use crate::seq::GraphPath;

/// A read minimizer paired with one PRG occurrence from the index.
///
/// `strand` is the relative orientation: `true` when the read minimizer and
/// the PRG record sit on the same strand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MinimizerHit {
    pub read_id: u32,
    pub read_start: u32,
    pub read_end: u32,
    pub prg_id: u32,
    pub prg_path: GraphPath,
    pub strand: bool,
}

impl MinimizerHit {
    pub fn new(read_id: u32, minimizer: &Minimizer, prg_id: u32, prg_path: GraphPath, record_strand: bool) -> Self {
        MinimizerHit {
            read_id,
            read_start: minimizer.read_start,
            read_end: minimizer.read_end,
            prg_id,
            prg_path,
            strand: minimizer.strand == record_strand,
        }
    }

    /// Sort key for cluster formation: locus, orientation, read position.
    pub fn cluster_key(&self) -> (u32, bool, u32, u32, &GraphPath) {
        (
            self.prg_id,
            self.strand,
            self.read_start,
            self.read_end,
            &self.prg_path,
        )
    }
}

/// Look up every minimizer of a read and expand the matches into hits.
pub fn hits_for_read(
    read_id: u32,
    minimizers: &[Minimizer],
    index: &MinimizerIndex,
) -> Vec<MinimizerHit> {
    let mut hits = Vec::new();
    for minimizer in minimizers {
        if let Some(records) = index.lookup(minimizer.hash) {
            for record in records {
                hits.push(MinimizerHit::new(
                    read_id,
                    minimizer,
                    record.prg_id,
                    record.path.clone(),
                    record.strand,
                ));
            }
        }
    }
    hits
}
