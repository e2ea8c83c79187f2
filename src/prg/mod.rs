//! The PRG layer: parsing locus graphs, sketching them into k-mer graphs,
//! and inferring maximum-likelihood paths from accumulated coverage.

pub mod aligner;
pub mod coverage;
pub mod estimate;
pub mod kmer_graph;
pub mod local_graph;
pub mod local_prg;

pub use aligner::{Minimap2Aligner, ReadAligner};
pub use coverage::{KmerGraphWithCoverage, MaxPath, ProbModel, NO_SIGNAL};
pub use estimate::{estimate_parameters, find_mean_covg, find_prob_thresh};
pub use kmer_graph::{KmerGraph, KmerNode};
pub use local_graph::{LocalGraph, LocalNode};
pub use local_prg::LocalPrg;
