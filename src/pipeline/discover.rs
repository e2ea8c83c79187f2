// src/pipeline/discover.rs
//! The `discover` subcommand: map and call as `map` does, then run local
//! assembly between anchor k-mers for loci whose call is weak, recovering
//! variation the k-mer graphs cannot express.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use crate::assembly::{generate_end_kmers, generate_start_kmers, local_assembly, LocalAssemblyParams};
use crate::error::PrgMapError;
use crate::io::read_sequences;
use crate::pangraph::PanGraph;
use crate::pipeline::index::build_prgs_and_index;
use crate::pipeline::map::{
    call_loci, map_reads_into_pangraph, write_consensus, write_locus_reads, MapParams,
};

#[derive(Debug, Clone)]
pub struct DiscoverParams {
    /// De Bruijn k-mer size for local assembly.
    pub denovo_kmer_size: usize,
    pub max_path_length: usize,
    pub clean_graph: bool,
    pub min_dbg_coverage: u32,
    /// How many candidate anchors to draw from each consensus flank.
    pub num_anchor_kmers: usize,
}

impl Default for DiscoverParams {
    fn default() -> Self {
        DiscoverParams {
            denovo_kmer_size: 11,
            max_path_length: 250,
            clean_graph: false,
            min_dbg_coverage: 2,
            num_anchor_kmers: 5,
        }
    }
}

pub fn run_discover(
    prg_file: &Path,
    reads_file: &Path,
    out_prefix: &str,
    params: &MapParams,
    discover: &DiscoverParams,
) -> anyhow::Result<()> {
    info!(
        "discovering variation in {} against {}",
        reads_file.display(),
        prg_file.display()
    );

    let (prgs, index) = build_prgs_and_index(prg_file, params.w, params.k)?;
    let reads = read_sequences(reads_file)?;
    info!("loaded {} reads", reads.len());

    let mut pangraph = PanGraph::new();
    let stop = AtomicBool::new(false);
    map_reads_into_pangraph(&prgs, &index, &reads, params, 0, 1, 0, &mut pangraph, &stop)?;

    let mut e_rate = params.e_rate;
    crate::prg::estimate_parameters(&mut pangraph, out_prefix, params.k, &mut e_rate, 0)?;

    let called = call_loci(&pangraph, params, 0);
    let consensus_path = format!("{}.consensus.fa", out_prefix);
    write_consensus(&pangraph, &called, Path::new(&consensus_path))?;

    // loci whose best call sits below the noise threshold get a de novo pass
    let assembly_params = LocalAssemblyParams {
        kmer_size: discover.denovo_kmer_size,
        max_path_length: discover.max_path_length,
        clean_graph: discover.clean_graph,
        min_coverage: discover.min_dbg_coverage,
        fasta_line_width: 80,
    };
    let mut num_assembled = 0usize;
    for (name, max_path) in &called {
        let node = pangraph
            .nodes()
            .find(|n| &n.name == name)
            .expect("called locus exists");
        let Some(max_path) = max_path else {
            warn!("locus {} has no signal, skipping local assembly", name);
            continue;
        };
        if max_path.score >= node.kmer_coverage.thresh {
            continue;
        }

        info!(
            "locus {} scored {:.3} (threshold {:.1}), attempting local assembly",
            name, max_path.score, node.kmer_coverage.thresh
        );
        let consensus = node.prg.sequence_along_kmer_path(&max_path.node_ids);
        let start_kmers =
            generate_start_kmers(&consensus, discover.denovo_kmer_size, discover.num_anchor_kmers);
        let end_kmers =
            generate_end_kmers(&consensus, discover.denovo_kmer_size, discover.num_anchor_kmers);
        if start_kmers.is_empty() || end_kmers.is_empty() {
            warn!("locus {}: consensus too short to anchor local assembly", name);
            continue;
        }

        let locus_reads = match write_locus_reads(node.reads.iter().copied(), &reads) {
            Ok(file) => file,
            Err(e) => {
                warn!("locus {}: {}", name, e);
                continue;
            }
        };
        let out_path = format!("{}.{}.assembly.fa", out_prefix, name);
        match local_assembly(
            locus_reads.path(),
            &start_kmers,
            &end_kmers,
            Path::new(&out_path),
            &assembly_params,
        ) {
            Ok(n) => {
                info!("locus {}: {} assembled paths", name, n);
                num_assembled += 1;
            }
            Err(PrgMapError::AnchorsNotFound) => {
                warn!("locus {}: anchors not found, skipping local assembly", name);
            }
            Err(e) => {
                warn!("locus {}: local assembly failed: {}", name, e);
            }
        }
    }

    pangraph.write_gfa(format!("{}.pangraph.gfa", out_prefix))?;
    info!(
        "discover finished: {} loci assembled de novo",
        num_assembled
    );
    Ok(())
}
