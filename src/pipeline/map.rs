// src/pipeline/map.rs
//! The `map` subcommand: sketch the reads, cluster hits per locus, grow the
//! pangraph with coverage, estimate parameters, and call a
//! maximum-likelihood sequence per covered locus.

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::Context;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::index::MinimizerIndex;
use crate::io::{read_sequences, FastaWriter};
use crate::map::{cluster_hits, hits_for_read, sketch_read, Cluster};
use crate::pangraph::{orientation_code, PanGraph};
use crate::pipeline::index::{build_prgs_and_index, index_path_for};
use crate::prg::{LocalPrg, MaxPath, Minimap2Aligner, ProbModel};

#[derive(Debug, Clone)]
pub struct MapParams {
    pub w: u32,
    pub k: u32,
    pub max_diff: u32,
    pub cluster_thresh: usize,
    pub model: ProbModel,
    pub e_rate: f32,
    pub max_kmers_to_average: u32,
    /// Re-align reads at forks instead of trusting coverage means alone.
    pub rescue: bool,
}

impl Default for MapParams {
    fn default() -> Self {
        MapParams {
            w: 1,
            k: 15,
            max_diff: 500,
            cluster_thresh: 4,
            model: ProbModel::Binomial,
            e_rate: 0.11,
            max_kmers_to_average: 100,
            rescue: false,
        }
    }
}

/// Map one sample's reads into the pangraph.
///
/// Read ids are `read_id_offset + position`, so multi-sample callers keep
/// them globally unique. Hit collection and clustering run in parallel
/// across reads; pangraph population is a serial reduction over the
/// per-read results, so the final graph does not depend on worker
/// scheduling. Workers check `stop` between reads and wind down
/// cooperatively.
#[allow(clippy::too_many_arguments)]
pub fn map_reads_into_pangraph(
    prgs: &[Arc<LocalPrg>],
    index: &MinimizerIndex,
    reads: &[(String, String)],
    params: &MapParams,
    sample_id: usize,
    num_samples: usize,
    read_id_offset: u32,
    pangraph: &mut PanGraph,
    stop: &AtomicBool,
) -> crate::error::Result<()> {
    let per_read: Vec<(u32, Vec<Cluster>)> = reads
        .par_iter()
        .enumerate()
        .map(|(i, (_name, seq))| {
            let read_id = read_id_offset + i as u32;
            if stop.load(Ordering::Relaxed) {
                return (read_id, Vec::new());
            }
            let minimizers = sketch_read(seq.as_bytes(), params.w, params.k);
            let hits = hits_for_read(read_id, &minimizers, index);
            (read_id, cluster_hits(hits, params.max_diff, params.cluster_thresh))
        })
        .collect();

    let prg_by_id: AHashMap<u32, &Arc<LocalPrg>> =
        prgs.iter().map(|prg| (prg.id, prg)).collect();

    let mut num_clusters = 0usize;
    for (read_id, clusters) in per_read {
        let mut prev: Option<(u32, bool)> = None;
        for cluster in clusters {
            let Some(prg) = prg_by_id.get(&cluster.prg_id) else {
                warn!("cluster references unknown locus {}", cluster.prg_id);
                continue;
            };
            pangraph.add_hits(prg, read_id, &cluster, sample_id, num_samples);
            num_clusters += 1;
            if let Some((prev_id, prev_strand)) = prev {
                if prev_id != cluster.prg_id {
                    pangraph.add_edge(
                        prev_id,
                        cluster.prg_id,
                        orientation_code(prev_strand, cluster.strand),
                    )?;
                }
            }
            prev = Some((cluster.prg_id, cluster.strand));
        }
    }
    info!(
        "sample {}: {} reads produced {} accepted clusters over {} loci",
        sample_id,
        reads.len(),
        num_clusters,
        pangraph.len()
    );
    Ok(())
}

/// Infer the ML path of every locus, in parallel. Failed loci are logged
/// and reported as `None`.
pub fn call_loci(
    pangraph: &PanGraph,
    params: &MapParams,
    sample_id: usize,
) -> Vec<(String, Option<MaxPath>)> {
    let nodes: Vec<_> = pangraph.nodes().collect();
    nodes
        .par_iter()
        .map(|node| {
            let result = node.kmer_coverage.find_max_path(
                params.model,
                params.max_kmers_to_average,
                sample_id,
            );
            let called = match result {
                Ok(called) => called,
                Err(e) => {
                    warn!("skipping locus {}: {}", node.name, e);
                    None
                }
            };
            (node.name.clone(), called)
        })
        .collect()
}

/// As [`call_loci`], but resolving forks by re-aligning each locus's reads
/// against the candidate downstream sequences.
fn call_loci_with_rescue(
    pangraph: &PanGraph,
    reads: &[(String, String)],
    params: &MapParams,
    sample_id: usize,
) -> Vec<(String, Option<MaxPath>)> {
    let aligner = Minimap2Aligner::new(params.k);
    let mut out = Vec::new();
    for node in pangraph.nodes() {
        let called = match write_locus_reads(node.reads.iter().copied(), reads) {
            Ok(locus_reads) => node
                .kmer_coverage
                .find_max_path_with_base_level_mapping(
                    params.model,
                    sample_id,
                    &node.prg,
                    locus_reads.path(),
                    &aligner,
                )
                .unwrap_or_else(|e| {
                    warn!("skipping locus {}: {}", node.name, e);
                    None
                }),
            Err(e) => {
                warn!("skipping locus {}: {}", node.name, e);
                None
            }
        };
        out.push((node.name.clone(), called));
    }
    out
}

/// Materialize one locus's reads as a temporary FASTA; the file is removed
/// on all exit paths when the handle drops.
pub fn write_locus_reads(
    read_ids: impl Iterator<Item = u32>,
    reads: &[(String, String)],
) -> crate::error::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .suffix(".fa")
        .tempfile()
        .map_err(|e| crate::error::PrgMapError::io("locus reads tempfile", e))?;
    for read_id in read_ids {
        if let Some((name, seq)) = reads.get(read_id as usize) {
            writeln!(file, ">{}\n{}", name, seq)
                .map_err(|e| crate::error::PrgMapError::io("locus reads tempfile", e))?;
        }
    }
    file.flush()
        .map_err(|e| crate::error::PrgMapError::io("locus reads tempfile", e))?;
    Ok(file)
}

/// Write the called consensus sequences; loci without signal are skipped
/// with a warning.
pub fn write_consensus(
    pangraph: &PanGraph,
    called: &[(String, Option<MaxPath>)],
    out_path: &Path,
) -> crate::error::Result<usize> {
    let mut writer = FastaWriter::new(out_path, 80)?;
    let mut written = 0usize;
    for (name, called_path) in called {
        let Some(max_path) = called_path else {
            warn!("locus {} has no signal, skipping consensus", name);
            continue;
        };
        let node = pangraph
            .nodes()
            .find(|n| &n.name == name)
            .expect("called locus exists");
        let sequence = node.prg.sequence_along_kmer_path(&max_path.node_ids);
        writer.write_record(
            &format!("{} max_path_log_prob={:.5}", name, max_path.score),
            &sequence,
        )?;
        written += 1;
    }
    Ok(written)
}

pub fn run_map(
    prg_file: &Path,
    reads_file: &Path,
    out_prefix: &str,
    params: &MapParams,
    index_file: Option<&Path>,
) -> anyhow::Result<()> {
    info!(
        "mapping {} against {}",
        reads_file.display(),
        prg_file.display()
    );

    let (prgs, built_index) = build_prgs_and_index(prg_file, params.w, params.k)?;
    let index = match index_file {
        Some(path) => {
            info!("loading minimizer index from {}", path.display());
            MinimizerIndex::load(path, params.w, params.k)?
        }
        None => {
            let default_path = index_path_for(prg_file, params.w, params.k);
            if default_path.exists() {
                info!("loading minimizer index from {}", default_path.display());
                MinimizerIndex::load(&default_path, params.w, params.k)?
            } else {
                built_index
            }
        }
    };

    let reads = read_sequences(reads_file)?;
    info!("loaded {} reads", reads.len());

    let mut pangraph = PanGraph::new();
    let stop = AtomicBool::new(false);
    map_reads_into_pangraph(&prgs, &index, &reads, params, 0, 1, 0, &mut pangraph, &stop)?;

    let mut e_rate = params.e_rate;
    let thresh =
        crate::prg::estimate_parameters(&mut pangraph, out_prefix, params.k, &mut e_rate, 0)?;
    match thresh {
        Some(t) => info!("estimated e_rate {} and threshold {}", e_rate, t),
        None => warn!("no locus was covered by any read"),
    }

    let called = if params.rescue {
        call_loci_with_rescue(&pangraph, &reads, params, 0)
    } else {
        call_loci(&pangraph, params, 0)
    };

    let consensus_path = std::path::PathBuf::from(format!("{}.consensus.fa", out_prefix));
    let written = write_consensus(&pangraph, &called, &consensus_path)?;
    info!(
        "wrote {} consensus sequences to {}",
        written,
        consensus_path.display()
    );

    let gfa_path = format!("{}.pangraph.gfa", out_prefix);
    pangraph.write_gfa(&gfa_path)?;
    info!("wrote pangraph to {}", gfa_path);

    let kg_dir = format!("{}_kmer_graphs", out_prefix);
    fs::create_dir_all(&kg_dir).with_context(|| format!("creating {}", kg_dir))?;
    for node in pangraph.nodes() {
        node.kmer_coverage
            .save(Path::new(&kg_dir).join(format!("{}.gfa", node.name)), 0)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_files(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let prg_file = dir.join("prgs.fa");
        std::fs::write(
            &prg_file,
            ">locusA\nTTAGGCAT(CCG|TTT)AACGTCA\n>locusB\nGGCGCGCATTACGGATT\n",
        )
        .unwrap();
        let reads_file = dir.join("reads.fa");
        // reads traverse locusA's first allele, then locusB
        let read = "TTAGGCATCCGAACGTCAGGCGCGCATTACGGATT";
        let mut text = String::new();
        for i in 0..4 {
            text.push_str(&format!(">r{}\n{}\n", i, read));
        }
        std::fs::write(&reads_file, text).unwrap();
        (prg_file, reads_file)
    }

    #[test]
    fn test_map_reads_builds_pangraph_with_edge() {
        let dir = tempfile::tempdir().unwrap();
        let (prg_file, reads_file) = write_files(dir.path());

        let params = MapParams {
            w: 1,
            k: 5,
            max_diff: 10,
            cluster_thresh: 2,
            ..MapParams::default()
        };
        let (prgs, index) = build_prgs_and_index(&prg_file, params.w, params.k).unwrap();
        let reads = read_sequences(&reads_file).unwrap();

        let mut pangraph = PanGraph::new();
        let stop = AtomicBool::new(false);
        map_reads_into_pangraph(&prgs, &index, &reads, &params, 0, 1, 0, &mut pangraph, &stop)
            .unwrap();

        assert_eq!(pangraph.len(), 2);
        // each read saw locusA then locusB: one edge with coverage 4
        assert_eq!(pangraph.num_edges(), 1);
        assert_eq!(pangraph.edges().next().unwrap().covg, 4);

        let node_a = pangraph.node(0).unwrap();
        assert_eq!(node_a.reads.len(), 4);
        assert_eq!(node_a.kmer_coverage.num_reads, 4);
    }

    #[test]
    fn test_run_map_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (prg_file, reads_file) = write_files(dir.path());
        let prefix = dir.path().join("out").display().to_string();

        let params = MapParams {
            w: 1,
            k: 5,
            max_diff: 10,
            cluster_thresh: 2,
            model: ProbModel::Linear,
            ..MapParams::default()
        };
        run_map(&prg_file, &reads_file, &prefix, &params, None).unwrap();

        assert!(dir.path().join("out.consensus.fa").exists());
        assert!(dir.path().join("out.pangraph.gfa").exists());
        assert!(dir.path().join("out.kmer_covgs.txt").exists());
        assert!(dir.path().join("out.kmer_probs.txt").exists());
        assert!(dir.path().join("out_kmer_graphs").join("locusA.gfa").exists());

        // the called consensus for locusA picks the covered allele
        let consensus = std::fs::read_to_string(dir.path().join("out.consensus.fa")).unwrap();
        assert!(consensus.contains("locusA"));
        assert!(consensus.contains("CCG"), "consensus: {}", consensus);
        assert!(!consensus.contains("TTT"), "consensus: {}", consensus);
    }

    #[test]
    fn test_stop_flag_halts_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let (prg_file, reads_file) = write_files(dir.path());

        let params = MapParams {
            w: 1,
            k: 5,
            max_diff: 10,
            cluster_thresh: 2,
            ..MapParams::default()
        };
        let (prgs, index) = build_prgs_and_index(&prg_file, params.w, params.k).unwrap();
        let reads = read_sequences(&reads_file).unwrap();

        let mut pangraph = PanGraph::new();
        let stop = AtomicBool::new(true);
        map_reads_into_pangraph(&prgs, &index, &reads, &params, 0, 1, 0, &mut pangraph, &stop)
            .unwrap();
        assert!(pangraph.is_empty());
    }
}
