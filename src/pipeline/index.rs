// src/pipeline/index.rs
//! The `index` subcommand: parse the PRG file, sketch every locus, write
//! the per-locus k-mer graphs and the binary minimizer index.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::index::MinimizerIndex;
use crate::io::{open_fasta, stream_fasta_records};
use crate::prg::LocalPrg;

/// Parse and sketch every PRG of a file into a fresh index.
///
/// A locus that fails to parse or sketch is logged and skipped; the rest of
/// the file still indexes.
pub fn build_prgs_and_index(
    prg_file: &Path,
    w: u32,
    k: u32,
) -> crate::error::Result<(Vec<Arc<LocalPrg>>, MinimizerIndex)> {
    let mut index = MinimizerIndex::new(w, k);
    let mut prgs: Vec<Arc<LocalPrg>> = Vec::new();

    let reader = open_fasta(prg_file)?;
    // ids stay unique even across skipped loci, so records a failed sketch
    // already registered can never alias a later locus
    let mut next_id = 0u32;
    for record in stream_fasta_records(reader) {
        let id = next_id;
        next_id += 1;
        let mut prg = match LocalPrg::new(id, &record.header, &record.sequence) {
            Ok(prg) => prg,
            Err(e) => {
                warn!("skipping locus {}: {}", record.header, e);
                continue;
            }
        };
        if let Err(e) = prg.minimizer_sketch(&mut index, w, k) {
            warn!("skipping locus {}: sketch failed: {}", record.header, e);
            continue;
        }
        prgs.push(Arc::new(prg));
    }

    info!(
        "indexed {} loci, {} minimizer keys, {} records",
        prgs.len(),
        index.len(),
        index.num_records()
    );
    Ok((prgs, index))
}

/// Path of the binary index derived from the PRG file name and parameters.
pub fn index_path_for(prg_file: &Path, w: u32, k: u32) -> PathBuf {
    PathBuf::from(format!("{}.k{}.w{}.idx", prg_file.display(), k, w))
}

pub fn run_index(prg_file: &Path, w: u32, k: u32, outdir: &Path) -> anyhow::Result<()> {
    info!("indexing PRGs from {}", prg_file.display());
    let (prgs, index) = build_prgs_and_index(prg_file, w, k)?;

    let kmer_prgs_dir = outdir.join("kmer_prgs");
    fs::create_dir_all(&kmer_prgs_dir)
        .with_context(|| format!("creating {}", kmer_prgs_dir.display()))?;

    for prg in &prgs {
        let gfa = kmer_prgs_dir.join(format!("{}.k{}.w{}.gfa", prg.name, k, w));
        prg.kmer_graph.save(&gfa)?;
    }

    let idx_path = index_path_for(prg_file, w, k);
    index.save(&idx_path)?;
    info!("wrote index to {}", idx_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_index_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let prg_file = dir.path().join("prgs.fa");
        std::fs::write(&prg_file, ">locusA\nAAGCTGACGT\n>locusB\nAAG(CT|TT)CGA\n").unwrap();

        run_index(&prg_file, 1, 3, dir.path()).unwrap();

        let idx_path = index_path_for(&prg_file, 1, 3);
        assert!(idx_path.exists());
        assert!(dir.path().join("kmer_prgs/locusA.k3.w1.gfa").exists());
        assert!(dir.path().join("kmer_prgs/locusB.k3.w1.gfa").exists());

        // the artifact loads back with matching parameters only
        assert!(MinimizerIndex::load(&idx_path, 1, 3).is_ok());
        assert!(MinimizerIndex::load(&idx_path, 5, 3).is_err());
    }

    #[test]
    fn test_malformed_locus_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let prg_file = dir.path().join("prgs.fa");
        std::fs::write(&prg_file, ">bad\nAAG(CT\n>good\nAAGCTG\n").unwrap();

        let (prgs, _index) = build_prgs_and_index(&prg_file, 1, 3).unwrap();
        assert_eq!(prgs.len(), 1);
        assert_eq!(prgs[0].name, "good");
    }
}
