// src/pipeline/compare.rs
//! The `compare` subcommand: map several samples against the same PRG set
//! and call every locus per sample independently, alongside a random-path
//! null score per locus.

use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use crate::error::PrgMapError;
use crate::io::read_sequences;
use crate::pangraph::PanGraph;
use crate::pipeline::index::build_prgs_and_index;
use crate::pipeline::map::{map_reads_into_pangraph, MapParams};
use crate::prg::NO_SIGNAL;

/// How many random paths feed each locus's null score.
const NUM_NULL_PATHS: u32 = 10;

/// Parse the sample sheet: one `name<TAB>reads-path` per line, `#` comments
/// allowed.
pub fn read_sample_sheet(path: &Path) -> crate::error::Result<Vec<(String, PathBuf)>> {
    let file = File::open(path).map_err(|e| PrgMapError::io(path.display().to_string(), e))?;
    let mut samples = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line.map_err(|e| PrgMapError::io(path.display().to_string(), e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (name, reads) = trimmed.split_once('\t').ok_or_else(|| {
            PrgMapError::MalformedInput(format!(
                "sample sheet line is not name<TAB>path: {}",
                trimmed
            ))
        })?;
        samples.push((name.to_string(), PathBuf::from(reads)));
    }
    if samples.is_empty() {
        return Err(PrgMapError::MalformedInput(format!(
            "sample sheet {} lists no samples",
            path.display()
        )));
    }
    Ok(samples)
}

pub fn run_compare(
    prg_file: &Path,
    sample_sheet: &Path,
    out_prefix: &str,
    params: &MapParams,
) -> anyhow::Result<()> {
    let samples = read_sample_sheet(sample_sheet)?;
    info!(
        "comparing {} samples against {}",
        samples.len(),
        prg_file.display()
    );

    let (prgs, index) = build_prgs_and_index(prg_file, params.w, params.k)?;
    let num_samples = samples.len();

    let mut pangraph = PanGraph::new();
    let stop = AtomicBool::new(false);
    let mut read_id_offset = 0u32;
    for (sample_id, (name, reads_path)) in samples.iter().enumerate() {
        let reads = read_sequences(reads_path)?;
        info!("sample {}: {} reads", name, reads.len());
        map_reads_into_pangraph(
            &prgs,
            &index,
            &reads,
            params,
            sample_id,
            num_samples,
            read_id_offset,
            &mut pangraph,
            &stop,
        )?;
        read_id_offset += reads.len() as u32;
    }

    let mut e_rate = params.e_rate;
    crate::prg::estimate_parameters(&mut pangraph, out_prefix, params.k, &mut e_rate, 0)?;

    // per-site, per-sample independent calls
    let locus_ids = pangraph.prg_ids();
    let mut score_rows: Vec<(String, Vec<f32>)> = Vec::new();
    let mut null_rows: Vec<(String, Vec<f32>)> = Vec::new();
    for prg_id in locus_ids {
        let name = pangraph.node(prg_id).expect("listed locus").name.clone();
        let mut scores = Vec::with_capacity(num_samples);
        let mut nulls = Vec::with_capacity(num_samples);
        for sample_id in 0..num_samples {
            let node = pangraph.node_mut(prg_id).expect("listed locus");
            node.kmer_coverage.num_reads = node.sample_read_counts[sample_id];

            let node = pangraph.node(prg_id).expect("listed locus");
            let score = match node.kmer_coverage.find_max_path(
                params.model,
                params.max_kmers_to_average,
                sample_id,
            ) {
                Ok(Some(max_path)) => max_path.score,
                Ok(None) => NO_SIGNAL,
                Err(e) => {
                    warn!("locus {} sample {}: {}", node.name, sample_id, e);
                    NO_SIGNAL
                }
            };
            scores.push(score);

            let random = node.kmer_coverage.random_paths(NUM_NULL_PATHS);
            let mut null = 0.0f32;
            let mut counted = 0u32;
            for path in &random {
                if let Ok(p) = node
                    .kmer_coverage
                    .prob_path(path, sample_id, params.model)
                {
                    if p > NO_SIGNAL {
                        null += p;
                        counted += 1;
                    }
                }
            }
            nulls.push(if counted > 0 {
                null / counted as f32
            } else {
                NO_SIGNAL
            });
        }
        score_rows.push((name.clone(), scores));
        null_rows.push((name, nulls));
    }

    let sample_names: Vec<&str> = samples.iter().map(|(name, _)| name.as_str()).collect();
    write_matrix(
        &format!("{}.matrix", out_prefix),
        &sample_names,
        &score_rows,
    )?;
    write_matrix(
        &format!("{}.null_scores.txt", out_prefix),
        &sample_names,
        &null_rows,
    )?;

    pangraph.write_gfa(format!("{}.pangraph.gfa", out_prefix))?;
    info!("compare finished over {} loci", score_rows.len());
    Ok(())
}

fn write_matrix(
    path: &str,
    sample_names: &[&str],
    rows: &[(String, Vec<f32>)],
) -> crate::error::Result<()> {
    let file = File::create(path).map_err(|e| PrgMapError::io(path, e))?;
    let mut handle = BufWriter::new(file);
    let io_err = |e| PrgMapError::io(path, e);

    write!(handle, "locus").map_err(io_err)?;
    for name in sample_names {
        write!(handle, "\t{}", name).map_err(io_err)?;
    }
    writeln!(handle).map_err(io_err)?;

    for (locus, values) in rows {
        write!(handle, "{}", locus).map_err(io_err)?;
        for value in values {
            if *value <= NO_SIGNAL {
                write!(handle, "\tNA").map_err(io_err)?;
            } else {
                write!(handle, "\t{:.5}", value).map_err(io_err)?;
            }
        }
        writeln!(handle).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sample_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("samples.tsv");
        std::fs::write(&sheet, "# comment\nsampleA\ta.fq\nsampleB\tb.fq\n").unwrap();

        let samples = read_sample_sheet(&sheet).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].0, "sampleA");
        assert_eq!(samples[1].1, PathBuf::from("b.fq"));
    }

    #[test]
    fn test_sample_sheet_rejects_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("samples.tsv");
        std::fs::write(&sheet, "just-a-name\n").unwrap();
        assert!(read_sample_sheet(&sheet).is_err());

        std::fs::write(&sheet, "").unwrap();
        assert!(read_sample_sheet(&sheet).is_err());
    }

    #[test]
    fn test_run_compare_writes_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let prg_file = dir.path().join("prgs.fa");
        std::fs::write(&prg_file, ">locusA\nTTAGGCAT(CCG|TTT)AACGTCA\n").unwrap();

        // sample 1 carries the first allele, sample 2 the second
        let reads_a = dir.path().join("a.fa");
        std::fs::write(&reads_a, ">r0\nTTAGGCATCCGAACGTCA\n>r1\nTTAGGCATCCGAACGTCA\n").unwrap();
        let reads_b = dir.path().join("b.fa");
        std::fs::write(&reads_b, ">r0\nTTAGGCATTTTAACGTCA\n>r1\nTTAGGCATTTTAACGTCA\n").unwrap();

        let sheet = dir.path().join("samples.tsv");
        std::fs::write(
            &sheet,
            format!(
                "sampleA\t{}\nsampleB\t{}\n",
                reads_a.display(),
                reads_b.display()
            ),
        )
        .unwrap();

        let prefix = dir.path().join("cmp").display().to_string();
        let params = MapParams {
            w: 1,
            k: 5,
            max_diff: 10,
            cluster_thresh: 2,
            model: crate::prg::ProbModel::Linear,
            ..MapParams::default()
        };
        run_compare(&prg_file, &sheet, &prefix, &params).unwrap();

        let matrix = std::fs::read_to_string(dir.path().join("cmp.matrix")).unwrap();
        let mut lines = matrix.lines();
        assert_eq!(lines.next().unwrap(), "locus\tsampleA\tsampleB");
        let row = lines.next().unwrap();
        assert!(row.starts_with("locusA\t"));
        // both samples cover the locus, so neither scores NA
        assert!(!row.contains("NA"), "row: {}", row);

        assert!(dir.path().join("cmp.null_scores.txt").exists());
        assert!(dir.path().join("cmp.pangraph.gfa").exists());
    }
}
