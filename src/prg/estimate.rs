// src/prg/estimate.rs
//! Estimating the error rate and the log-probability threshold from the
//! observed k-mer coverage spectrum, after a mapping pass.
//!
//! The coverage histogram of real data is bimodal: an error peak near zero
//! and a signal peak near the sequencing depth. The error rate follows from
//! where the second peak sits; the threshold is the valley between the two
//! tallest peaks of the per-node log-probability distribution.

use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::{debug, info};

use crate::error::{PrgMapError, Result};
use crate::pangraph::PanGraph;
use crate::prg::coverage::ProbModel;

/// Coverage histogram length: coverages at or above this are ignored.
const COVG_BINS: usize = 1000;
/// Log-probability bins covering `[-200, 0)`.
const PROB_BINS: usize = 200;
/// Peaks this close to the right edge count as "second peak" on the first
/// scan; the retry is more permissive.
const EDGE_WINDOW_FIRST: usize = 15;
const EDGE_WINDOW_RETRY: usize = 6;

/// Position of the second peak of a coverage histogram.
///
/// Scans left to right and requires three consecutive increases to believe
/// the first (error) peak has been left behind; the maximum thereafter is
/// the answer. Returns 0 when no second peak emerges.
pub fn find_mean_covg(kmer_covg_dist: &[u32]) -> usize {
    let mut first_peak = true;
    let mut max_covg = 0usize;
    let mut noise_buffer = 0u32;

    for i in 1..kmer_covg_dist.len() {
        if kmer_covg_dist[i] <= kmer_covg_dist[i - 1] {
            // only interested in where a decreasing section ends
            continue;
        } else if first_peak && noise_buffer < 3 {
            noise_buffer += 1;
            continue;
        } else if first_peak {
            first_peak = false;
            max_covg = i;
        } else if kmer_covg_dist[i] > kmer_covg_dist[max_covg] {
            max_covg = i;
        }
    }

    if first_peak {
        debug!("did not find two distinct coverage peaks");
        max_covg = 0;
    }
    max_covg
}

fn argmax(slice: &[u32]) -> usize {
    let mut best = 0;
    for (i, &v) in slice.iter().enumerate() {
        if v > slice[best] {
            best = i;
        }
    }
    best
}

fn argmin(slice: &[u32]) -> usize {
    let mut best = 0;
    for (i, &v) in slice.iter().enumerate() {
        if v < slice[best] {
            best = i;
        }
    }
    best
}

/// Alternate the two peak cursors inward until both sit strictly interior.
/// `None` when no two genuine (non-empty) peaks exist.
fn pull_peaks(dist: &[u32], edge_window: usize) -> Option<(usize, usize)> {
    let n = dist.len();
    let mut first_peak = 0usize;
    let mut second_peak = n - 1;

    while (first_peak == 0 || second_peak == n - 1) && first_peak != second_peak {
        let lo = 1 + first_peak;
        if lo >= second_peak {
            return None;
        }
        let peak = lo + argmax(&dist[lo..second_peak]);
        if dist[peak] == 0 {
            return None;
        }
        debug!(
            "found peak between {} and {} at {}",
            first_peak as i32 - PROB_BINS as i32,
            second_peak as i32 - PROB_BINS as i32,
            peak as i32 - PROB_BINS as i32
        );
        if peak + edge_window > n {
            second_peak = peak;
        } else {
            first_peak = peak;
        }
    }

    if first_peak != 0 && second_peak != n - 1 && first_peak != second_peak {
        Some((first_peak, second_peak))
    } else {
        None
    }
}

/// Threshold separating true from noise k-mers: the minimum between the two
/// tallest peaks of the log-probability distribution, as a bin index offset
/// to `[-200, 0)`.
pub fn find_prob_thresh(kmer_prob_dist: &[u32]) -> i32 {
    if kmer_prob_dist.is_empty() {
        return 0;
    }
    let offset = kmer_prob_dist.len() as i32;

    let peaks = pull_peaks(kmer_prob_dist, EDGE_WINDOW_FIRST)
        .or_else(|| pull_peaks(kmer_prob_dist, EDGE_WINDOW_RETRY));

    let (first_peak, second_peak) = match peaks {
        Some(pair) => pair,
        None => {
            // single peak: pick the smallest non-zero bin right of it
            let mut peak = argmax(kmer_prob_dist);
            for i in peak..kmer_prob_dist.len() {
                if kmer_prob_dist[i] > 0
                    && (kmer_prob_dist[i] < kmer_prob_dist[peak] || kmer_prob_dist[peak] == 0)
                {
                    peak = i;
                }
            }
            debug!("found a single peak, choosing a minimal non-zero threshold");
            return peak as i32 - offset;
        }
    };

    let valley = first_peak + argmin(&kmer_prob_dist[first_peak..second_peak]);
    debug!(
        "minimum found between {} and {} at {}",
        first_peak as i32 - offset,
        second_peak as i32 - offset,
        valley as i32 - offset
    );
    valley as i32 - offset
}

/// Estimate the error rate and probability threshold from the accumulated
/// coverage of every locus, writing the raw distributions alongside, and
/// push the chosen threshold into every locus.
///
/// Returns the threshold, or `None` when the pangraph holds nothing.
pub fn estimate_parameters(
    pangraph: &mut PanGraph,
    prefix: &str,
    k: u32,
    e_rate: &mut f32,
    sample_id: usize,
) -> Result<Option<i32>> {
    if pangraph.is_empty() {
        return Ok(None);
    }

    // coverage spectrum over every interior k-mer of every locus
    info!("collect kmer coverage distribution");
    let mut kmer_covg_dist = vec![0u32; COVG_BINS];
    let mut num_reads_total: u64 = 0;
    for node in pangraph.nodes() {
        num_reads_total += node.kmer_coverage.num_reads as u64;
        for kmer_node in node.kmer_coverage.kmer_graph.nodes() {
            if kmer_node.path.is_terminal() {
                continue;
            }
            let covg = node.kmer_coverage.get_covg(kmer_node.id, true, sample_id)
                + node.kmer_coverage.get_covg(kmer_node.id, false, sample_id);
            if (covg as usize) < COVG_BINS {
                kmer_covg_dist[covg as usize] += 1;
            }
        }
    }
    let avg_reads_per_locus = (num_reads_total / pangraph.len() as u64) as u32;

    let covgs_path = format!("{}.kmer_covgs.txt", prefix);
    info!("writing kmer coverage distribution to {}", covgs_path);
    write_dist(&covgs_path, &kmer_covg_dist, 0)?;

    // error rate from the second peak
    if avg_reads_per_locus > 30 {
        let mean_covg = find_mean_covg(&kmer_covg_dist);
        debug!(
            "found mean covg {} and avg reads per locus {}",
            mean_covg, avg_reads_per_locus
        );
        if mean_covg > 0 {
            let new_e_rate =
                -(mean_covg as f32 / avg_reads_per_locus as f32).ln() / k as f32;
            info!("estimated error rate updated from {} to {}", e_rate, new_e_rate);
            *e_rate = new_e_rate;
            for node in pangraph.nodes_mut() {
                node.kmer_coverage.set_exp_depth_covg(mean_covg as u32)?;
            }
        }
    } else {
        info!("insufficient coverage to update error rate");
    }

    // moment-fit the negative binomial to the same spectrum
    let (mean, variance) = dist_moments(&kmer_covg_dist);
    if variance > mean && mean > 0.0 {
        let p = (mean / variance) as f32;
        let r = (mean * mean / (variance - mean)) as f32;
        debug!("negative binomial moment fit: p = {}, r = {}", p, r);
        for node in pangraph.nodes_mut() {
            let coverage = &mut node.kmer_coverage;
            let p_add = p - coverage.negative_binomial_parameter_p;
            let r_add = r - coverage.negative_binomial_parameter_r;
            coverage.set_negative_binomial_parameters(p_add, r_add)?;
        }
    }

    // log-probability spectrum under the binomial model at the (possibly
    // updated) error rate
    info!("collect kmer probability distribution");
    let mut kmer_prob_dist = vec![0u32; PROB_BINS];
    for node in pangraph.nodes_mut() {
        node.kmer_coverage.set_binomial_parameter_p(*e_rate)?;
        let kmer_graph = node.kmer_coverage.kmer_graph.clone();
        for kmer_node in kmer_graph.nodes() {
            if kmer_node.path.is_terminal() {
                continue;
            }
            let p = node
                .kmer_coverage
                .get_prob(ProbModel::Binomial, kmer_node.id, sample_id)?;
            for j in 0..PROB_BINS {
                let lo = j as f32 - PROB_BINS as f32;
                if lo <= p && p < lo + 1.0 {
                    kmer_prob_dist[j] += 1;
                    break;
                }
            }
        }
    }

    let probs_path = format!("{}.kmer_probs.txt", prefix);
    info!("writing kmer probability distribution to {}", probs_path);
    write_dist(&probs_path, &kmer_prob_dist, -(PROB_BINS as i64))?;

    // threshold: need enough covered k-mers for peak finding to mean much
    let first_nonzero = kmer_prob_dist
        .iter()
        .position(|&c| c > 0)
        .unwrap_or(PROB_BINS - 1);
    let naive = (first_nonzero + 1).min(PROB_BINS);
    let remaining: u64 = kmer_prob_dist[naive..].iter().map(|&c| c as u64).sum();
    let thresh = if remaining > 1000 {
        let t = find_prob_thresh(&kmer_prob_dist);
        info!("estimated threshold for true kmers is {}", t);
        t
    } else {
        let t = naive as i32 - PROB_BINS as i32;
        info!(
            "not enough covered kmers to estimate a threshold, using the naive threshold {}",
            t
        );
        t
    };

    for node in pangraph.nodes_mut() {
        node.kmer_coverage.thresh = thresh as f32;
    }
    Ok(Some(thresh))
}

/// Mean and variance of a histogram read as value -> count.
fn dist_moments(dist: &[u32]) -> (f64, f64) {
    let total: u64 = dist.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return (0.0, 0.0);
    }
    let mean = dist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum::<f64>()
        / total as f64;
    let variance = dist
        .iter()
        .enumerate()
        .map(|(i, &c)| c as f64 * (i as f64 - mean).powi(2))
        .sum::<f64>()
        / total as f64;
    (mean, variance)
}

fn write_dist(path: &str, dist: &[u32], offset: i64) -> Result<()> {
    let file = File::create(path).map_err(|e| PrgMapError::io(path, e))?;
    let mut handle = BufWriter::new(file);
    for (i, count) in dist.iter().enumerate() {
        writeln!(handle, "{}\t{}", i as i64 + offset, count)
            .map_err(|e| PrgMapError::io(path, e))?;
    }
    Ok(())
}
