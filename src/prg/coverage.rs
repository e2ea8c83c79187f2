// src/prg/coverage.rs
//! Per-sample coverage over a k-mer graph and the maximum-likelihood path
//! search that turns accumulated coverage into a called path.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use statrs::distribution::{Discrete, NegativeBinomial};
use statrs::function::gamma::ln_gamma;
use tracing::debug;

use crate::error::{PrgMapError, Result};
use crate::prg::aligner::ReadAligner;
use crate::prg::kmer_graph::KmerGraph;
use crate::prg::local_prg::LocalPrg;

/// Sentinel score for "no reads, nothing to infer".
pub const NO_SIGNAL: f32 = f32::MIN;

/// Traversals longer than this abort with `CycleSuspected`.
const MAX_PATH_NODES: usize = 1_000_000;

/// Which emission model scores a node's coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbModel {
    Linear,
    Binomial,
    NegativeBinomial,
}

impl FromStr for ProbModel {
    type Err = PrgMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lin" => Ok(ProbModel::Linear),
            "bin" => Ok(ProbModel::Binomial),
            "nbin" => Ok(ProbModel::NegativeBinomial),
            other => Err(PrgMapError::UnknownProbModel(other.to_string())),
        }
    }
}

/// A called path: interior k-mer node ids (terminals excluded) and its
/// length-normalized log-probability.
#[derive(Debug, Clone)]
pub struct MaxPath {
    pub node_ids: Vec<usize>,
    pub score: f32,
}

/// A k-mer graph plus per-sample strand-split coverage counters and the
/// scalar parameters of the emission models.
#[derive(Debug, Clone)]
pub struct KmerGraphWithCoverage {
    pub kmer_graph: Arc<KmerGraph>,
    /// `covgs[node][sample] = (forward, reverse)`; increments saturate at
    /// `u16::MAX` by contract.
    covgs: Vec<Vec<(u16, u16)>>,
    pub num_reads: u32,
    pub exp_depth_covg: u32,
    pub binomial_parameter_p: f32,
    pub negative_binomial_parameter_p: f32,
    pub negative_binomial_parameter_r: f32,
    pub thresh: f32,
}

impl KmerGraphWithCoverage {
    pub fn new(kmer_graph: Arc<KmerGraph>, num_samples: usize) -> Self {
        let covgs = vec![vec![(0u16, 0u16); num_samples]; kmer_graph.len()];
        KmerGraphWithCoverage {
            kmer_graph,
            covgs,
            num_reads: 0,
            exp_depth_covg: 1,
            binomial_parameter_p: 1.0,
            negative_binomial_parameter_p: 0.015,
            negative_binomial_parameter_r: 2.0,
            thresh: -25.0,
        }
    }

    pub fn set_exp_depth_covg(&mut self, exp_depth_covg: u32) -> Result<()> {
        if exp_depth_covg == 0 {
            return Err(PrgMapError::InvalidParameters(
                "exp_depth_covg must be > 0".into(),
            ));
        }
        self.exp_depth_covg = exp_depth_covg;
        Ok(())
    }

    /// Derive the binomial hit probability from the per-base error rate:
    /// a k-mer survives sequencing error with probability `exp(-e_rate * k)`.
    pub fn set_binomial_parameter_p(&mut self, e_rate: f32) -> Result<()> {
        debug!("set binomial parameter p from e_rate {}", e_rate);
        if self.kmer_graph.k == 0 || e_rate <= 0.0 || e_rate >= 1.0 {
            return Err(PrgMapError::InvalidParameters(format!(
                "cannot set binomial p with k = {}, e_rate = {}",
                self.kmer_graph.k, e_rate
            )));
        }
        self.binomial_parameter_p = (-(e_rate * self.kmer_graph.k as f32)).exp();
        Ok(())
    }

    pub fn set_negative_binomial_parameters(&mut self, p_add: f32, r_add: f32) -> Result<()> {
        if p_add == 0.0 && r_add == 0.0 {
            return Ok(());
        }
        let previously_valid = self.negative_binomial_parameter_p > 0.0
            && self.negative_binomial_parameter_p < 1.0
            && self.negative_binomial_parameter_r > 0.0;
        if !previously_valid {
            return Err(PrgMapError::InvalidParameters(format!(
                "negative binomial parameters p = {}, r = {} were not correctly set",
                self.negative_binomial_parameter_p, self.negative_binomial_parameter_r
            )));
        }
        self.negative_binomial_parameter_p += p_add;
        self.negative_binomial_parameter_r += r_add;
        Ok(())
    }

    /// Bump a node's counter for one observed k-mer, saturating at the u16
    /// ceiling: never wraps, never panics.
    pub fn increment_covg(&mut self, node_id: usize, strand: bool, sample_id: usize) {
        let slot = &mut self.covgs[node_id][sample_id];
        if strand {
            slot.0 = slot.0.saturating_add(1);
        } else {
            slot.1 = slot.1.saturating_add(1);
        }
    }

    pub fn get_covg(&self, node_id: usize, strand: bool, sample_id: usize) -> u32 {
        match self.covgs.get(node_id).and_then(|s| s.get(sample_id)) {
            Some(&(fwd, rev)) => {
                if strand {
                    fwd as u32
                } else {
                    rev as u32
                }
            }
            None => 0,
        }
    }

    pub fn set_covg(&mut self, node_id: usize, value: u16, strand: bool, sample_id: usize) {
        let slot = &mut self.covgs[node_id][sample_id];
        if strand {
            slot.0 = value;
        } else {
            slot.1 = value;
        }
    }

    fn total_covg(&self, node_id: usize, sample_id: usize) -> u32 {
        self.get_covg(node_id, true, sample_id) + self.get_covg(node_id, false, sample_id)
    }

    pub fn coverage_is_zeroes(&self, sample_id: usize) -> bool {
        let all_zero = self
            .kmer_graph
            .nodes()
            .iter()
            .all(|n| self.total_covg(n.id, sample_id) == 0);
        if all_zero {
            debug!("all coverages are zero in this kmer graph");
        }
        all_zero
    }

    fn lin_prob(&self, node_id: usize, sample_id: usize) -> f32 {
        let c = self.total_covg(node_id, sample_id);
        (c as f32 / self.num_reads as f32).ln()
    }

    fn nbin_prob(&self, node_id: usize, sample_id: usize) -> Result<f32> {
        let dist = NegativeBinomial::new(
            self.negative_binomial_parameter_r as f64,
            self.negative_binomial_parameter_p as f64,
        )
        .map_err(|e| {
            PrgMapError::InvalidParameters(format!("negative binomial parameters: {}", e))
        })?;
        let c = self.total_covg(node_id, sample_id);
        let log_prob = dist.pmf(c as u64).ln() as f32;
        // keep a saturated floor so one impossible node cannot poison a sum
        Ok(log_prob.max(f32::MIN / 1000.0))
    }

    fn bin_prob(&self, node_id: usize, num: u32, sample_id: usize) -> Result<f32> {
        if self.binomial_parameter_p >= 1.0 {
            return Err(PrgMapError::InvalidParameters(format!(
                "binomial parameter p = {} is not set",
                self.binomial_parameter_p
            )));
        }
        if node_id >= self.kmer_graph.len() {
            return Err(PrgMapError::InvalidParameters(format!(
                "no node {} in this kmer graph",
                node_id
            )));
        }

        // emission is undefined on the empty terminal k-mers
        if node_id == self.kmer_graph.source() || node_id == self.kmer_graph.sink() {
            return Ok(0.0);
        }

        let fwd = self.get_covg(node_id, true, sample_id);
        let rev = self.get_covg(node_id, false, sample_id);
        let c = fwd + rev;
        let p = self.binomial_parameter_p;

        // under the model c <= num, but repeat k-mers will exceed it
        let prob = if c > num {
            lognchoosek2(c, fwd, rev) + c as f32 * (p / 2.0).ln()
        } else {
            lognchoosek2(num, fwd, rev)
                + c as f32 * (p / 2.0).ln()
                + (num - c) as f32 * (1.0 - p).ln()
        };
        Ok(prob)
    }

    /// Log-probability of one node's coverage under the chosen model.
    ///
    /// Returns the no-signal sentinel when no reads have been mapped.
    pub fn get_prob(&self, model: ProbModel, node_id: usize, sample_id: usize) -> Result<f32> {
        if self.num_reads == 0 {
            return Ok(NO_SIGNAL);
        }
        match model {
            ProbModel::Linear => Ok(self.lin_prob(node_id, sample_id)),
            ProbModel::Binomial => self.bin_prob(node_id, self.num_reads, sample_id),
            ProbModel::NegativeBinomial => self.nbin_prob(node_id, sample_id),
        }
    }

    /// Length-normalized log-probability of a node chain. Terminal nodes at
    /// either end carry no emission and do not count toward the length.
    pub fn prob_path(&self, node_ids: &[usize], sample_id: usize, model: ProbModel) -> Result<f32> {
        if node_ids.is_empty() {
            return Ok(NO_SIGNAL);
        }
        let mut sum = 0.0f32;
        for &id in node_ids {
            sum += self.get_prob(model, id, sample_id)?;
        }
        let mut len = node_ids.len();
        if self.kmer_graph.node(node_ids[0]).path.is_terminal() {
            len -= 1;
        }
        if node_ids.len() > 1
            && self
                .kmer_graph
                .node(*node_ids.last().expect("non-empty"))
                .path
                .is_terminal()
        {
            len -= 1;
        }
        Ok(sum / len.max(1) as f32)
    }

    /// Maximum-likelihood source-to-sink path under `model`.
    ///
    /// Walks the topologically sorted view in reverse so every node chooses
    /// among fully scored successors, maximizing the running mean of node
    /// log-probabilities. The mean slides over at most
    /// `max_num_kmers_to_average` k-mers. Successor selection prefers, in
    /// order: the sink while the best mean is still below `thresh`; a
    /// strictly better mean; the longer path on ties within tolerance.
    ///
    /// Returns `None` when nothing mapped (the no-signal case).
    pub fn find_max_path(
        &self,
        model: ProbModel,
        max_num_kmers_to_average: u32,
        sample_id: usize,
    ) -> Result<Option<MaxPath>> {
        self.kmer_graph.check()?;
        if self.num_reads == 0 || self.coverage_is_zeroes(sample_id) {
            return Ok(None);
        }

        let sorted = self.kmer_graph.sorted_ids();
        let n = sorted.len();
        let source = self.kmer_graph.source();
        let sink = self.kmer_graph.sink();
        let tolerance = 1e-6f32;

        let mut max_sum = vec![0.0f32; n];
        let mut len_from = vec![0u32; n];
        let mut prev = vec![sink; n];

        for j in (0..n - 1).rev() {
            let current = sorted[j];
            let mut max_mean = f32::MIN;
            let mut max_length = 0u32;

            for &out in &self.kmer_graph.node(current).outs {
                // NaN for the sink (0/0), which fails every comparison below
                // and leaves the sink to its dedicated branch
                let out_mean = max_sum[out] / len_from[out] as f32;

                let is_terminus_and_most_likely =
                    out == sink && self.thresh > max_mean + tolerance;
                let avg_is_most_likely = out_mean > max_mean + tolerance;
                let avg_is_close = max_mean - out_mean <= tolerance;
                let is_longer_path = len_from[out] > max_length;

                if is_terminus_and_most_likely
                    || avg_is_most_likely
                    || (avg_is_close && is_longer_path)
                {
                    max_sum[current] =
                        self.get_prob(model, current, sample_id)? + max_sum[out];
                    len_from[current] = 1 + len_from[out];
                    prev[current] = out;

                    if len_from[current] > max_num_kmers_to_average {
                        // drop the oldest node so the average slides
                        let mut oldest = prev[current];
                        for _ in 1..max_num_kmers_to_average {
                            oldest = prev[oldest];
                        }
                        max_sum[current] -= self.get_prob(model, oldest, sample_id)?;
                        len_from[current] -= 1;
                        debug_assert_eq!(len_from[current], max_num_kmers_to_average);
                    }

                    if out != sink {
                        max_mean = max_sum[out] / len_from[out] as f32;
                        max_length = len_from[out];
                    } else {
                        max_mean = self.thresh;
                    }
                }
            }
        }

        if len_from[source] == 0 {
            return Err(PrgMapError::MalformedKmerGraph(
                "found no path through the kmer graph".into(),
            ));
        }
        let node_ids = self.follow_prev(prev[source], &prev)?;
        let score = self.prob_path(&node_ids, sample_id, model)?;
        Ok(Some(MaxPath { node_ids, score }))
    }

    /// ML path with base-level mapping rescue at every fork: each
    /// successor's downstream called sequence is realigned against the
    /// locus reads and the successor with most primary alignments wins.
    /// Ties and empty alignments fall back to the sink successor when
    /// present, then to the highest-coverage successor.
    pub fn find_max_path_with_base_level_mapping(
        &self,
        model: ProbModel,
        sample_id: usize,
        prg: &LocalPrg,
        reads: &Path,
        aligner: &dyn ReadAligner,
    ) -> Result<Option<MaxPath>> {
        self.kmer_graph.check()?;
        if self.num_reads == 0 || self.coverage_is_zeroes(sample_id) {
            return Ok(None);
        }

        let sorted = self.kmer_graph.sorted_ids();
        let n = sorted.len();
        let source = self.kmer_graph.source();
        let sink = self.kmer_graph.sink();
        let mut prev = vec![sink; n];

        for j in (0..n - 1).rev() {
            let current = sorted[j];
            let outs = &self.kmer_graph.node(current).outs;
            let chosen = match outs.len() {
                0 => continue,
                1 => outs[0],
                _ => self.choose_outnode_by_mapping(outs, &prev, prg, reads, aligner, sample_id)?,
            };
            prev[current] = chosen;
        }

        if prev[source] == sink {
            return Err(PrgMapError::MalformedKmerGraph(
                "found no path through the kmer graph".into(),
            ));
        }
        let node_ids = self.follow_prev(prev[source], &prev)?;
        let score = self.prob_path(&node_ids, sample_id, model)?;
        Ok(Some(MaxPath { node_ids, score }))
    }

    fn choose_outnode_by_mapping(
        &self,
        outs: &[usize],
        prev: &[usize],
        prg: &LocalPrg,
        reads: &Path,
        aligner: &dyn ReadAligner,
        sample_id: usize,
    ) -> Result<usize> {
        let sink = self.kmer_graph.sink();

        let mut targets = Vec::new();
        for &out in outs {
            if out == sink {
                continue;
            }
            let downstream = self.extract_chain(out, prev)?;
            let seq = prg.sequence_along_kmer_path(&downstream);
            if !seq.is_empty() {
                targets.push((out.to_string(), seq));
            }
        }

        let counts = aligner.count_primary_hits(&targets, reads)?;
        let best_count = targets
            .iter()
            .filter_map(|(name, _)| counts.get(name))
            .max()
            .copied()
            .unwrap_or(0);
        if best_count > 0 {
            let winners: Vec<usize> = targets
                .iter()
                .filter(|(name, _)| counts.get(name) == Some(&best_count))
                .map(|(name, _)| name.parse().expect("target names are node ids"))
                .collect();
            if winners.len() == 1 {
                return Ok(winners[0]);
            }
        }

        // no alignments, or a tie: prefer finishing at the sink
        if outs.contains(&sink) {
            return Ok(sink);
        }
        // otherwise the most covered successor
        let mut best = outs[0];
        let mut best_covg = self.total_covg(best, sample_id);
        for &out in &outs[1..] {
            let covg = self.total_covg(out, sample_id);
            if covg > best_covg {
                best = out;
                best_covg = covg;
            }
        }
        Ok(best)
    }

    /// Follow successor pointers from `from` until the sink, guarding
    /// against runaway traversals.
    fn extract_chain(&self, from: usize, prev: &[usize]) -> Result<Vec<usize>> {
        let sink = self.kmer_graph.sink();
        let mut chain = vec![from];
        let mut node = prev[from];
        while node != sink {
            chain.push(node);
            node = prev[node];
            if chain.len() > MAX_PATH_NODES {
                return Err(PrgMapError::CycleSuspected(MAX_PATH_NODES));
            }
        }
        Ok(chain)
    }

    fn follow_prev(&self, first: usize, prev: &[usize]) -> Result<Vec<usize>> {
        let sink = self.kmer_graph.sink();
        if first == sink {
            return Ok(Vec::new());
        }
        self.extract_chain(first, prev)
    }

    /// Draw paths choosing uniformly among out-neighbours at each node.
    /// Terminals are excluded from the returned paths.
    pub fn random_paths(&self, num_paths: u32) -> Vec<Vec<usize>> {
        let mut rng = rand::thread_rng();
        let mut paths = Vec::new();
        if self.kmer_graph.is_empty() || self.kmer_graph.node(0).outs.is_empty() {
            return paths;
        }
        let sink = self.kmer_graph.sink();
        for _ in 0..num_paths {
            let mut path = Vec::new();
            let outs = &self.kmer_graph.node(0).outs;
            let mut node = outs[rng.gen_range(0..outs.len())];
            while node != sink {
                path.push(node);
                let outs = &self.kmer_graph.node(node).outs;
                if outs.is_empty() {
                    break;
                }
                node = outs[rng.gen_range(0..outs.len())];
            }
            paths.push(path);
        }
        paths
    }

    /// Write the graph with this sample's coverage in the `FC`/`RC` tags.
    pub fn save<P: AsRef<Path>>(&self, filepath: P, sample_id: usize) -> Result<()> {
        let path_str = filepath.as_ref().display().to_string();
        let file =
            std::fs::File::create(filepath.as_ref()).map_err(|e| PrgMapError::io(path_str.as_str(), e))?;
        let mut handle = std::io::BufWriter::new(file);
        self.kmer_graph
            .write_gfa(&mut handle, |id| {
                (
                    self.get_covg(id, true, sample_id) as u16,
                    self.get_covg(id, false, sample_id) as u16,
                )
            })
            .map_err(|e| PrgMapError::io(path_str.as_str(), e))
    }

    /// Rebuild from a GFA written by [`KmerGraphWithCoverage::save`],
    /// restoring the coverage into sample 0.
    pub fn load<P: AsRef<Path>>(filepath: P, num_samples: usize) -> Result<Self> {
        let graph = KmerGraph::load(filepath)?;
        let covg_pairs: Vec<(u16, u16)> = graph.nodes().iter().map(|n| n.covg).collect();
        let mut out = KmerGraphWithCoverage::new(Arc::new(graph), num_samples.max(1));
        for (id, (fwd, rev)) in covg_pairs.into_iter().enumerate() {
            out.set_covg(id, fwd, true, 0);
            out.set_covg(id, rev, false, 0);
        }
        Ok(out)
    }
}

/// `ln C(n; f, r)`: the log multinomial coefficient choosing `f` forward and
/// `r` reverse observations out of `n`, via log-gamma.
fn lognchoosek2(n: u32, f: u32, r: u32) -> f32 {
    debug_assert!(
        n >= f + r,
        "multinomial coefficient needs n >= f + r, got n={}, f={}, r={}",
        n,
        f,
        r
    );
    let n = n as f64;
    let f = f as f64;
    let r = r as f64;
    (ln_gamma(n + 1.0) - ln_gamma(f + 1.0) - ln_gamma(r + 1.0) - ln_gamma(n - f - r + 1.0)) as f32
}
