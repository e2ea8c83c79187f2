// src/assembly/debruijn.rs
//! A minimum-coverage de Bruijn graph over read k-mers, with successor
//! iteration for the anchor-to-anchor DFS.
//!
//! K-mers are stored in read orientation; the anchor search layer handles
//! strand mismatches by retrying reverse-complemented anchors.

use ahash::AHashMap;

use crate::error::{PrgMapError, Result};
use crate::seq::is_dna;

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

#[derive(Debug, Clone)]
pub struct DeBruijnGraph {
    k: usize,
    kmers: AHashMap<String, u32>,
}

impl DeBruijnGraph {
    /// Count the k-mers of every read and keep those with abundance at
    /// least `min_coverage`.
    pub fn build<I, S>(reads: I, k: usize, min_coverage: u32) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if k == 0 {
            return Err(PrgMapError::InvalidParameters(
                "de Bruijn graph needs k > 0".into(),
            ));
        }

        let mut counts: AHashMap<String, u32> = AHashMap::new();
        for read in reads {
            let seq = read.as_ref().as_bytes();
            if seq.len() < k {
                continue;
            }
            for window in seq.windows(k) {
                if is_dna(window) {
                    let kmer = std::str::from_utf8(window).expect("validated ASCII");
                    *counts.entry(kmer.to_string()).or_insert(0) += 1;
                }
            }
        }
        counts.retain(|_, &mut count| count >= min_coverage);

        Ok(DeBruijnGraph { k, kmers: counts })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }

    pub fn contains(&self, kmer: &str) -> bool {
        self.kmers.contains_key(kmer)
    }

    pub fn abundance(&self, kmer: &str) -> u32 {
        self.kmers.get(kmer).copied().unwrap_or(0)
    }

    /// Nodes reachable by appending one base to the k-1 suffix.
    pub fn successors(&self, kmer: &str) -> Vec<String> {
        let mut out = Vec::new();
        if kmer.len() != self.k {
            return out;
        }
        for base in BASES {
            let mut next = kmer[1..].to_string();
            next.push(base);
            if self.contains(&next) {
                out.push(next);
            }
        }
        out
    }

    /// Nodes reachable by prepending one base to the k-1 prefix.
    pub fn predecessors(&self, kmer: &str) -> Vec<String> {
        let mut out = Vec::new();
        if kmer.len() != self.k {
            return out;
        }
        for base in BASES {
            let mut prev = base.to_string();
            prev.push_str(&kmer[..self.k - 1]);
            if self.contains(&prev) {
                out.push(prev);
            }
        }
        out
    }

    /// Clip tips: unbranched dead-end chains of at most `max_tip_len` nodes
    /// hanging off a junction. Isolated chains are whole sequences, not
    /// tips, and stay.
    pub fn clean_tips(&mut self, max_tip_len: usize) {
        let mut all: Vec<String> = self.kmers.keys().cloned().collect();
        all.sort();

        let mut to_remove: Vec<String> = Vec::new();
        for kmer in &all {
            if self.predecessors(kmer).is_empty() {
                if let Some(chain) = self.tip_from(kmer, true, max_tip_len) {
                    to_remove.extend(chain);
                }
            }
            if self.successors(kmer).is_empty() {
                if let Some(chain) = self.tip_from(kmer, false, max_tip_len) {
                    to_remove.extend(chain);
                }
            }
        }
        for kmer in to_remove {
            self.kmers.remove(&kmer);
        }
    }

    /// Walk from a dead end toward the graph body; the chain is a tip only
    /// if it attaches to a branching node within `max_tip_len` steps.
    fn tip_from(&self, start: &str, forward: bool, max_tip_len: usize) -> Option<Vec<String>> {
        let mut chain = vec![start.to_string()];
        let mut current = start.to_string();
        loop {
            if chain.len() > max_tip_len {
                return None;
            }
            let nexts = if forward {
                self.successors(&current)
            } else {
                self.predecessors(&current)
            };
            match nexts.len() {
                // the other end is also dead: an isolated chain
                0 => return None,
                1 => {
                    let next = nexts.into_iter().next().expect("one successor");
                    let back = if forward {
                        self.predecessors(&next)
                    } else {
                        self.successors(&next)
                    };
                    let side = if forward {
                        self.successors(&next)
                    } else {
                        self.predecessors(&next)
                    };
                    if back.len() > 1 || side.len() > 1 {
                        // next is a junction: the chain so far is the tip
                        return Some(chain);
                    }
                    chain.push(next.clone());
                    current = next;
                }
                _ => return Some(chain),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_counts_and_filters() {
        let reads = vec!["ACGTT", "ACGTT", "TTTTA"];
        let graph = DeBruijnGraph::build(reads, 3, 2).unwrap();
        // kmers of ACGTT appear twice, kmers of TTTTA once
        assert!(graph.contains("ACG"));
        assert!(graph.contains("CGT"));
        assert!(graph.contains("GTT"));
        assert!(!graph.contains("TTT"));
        assert_eq!(graph.abundance("ACG"), 2);
    }

    #[test]
    fn test_invalid_bases_are_skipped() {
        let graph = DeBruijnGraph::build(vec!["ACNGT"], 3, 1).unwrap();
        assert!(!graph.contains("ACN"));
        assert!(!graph.contains("CNG"));
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_successors_and_predecessors() {
        let graph = DeBruijnGraph::build(vec!["ACGTC"], 3, 1).unwrap();
        assert_eq!(graph.successors("ACG"), vec!["CGT"]);
        assert_eq!(graph.successors("CGT"), vec!["GTC"]);
        assert!(graph.successors("GTC").is_empty());
        assert_eq!(graph.predecessors("CGT"), vec!["ACG"]);
        assert!(graph.predecessors("ACG").is_empty());
    }

    #[test]
    fn test_clean_tips_removes_short_branch() {
        // a linear main path (every 2-mer context unique) plus a one-node
        // dead end branching off CTT
        let graph_reads = vec!["AACAGATCCGCTTGGTA", "CTTA"];
        let mut graph = DeBruijnGraph::build(graph_reads, 3, 1).unwrap();
        assert!(graph.contains("TTA"));
        assert_eq!(graph.successors("CTT").len(), 2);

        graph.clean_tips(2);
        assert!(!graph.contains("TTA"), "tip should be clipped");
        // both arms of the main chain are longer than the tip bound
        for kmer in ["AAC", "GCT", "CTT", "TTG", "GGT", "GTA"] {
            assert!(graph.contains(kmer), "{} should survive", kmer);
        }
    }

    #[test]
    fn test_clean_tips_keeps_isolated_chain() {
        let mut graph = DeBruijnGraph::build(vec!["TGATCAGC"], 3, 1).unwrap();
        let before = graph.len();
        graph.clean_tips(6);
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_zero_k_is_invalid() {
        assert!(DeBruijnGraph::build(vec!["ACGT"], 0, 1).is_err());
    }
}
