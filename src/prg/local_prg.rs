// src/prg/local_prg.rs
//! One locus: the bracketed PRG text, its parsed local graph, and the k-mer
//! graph derived from it by minimizer sketching.
//!
//! Grammar: nucleotides plus `(` site-open, `|` allele-separator, `)`
//! site-close. Sites nest; every site has at least two alleles. Node
//! coordinates index into the bracketed text so a coordinate path pins a
//! k-mer to one place in the locus regardless of which alleles it crosses.

use std::sync::Arc;

use crate::error::{PrgMapError, Result};
use crate::index::{MiniRecord, MinimizerIndex};
use crate::prg::kmer_graph::KmerGraph;
use crate::prg::local_graph::LocalGraph;
use crate::seq::{count_at, is_dna, GraphPath, Interval, NtHashIterator};

#[derive(Debug, Clone)]
pub struct LocalPrg {
    pub id: u32,
    pub name: String,
    pub seq: String,
    pub graph: LocalGraph,
    pub kmer_graph: Arc<KmerGraph>,
}

impl LocalPrg {
    /// Parse the bracketed text into a local graph.
    pub fn new(id: u32, name: &str, seq: &str) -> Result<Self> {
        let mut graph = LocalGraph::new();
        parse_level(&mut graph, seq.as_bytes(), 0, seq.len())
            .map_err(|e| annotate(e, name))?;
        Ok(LocalPrg {
            id,
            name: name.to_string(),
            seq: seq.to_string(),
            graph,
            kmer_graph: Arc::new(KmerGraph::new(0)),
        })
    }

    /// Sketch the locus: choose the (w,k)-minimizers of every length
    /// `w + k - 1` window over every source-to-sink walk, build the k-mer
    /// graph from them, and register each into the global index.
    ///
    /// Walks shorter than a full window but at least `k` long are minimized
    /// as a single window so short PRGs still index.
    pub fn minimizer_sketch(&mut self, index: &mut MinimizerIndex, w: u32, k: u32) -> Result<()> {
        if w == 0 || k == 0 {
            return Err(PrgMapError::InvalidParameters(format!(
                "minimizer sketch needs w > 0 and k > 0, got w={}, k={}",
                w, k
            )));
        }
        let w = w as usize;
        let k = k as usize;

        let mut kg = KmerGraph::new(k as u32);
        let source = kg.add_node(GraphPath::from_interval(0, 0));
        debug_assert_eq!(source, 0);

        let mut walk_lasts: Vec<usize> = Vec::new();
        for walk in self.graph.walks() {
            let seq = self.graph.seq_along_walk(&walk);
            let hashes: Vec<(usize, u64, bool)> =
                NtHashIterator::new(seq.as_bytes(), k).collect();
            if hashes.is_empty() {
                continue;
            }

            // minimum-hash k-mer of each window, leftmost on ties
            let n = hashes.len();
            let w_eff = w.min(n);
            let mut chosen: Vec<(usize, u64, bool)> = Vec::new();
            for win in 0..=(n - w_eff) {
                let &(pos, hash, strand) = hashes[win..win + w_eff]
                    .iter()
                    .min_by_key(|&&(pos, hash, _)| (hash, pos))
                    .expect("non-empty window");
                if chosen.last().map(|&(p, _, _)| p) != Some(pos) {
                    chosen.push((pos, hash, strand));
                }
            }

            let mut prev: usize = source;
            for &(pos, hash, strand) in &chosen {
                let kmer_path = self.project(&walk, pos, pos + k);
                let node = kg.add_node(kmer_path.clone());
                kg.node_mut(node).num_at = count_at(&seq.as_bytes()[pos..pos + k]);
                index.add_record(hash, MiniRecord::new(self.id, kmer_path, strand));
                kg.add_edge(prev, node);
                prev = node;
            }
            walk_lasts.push(prev);
        }

        let text_len = self.seq.len() as u32;
        let sink = kg.add_node(GraphPath::from_interval(text_len, text_len));
        for last in walk_lasts {
            if last != source {
                kg.add_edge(last, sink);
            }
        }

        if kg.len() > 2 {
            kg.check()?;
        }
        self.kmer_graph = Arc::new(kg);
        Ok(())
    }

    /// Project a walk-local window `[s, e)` onto the locus coordinate space.
    ///
    /// Zero-length boundary nodes strictly inside the window appear as
    /// zero-length intervals; at the window edges they are dropped.
    fn project(&self, walk: &[usize], s: usize, e: usize) -> GraphPath {
        let mut path = GraphPath::empty();
        let mut covered = 0usize;
        for &id in walk {
            let node = self.graph.node(id);
            let len = node.seq.len();
            if len == 0 {
                if s < covered && covered < e {
                    path.push(Interval::new(node.pos.start, node.pos.start));
                }
                continue;
            }
            let lo = s.max(covered);
            let hi = e.min(covered + len);
            if lo < hi {
                let off = node.pos.start + (lo - covered) as u32;
                path.push(Interval::new(off, off + (hi - lo) as u32));
            }
            covered += len;
            if covered >= e {
                break;
            }
        }
        path
    }

    /// Spell the sequence of a chain of k-mer graph nodes.
    ///
    /// Consecutive k-mers along a walk overlap; each one contributes only
    /// the coordinates past the previously covered end. Terminal empty-path
    /// nodes contribute nothing.
    pub fn sequence_along_kmer_path(&self, node_ids: &[usize]) -> String {
        let paths: Vec<&GraphPath> = node_ids
            .iter()
            .map(|&id| &self.kmer_graph.node(id).path)
            .filter(|p| !p.is_terminal())
            .collect();

        let Some(first) = paths.first() else {
            return String::new();
        };
        let mut out = self.graph.seq_along_path(first);
        let mut covered_end = first.end().expect("non-terminal path");
        for path in &paths[1..] {
            let suffix = path.suffix_after(covered_end);
            out.push_str(&self.graph.seq_along_path(&suffix));
            if let Some(end) = path.end() {
                covered_end = covered_end.max(end);
            }
        }
        out
    }
}

fn annotate(err: PrgMapError, name: &str) -> PrgMapError {
    match err {
        PrgMapError::MalformedInput(msg) => {
            PrgMapError::MalformedInput(format!("PRG '{}': {}", name, msg))
        }
        other => other,
    }
}

/// Parse one nesting level of the grammar, returning the entry and exit node
/// ids of the chain it builds.
fn parse_level(
    graph: &mut LocalGraph,
    bytes: &[u8],
    lo: usize,
    hi: usize,
) -> Result<(usize, usize)> {
    // locate the top-level sites of this range
    let mut sites: Vec<(usize, usize)> = Vec::new();
    let mut depth = 0usize;
    let mut open = 0usize;
    for i in lo..hi {
        match bytes[i] {
            b'(' => {
                depth += 1;
                if depth == 1 {
                    open = i;
                }
            }
            b')' => {
                if depth == 0 {
                    return Err(PrgMapError::MalformedInput(
                        "unbalanced ')' outside any site".into(),
                    ));
                }
                depth -= 1;
                if depth == 0 {
                    sites.push((open, i));
                }
            }
            b'|' if depth == 0 => {
                return Err(PrgMapError::MalformedInput(
                    "allele separator '|' outside any site".into(),
                ));
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(PrgMapError::MalformedInput("unbalanced '(' in PRG".into()));
    }

    let first_open = sites.first().map(|&(open, _)| open).unwrap_or(hi);
    let entry = add_run(graph, bytes, lo, first_open)?;
    let mut prev = entry;

    for (si, &(open, close)) in sites.iter().enumerate() {
        // split the site body into alleles at its own-level separators
        let mut alleles: Vec<(usize, usize)> = Vec::new();
        let mut inner_depth = 0usize;
        let mut allele_start = open + 1;
        for i in open + 1..close {
            match bytes[i] {
                b'(' => inner_depth += 1,
                b')' => inner_depth -= 1,
                b'|' if inner_depth == 0 => {
                    alleles.push((allele_start, i));
                    allele_start = i + 1;
                }
                _ => {}
            }
        }
        alleles.push((allele_start, close));
        if alleles.len() < 2 {
            return Err(PrgMapError::MalformedInput(
                "variation site must have at least two alleles".into(),
            ));
        }

        let mut exits = Vec::with_capacity(alleles.len());
        for &(alo, ahi) in &alleles {
            let (allele_entry, allele_exit) = parse_level(graph, bytes, alo, ahi)?;
            graph.add_edge(prev, allele_entry);
            exits.push(allele_exit);
        }

        let next_open = sites.get(si + 1).map(|&(open, _)| open).unwrap_or(hi);
        let merge = add_run(graph, bytes, close + 1, next_open)?;
        for exit in exits {
            graph.add_edge(exit, merge);
        }
        prev = merge;
    }

    Ok((entry, prev))
}

fn add_run(graph: &mut LocalGraph, bytes: &[u8], lo: usize, hi: usize) -> Result<usize> {
    let run = &bytes[lo..hi];
    if !is_dna(run) {
        return Err(PrgMapError::MalformedInput(format!(
            "sequence run '{}' contains characters outside A/C/G/T",
            String::from_utf8_lossy(run)
        )));
    }
    Ok(graph.add_node(
        Interval::new(lo as u32, hi as u32),
        std::str::from_utf8(run).expect("validated ASCII"),
    ))
}
