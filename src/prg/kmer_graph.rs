// src/prg/kmer_graph.rs
//! The k-mer graph of a locus: a DAG whose nodes are minimizer k-mers
//! identified by their coordinate path through the local graph.
//!
//! Nodes live in an arena owned by the graph and edges are dense index
//! pairs. A unique empty-path source (id 0) and sink (highest id) bracket
//! the minimizer nodes.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{PrgMapError, Result};
use crate::seq::GraphPath;

#[derive(Debug, Clone)]
pub struct KmerNode {
    pub id: usize,
    pub path: GraphPath,
    pub ins: Vec<usize>,
    pub outs: Vec<usize>,
    /// A/T base count of the k-mer, carried into the GFA `AT:i:` tag.
    pub num_at: u32,
    /// Build-time (forward, reverse) coverage, round-tripped through GFA.
    pub covg: (u16, u16),
}

impl PartialEq for KmerNode {
    /// Two k-mer nodes are the same node iff they take the same path.
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for KmerNode {}

#[derive(Debug, Clone, Default)]
pub struct KmerGraph {
    nodes: Vec<KmerNode>,
    node_by_path: AHashMap<GraphPath, usize>,
    pub k: u32,
}

impl KmerGraph {
    pub fn new(k: u32) -> Self {
        KmerGraph {
            nodes: Vec::new(),
            node_by_path: AHashMap::new(),
            k,
        }
    }

    /// Add a node for `path`, or return the existing node if one already
    /// takes that path.
    pub fn add_node(&mut self, path: GraphPath) -> usize {
        if let Some(&id) = self.node_by_path.get(&path) {
            return id;
        }
        let id = self.nodes.len();
        self.node_by_path.insert(path.clone(), id);
        self.nodes.push(KmerNode {
            id,
            path,
            ins: Vec::new(),
            outs: Vec::new(),
            num_at: 0,
            covg: (0, 0),
        });
        id
    }

    /// Add the edge `from -> to`; adding it twice is a no-op.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        assert!(
            from < self.nodes.len() && to < self.nodes.len(),
            "edge ({}, {}) references a node outside the graph",
            from,
            to
        );
        if !self.nodes[from].outs.contains(&to) {
            self.nodes[from].outs.push(to);
            self.nodes[to].ins.push(from);
        }
    }

    /// Add an edge between the nodes taking the given paths.
    pub fn add_edge_by_path(&mut self, from: &GraphPath, to: &GraphPath) {
        let from_id = self
            .node_by_path
            .get(from)
            .copied()
            .unwrap_or_else(|| panic!("no node takes path {}", from));
        let to_id = self
            .node_by_path
            .get(to)
            .copied()
            .unwrap_or_else(|| panic!("no node takes path {}", to));
        self.add_edge(from_id, to_id);
    }

    pub fn node(&self, id: usize) -> &KmerNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: usize) -> &mut KmerNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> &[KmerNode] {
        &self.nodes
    }

    pub fn node_id_of(&self, path: &GraphPath) -> Option<usize> {
        self.node_by_path.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The source has id 0 once the sketch is complete.
    pub fn source(&self) -> usize {
        0
    }

    /// The sink is the highest id once the sketch is complete.
    pub fn sink(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Validate the terminal invariant: the source is the only node without
    /// in-edges and the sink the only node without out-edges.
    pub fn check(&self) -> Result<()> {
        if self.nodes.len() < 2 {
            return Err(PrgMapError::MalformedKmerGraph(format!(
                "graph has {} nodes, expected at least source and sink",
                self.nodes.len()
            )));
        }
        for node in &self.nodes {
            if node.ins.is_empty() && node.id != self.source() {
                return Err(PrgMapError::MalformedKmerGraph(format!(
                    "node {} has no in-edges but is not the source",
                    node.id
                )));
            }
            if node.outs.is_empty() && node.id != self.sink() {
                return Err(PrgMapError::MalformedKmerGraph(format!(
                    "node {} has no out-edges but is not the sink",
                    node.id
                )));
            }
        }
        if !self.nodes[self.source()].ins.is_empty() || !self.nodes[self.sink()].outs.is_empty() {
            return Err(PrgMapError::MalformedKmerGraph(
                "terminal nodes have edges on the wrong side".into(),
            ));
        }
        Ok(())
    }

    /// Node ids in coordinate-path order.
    ///
    /// Along any walk the coordinates strictly increase, so path order is a
    /// topological order with the source first and the sink last; the
    /// maximum-likelihood search iterates it in reverse so every node sees
    /// its successors' scores.
    pub fn sorted_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = (0..self.nodes.len()).collect();
        ids.sort_by(|&a, &b| self.nodes[a].path.cmp(&self.nodes[b].path));
        ids
    }

    /// Node ids grouped by bubble nesting depth, deepest group first.
    ///
    /// Scanning ids in order, a node with more than one out-edge opens a
    /// bubble and a node with more than one in-edge closes one; each node is
    /// bucketed at its nesting depth and buckets are emitted deepest-first,
    /// so every bubble body precedes the fork/merge chain that flanks it.
    pub fn bubble_order(&self) -> Vec<usize> {
        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut num_starts: usize = 0;
        let mut num_ends: usize = 0;

        for node in &self.nodes {
            if node.ins.len() > 1 {
                num_ends += 1;
            }
            debug_assert!(num_starts >= num_ends, "bubble nesting underflow");
            let level = num_starts.saturating_sub(num_ends);
            if levels.len() <= level {
                levels.resize(level + 1, Vec::new());
            }
            levels[level].push(node.id);
            if node.outs.len() > 1 {
                num_starts += 1;
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        for bucket in levels.iter().rev() {
            order.extend_from_slice(bucket);
        }
        order
    }

    /// Write the graph in the line-oriented GFA-like format.
    pub fn save<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
        let path_str = filepath.as_ref().display().to_string();
        let file = File::create(filepath.as_ref()).map_err(|e| PrgMapError::io(path_str.as_str(), e))?;
        let mut handle = BufWriter::new(file);
        self.write_gfa(&mut handle, |id| self.nodes[id].covg)
            .map_err(|e| PrgMapError::io(path_str.as_str(), e))
    }

    /// Serialize with per-node coverage supplied by the caller (the
    /// coverage-bearing wrapper reuses this with its own counters).
    pub(crate) fn write_gfa<W: Write>(
        &self,
        handle: &mut W,
        covg: impl Fn(usize) -> (u16, u16),
    ) -> std::io::Result<()> {
        writeln!(handle, "H\tVN:Z:1.0\tbn:Z:--linear --singlearr")?;
        for node in &self.nodes {
            let (fwd, rev) = covg(node.id);
            writeln!(
                handle,
                "S\t{}\t{}\tFC:i:{}\tRC:i:{}\tAT:i:{}",
                node.id, node.path, fwd, rev, node.num_at
            )?;
            for &out in &node.outs {
                writeln!(handle, "L\t{}\t+\t{}\t+\t0M", node.id, out)?;
            }
        }
        Ok(())
    }

    /// Load a graph saved by [`KmerGraph::save`].
    ///
    /// Files may list nodes in reverse id order; the list is un-reversed
    /// when the first parsed id is not 0. The sequence field must parse as a
    /// coordinate path.
    pub fn load<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        let path_str = filepath.as_ref().display().to_string();
        let file = File::open(filepath.as_ref()).map_err(|e| PrgMapError::io(path_str.as_str(), e))?;
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            lines.push(line.map_err(|e| PrgMapError::io(path_str.as_str(), e))?);
        }

        let mut graph = KmerGraph::new(0);

        for line in &lines {
            if !line.starts_with('S') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                return Err(PrgMapError::MalformedKmerGraph(format!(
                    "S line has {} fields: {}",
                    fields.len(),
                    line
                )));
            }
            let id: usize = fields[1].parse().map_err(|_| {
                PrgMapError::MalformedKmerGraph(format!("bad node id in: {}", line))
            })?;
            if !fields[2].starts_with(|c: char| c.is_ascii_digit()) {
                return Err(PrgMapError::MalformedKmerGraph(format!(
                    "node {} is not labelled with its coordinate path: {}",
                    id, line
                )));
            }
            let kmer_path: GraphPath = fields[2].parse().map_err(|_| {
                PrgMapError::MalformedKmerGraph(format!("bad path in: {}", line))
            })?;
            let fwd = parse_tag(fields[3], "FC:i:", line)?;
            let rev = parse_tag(fields[4], "RC:i:", line)?;
            let num_at = if fields.len() >= 6 {
                parse_tag(fields[5], "AT:i:", line)? as u32
            } else {
                0
            };

            if graph.k == 0 && kmer_path.length() > 0 {
                graph.k = kmer_path.length();
            }
            graph.nodes.push(KmerNode {
                id,
                path: kmer_path,
                ins: Vec::new(),
                outs: Vec::new(),
                num_at,
                covg: (fwd, rev),
            });
        }

        if graph.nodes.is_empty() {
            return Err(PrgMapError::MalformedKmerGraph(format!(
                "no S lines in {}",
                path_str
            )));
        }

        let forward_order = graph.nodes.first().map(|n| n.id) == Some(0)
            && graph.nodes.last().map(|n| n.id) == Some(graph.nodes.len() - 1);
        if !forward_order {
            graph.nodes.reverse();
        }
        for (expect, node) in graph.nodes.iter().enumerate() {
            if node.id != expect {
                return Err(PrgMapError::MalformedKmerGraph(format!(
                    "node ids are not dense: found {} at position {}",
                    node.id, expect
                )));
            }
        }
        graph.node_by_path = graph
            .nodes
            .iter()
            .map(|n| (n.path.clone(), n.id))
            .collect();

        for line in &lines {
            if !line.starts_with('L') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                return Err(PrgMapError::MalformedKmerGraph(format!(
                    "L line has {} fields: {}",
                    fields.len(),
                    line
                )));
            }
            let (from_field, to_field) = if fields[2] == fields[4] {
                (fields[1], fields[3])
            } else {
                (fields[3], fields[1])
            };
            let from: usize = from_field.parse().map_err(|_| {
                PrgMapError::MalformedKmerGraph(format!("bad edge in: {}", line))
            })?;
            let to: usize = to_field.parse().map_err(|_| {
                PrgMapError::MalformedKmerGraph(format!("bad edge in: {}", line))
            })?;
            if from >= graph.nodes.len() || to >= graph.nodes.len() {
                return Err(PrgMapError::MalformedKmerGraph(format!(
                    "edge references missing node: {}",
                    line
                )));
            }
            graph.add_edge(from, to);
        }

        Ok(graph)
    }
}

fn parse_tag(field: &str, tag: &str, line: &str) -> Result<u16> {
    field
        .strip_prefix(tag)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            PrgMapError::MalformedKmerGraph(format!("expected {} tag in: {}", tag, line))
        })
}

impl PartialEq for KmerGraph {
    /// Graphs are equal when they hold the same set of k-mer paths and the
    /// same edges between them.
    fn eq(&self, other: &Self) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        for node in &self.nodes {
            let Some(other_id) = other.node_id_of(&node.path) else {
                return false;
            };
            let other_node = other.node(other_id);
            if node.outs.len() != other_node.outs.len() {
                return false;
            }
            for &out in &node.outs {
                let out_path = &self.nodes[out].path;
                let matched = other_node
                    .outs
                    .iter()
                    .any(|&o| &other.nodes[o].path == out_path);
                if !matched {
                    return false;
                }
            }
        }
        true
    }
}

impl Eq for KmerGraph {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::Interval;

    fn path(intervals: &[(u32, u32)]) -> GraphPath {
        GraphPath::new(
            intervals
                .iter()
                .map(|&(a, b)| Interval::new(a, b))
                .collect(),
        )
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut kg = KmerGraph::new(3);
        let a = kg.add_node(path(&[(0, 3)]));
        assert_eq!(kg.len(), 1);
        assert_eq!(a, 0);

        // same path again: nothing happens
        let again = kg.add_node(path(&[(0, 3)]));
        assert_eq!(again, a);
        assert_eq!(kg.len(), 1);

        let b = kg.add_node(path(&[(0, 4)]));
        assert_eq!(b, 1);
        assert_eq!(kg.len(), 2);
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut kg = KmerGraph::new(3);
        kg.add_node(path(&[(0, 3)]));
        kg.add_node(path(&[(0, 4)]));

        kg.add_edge_by_path(&path(&[(0, 3)]), &path(&[(0, 4)]));
        assert_eq!(kg.node(0).outs, vec![1]);
        assert_eq!(kg.node(1).ins, vec![0]);

        kg.add_edge_by_path(&path(&[(0, 3)]), &path(&[(0, 4)]));
        kg.add_edge(0, 1);
        assert_eq!(kg.node(0).outs, vec![1]);
        assert_eq!(kg.node(1).ins, vec![0]);
        assert!(kg.node(1).outs.is_empty());
        assert!(kg.node(0).ins.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_edge_to_missing_node_panics() {
        let mut kg = KmerGraph::new(3);
        kg.add_node(path(&[(0, 3)]));
        kg.add_edge(0, 2);
    }

    /// Diamond of three parallel chains between terminals.
    fn diamond() -> KmerGraph {
        let mut kg = KmerGraph::new(1);
        kg.add_node(path(&[(0, 0)]));
        kg.add_node(path(&[(0, 1), (4, 5), (8, 9)]));
        kg.add_node(path(&[(4, 5), (8, 9), (16, 16), (23, 24)]));
        kg.add_node(path(&[(0, 1), (4, 5), (12, 13)]));
        kg.add_node(path(&[(4, 5), (12, 13), (16, 16), (23, 24)]));
        kg.add_node(path(&[(0, 1), (19, 20), (23, 24)]));
        kg.add_node(path(&[(24, 24)]));
        kg.add_edge(0, 1);
        kg.add_edge(1, 2);
        kg.add_edge(0, 3);
        kg.add_edge(3, 4);
        kg.add_edge(0, 5);
        kg.add_edge(2, 6);
        kg.add_edge(4, 6);
        kg.add_edge(5, 6);
        kg
    }

    #[test]
    fn test_bubble_order() {
        let kg = diamond();
        assert_eq!(kg.bubble_order(), vec![1, 2, 3, 4, 5, 0, 6]);
    }

    #[test]
    fn test_sorted_ids_is_topological() {
        let kg = diamond();
        let order = kg.sorted_ids();
        assert_eq!(order.first(), Some(&0));
        assert_eq!(order.last(), Some(&6));
        let pos: Vec<usize> = {
            let mut pos = vec![0; kg.len()];
            for (i, &id) in order.iter().enumerate() {
                pos[id] = i;
            }
            pos
        };
        for node in kg.nodes() {
            for &out in &node.outs {
                assert!(pos[node.id] < pos[out], "edge {} -> {} reversed", node.id, out);
            }
        }
    }

    #[test]
    fn test_check() {
        let kg = diamond();
        assert!(kg.check().is_ok());

        let mut dangling = diamond();
        dangling.add_node(path(&[(30, 33)]));
        assert!(dangling.check().is_err());
    }

    #[test]
    fn test_equality() {
        let a = diamond();
        let b = diamond();
        assert_eq!(a, b);

        let mut extra_node = diamond();
        extra_node.add_node(path(&[(40, 41)]));
        assert_ne!(a, extra_node);

        // same nodes, extra edge
        let mut extra_edge = diamond();
        extra_edge.add_edge(1, 6);
        assert_ne!(a, extra_edge);
    }

    #[test]
    fn test_gfa_round_trip() {
        let mut kg = diamond();
        kg.node_mut(1).covg = (5, 2);
        kg.node_mut(1).num_at = 1;

        let dir = tempfile::tempdir().unwrap();
        let gfa = dir.path().join("kg.gfa");
        kg.save(&gfa).unwrap();

        let loaded = KmerGraph::load(&gfa).unwrap();
        assert_eq!(loaded, kg);
        assert_eq!(loaded.node(1).covg, (5, 2));
        assert_eq!(loaded.node(1).num_at, 1);
        // k is inferred from the first non-terminal path
        assert_eq!(loaded.k, 3);
    }

    #[test]
    fn test_load_reversed_file() {
        let dir = tempfile::tempdir().unwrap();
        let gfa = dir.path().join("rev.gfa");
        std::fs::write(
            &gfa,
            "H\tVN:Z:1.0\tbn:Z:--linear --singlearr\n\
             S\t1\t1{[4, 4)}\tFC:i:0\tRC:i:0\n\
             S\t0\t1{[0, 3)}\tFC:i:7\tRC:i:1\n\
             L\t0\t+\t1\t+\t0M\n",
        )
        .unwrap();

        let kg = KmerGraph::load(&gfa).unwrap();
        assert_eq!(kg.node(0).path, path(&[(0, 3)]));
        assert_eq!(kg.node(0).covg, (7, 1));
        assert_eq!(kg.node(0).outs, vec![1]);
    }

    #[test]
    fn test_load_rejects_sequence_labels() {
        let dir = tempfile::tempdir().unwrap();
        let gfa = dir.path().join("bad.gfa");
        std::fs::write(
            &gfa,
            "H\tVN:Z:1.0\tbn:Z:--linear --singlearr\n\
             S\t0\tACGT\tFC:i:0\tRC:i:0\n",
        )
        .unwrap();
        assert!(matches!(
            KmerGraph::load(&gfa),
            Err(PrgMapError::MalformedKmerGraph(_))
        ));
    }
}
