// src/pangraph/mod.rs
//! The pangenome graph: one node per locus seen in the reads, with
//! multigraph edges recording which loci were traversed consecutively and
//! in which relative orientation.

mod edge;
mod node;

pub use edge::{orientation_code, rev_orient, PanEdge};
pub use node::PanNode;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::warn;

use crate::error::{PrgMapError, Result};
use crate::map::Cluster;
use crate::prg::LocalPrg;

#[derive(Debug, Default)]
pub struct PanGraph {
    graph: DiGraph<PanNode, PanEdge>,
    node_ix: AHashMap<u32, NodeIndex>,
    edge_ix: AHashMap<(u32, u32, u8), EdgeIndex>,
}

impl PanGraph {
    pub fn new() -> Self {
        PanGraph::default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, prg_id: u32) -> Option<&PanNode> {
        self.node_ix
            .get(&prg_id)
            .and_then(|&ix| self.graph.node_weight(ix))
    }

    pub fn node_mut(&mut self, prg_id: u32) -> Option<&mut PanNode> {
        let ix = *self.node_ix.get(&prg_id)?;
        self.graph.node_weight_mut(ix)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PanNode> {
        self.graph.node_weights()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut PanNode> {
        self.graph.node_weights_mut()
    }

    pub fn edges(&self) -> impl Iterator<Item = &PanEdge> {
        self.graph.edge_references().map(|e| e.weight())
    }

    pub fn prg_ids(&self) -> Vec<u32> {
        self.graph.node_weights().map(|n| n.prg_id).collect()
    }

    /// Record an accepted cluster: create the locus node on first sight,
    /// link the read, and push each hit's coverage onto the k-mer it
    /// matched, on the strand the hit was observed on.
    pub fn add_hits(
        &mut self,
        prg: &Arc<LocalPrg>,
        read_id: u32,
        cluster: &Cluster,
        sample_id: usize,
        num_samples: usize,
    ) {
        let ix = match self.node_ix.get(&prg.id) {
            Some(&ix) => ix,
            None => {
                let ix = self.graph.add_node(PanNode::new(prg.clone(), num_samples));
                self.node_ix.insert(prg.id, ix);
                ix
            }
        };
        let node = self.graph.node_weight_mut(ix).expect("node just ensured");

        node.covg += 1;
        if node.reads.insert(read_id) {
            node.sample_read_counts[sample_id] += 1;
        }
        node.kmer_coverage.num_reads = node.reads.len() as u32;

        for hit in &cluster.hits {
            match prg.kmer_graph.node_id_of(&hit.prg_path) {
                Some(kmer_node) => {
                    node.kmer_coverage
                        .increment_covg(kmer_node, hit.strand, sample_id)
                }
                None => warn!(
                    "hit path {} not present in kmer graph of {}",
                    hit.prg_path, prg.name
                ),
            }
        }
    }

    /// Record that `from` and `to` were traversed consecutively with the
    /// given orientation code. Duplicate observations, including the same
    /// traversal seen from the opposite strand, increment the existing
    /// edge's coverage.
    pub fn add_edge(&mut self, from: u32, to: u32, orientation: u8) -> Result<()> {
        if orientation > 3 {
            return Err(PrgMapError::InvalidParameters(format!(
                "pan-edge orientation {} out of range 0..4",
                orientation
            )));
        }
        if from == to {
            warn!("ignoring self-loop pan-edge on locus {}", from);
            return Ok(());
        }
        let (Some(&from_ix), Some(&to_ix)) = (self.node_ix.get(&from), self.node_ix.get(&to))
        else {
            warn!(
                "ignoring pan-edge {} -> {}: a locus is missing from the graph",
                from, to
            );
            return Ok(());
        };

        let existing = self
            .edge_ix
            .get(&(from, to, orientation))
            .or_else(|| self.edge_ix.get(&(to, from, rev_orient(orientation))));
        match existing {
            Some(&edge) => {
                self.graph
                    .edge_weight_mut(edge)
                    .expect("indexed edge exists")
                    .covg += 1;
            }
            None => {
                let edge = self
                    .graph
                    .add_edge(from_ix, to_ix, PanEdge::new(from, to, orientation));
                self.edge_ix.insert((from, to, orientation), edge);
            }
        }
        Ok(())
    }

    /// Serialize loci and adjacency in the GFA-like format; the `+`/`-`
    /// fields of each `L` line carry the edge orientation.
    pub fn write_gfa<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
        let path_str = filepath.as_ref().display().to_string();
        let io_err = |e| PrgMapError::io(path_str.as_str(), e);

        let file = File::create(filepath.as_ref()).map_err(io_err)?;
        let mut handle = BufWriter::new(file);
        writeln!(handle, "H\tVN:Z:1.0\tbn:Z:--linear --singlearr").map_err(io_err)?;
        for node in self.nodes() {
            writeln!(handle, "S\t{}\t*\tRC:i:{}", node.name, node.covg).map_err(io_err)?;
        }
        for edge in self.edges() {
            let (from_o, to_o) = edge.gfa_orientations();
            let from_name = self.node(edge.from).map(|n| n.name.as_str()).unwrap_or("?");
            let to_name = self.node(edge.to).map(|n| n.name.as_str()).unwrap_or("?");
            writeln!(
                handle,
                "L\t{}\t{}\t{}\t{}\t0M\tRC:i:{}",
                from_name, from_o, to_name, to_o, edge.covg
            )
            .map_err(io_err)?;
        }
        Ok(())
    }
}
