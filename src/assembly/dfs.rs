// src/assembly/dfs.rs
//! Iterative DFS over the de Bruijn graph and cycle-aware enumeration of
//! every bounded-length path between two anchor k-mers.

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::assembly::debruijn::DeBruijnGraph;

/// Successor lists recorded at first discovery, node by node.
pub type DfsTree = AHashMap<String, Vec<String>>;

/// Non-recursive DFS from `start`, recording each discovered node's
/// successor list.
pub fn dfs_tree(start: &str, graph: &DeBruijnGraph) -> DfsTree {
    debug!("starting DFS from {}", start);
    let mut nodes_to_explore = vec![start.to_string()];
    let mut explored: AHashSet<String> = AHashSet::new();
    let mut tree = DfsTree::new();

    while let Some(current) = nodes_to_explore.pop() {
        if !explored.insert(current.clone()) {
            continue;
        }
        let neighbours = graph.successors(&current);
        for child in &neighbours {
            nodes_to_explore.push(child.clone());
        }
        tree.insert(current, neighbours);
    }
    debug!("DFS finished, {} nodes discovered", tree.len());
    tree
}

/// Every path in the DFS tree from `start_kmer` to `end_kmer`.
///
/// The walk keeps an accumulator of the spelled sequence and emits it
/// whenever its suffix equals the end anchor. Cycles are traversed as long
/// as the accumulator stays within `max_path_length`, so a cycle that still
/// reaches the end anchor contributes one path per repetition count.
pub fn paths_between(
    start_kmer: &str,
    end_kmer: &str,
    tree: &DfsTree,
    max_path_length: usize,
) -> Vec<String> {
    debug!(
        "enumerating paths between {} and {}",
        start_kmer, end_kmer
    );
    let initial_acc = start_kmer[..start_kmer.len() - 1].to_string();
    let mut paths = Vec::new();
    walk(start_kmer, end_kmer, initial_acc, tree, &mut paths, max_path_length);
    debug!("path enumeration complete, {} paths found", paths.len());
    paths
}

fn walk(
    node: &str,
    end_kmer: &str,
    mut acc: String,
    tree: &DfsTree,
    paths: &mut Vec<String>,
    max_path_length: usize,
) {
    if acc.len() > max_path_length {
        return;
    }
    acc.push(node.chars().last().expect("non-empty k-mer"));

    if acc.ends_with(end_kmer) {
        paths.push(acc.clone());
    }

    if let Some(children) = tree.get(node) {
        for child in children {
            walk(child, end_kmer, acc.clone(), tree, paths, max_path_length);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(reads: &[&str], k: usize) -> DeBruijnGraph {
        DeBruijnGraph::build(reads.to_vec(), k, 1).unwrap()
    }

    #[test]
    fn test_dfs_tree_records_successors() {
        let graph = graph_of(&["ACGTC"], 3);
        let tree = dfs_tree("ACG", &graph);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree["ACG"], vec!["CGT"]);
        assert_eq!(tree["CGT"], vec!["GTC"]);
        assert!(tree["GTC"].is_empty());
    }

    #[test]
    fn test_single_path_between_anchors() {
        let graph = graph_of(&["TGATCAGC"], 3);
        let tree = dfs_tree("TGA", &graph);
        let paths = paths_between("TGA", "AGC", &tree, 20);
        assert_eq!(paths, vec!["TGATCAGC"]);
    }

    #[test]
    fn test_bubble_yields_both_paths() {
        // two alleles between shared anchors
        let graph = graph_of(&["TGATCCA", "TGAGCCA"], 3);
        let tree = dfs_tree("TGA", &graph);
        let mut paths = paths_between("TGA", "CCA", &tree, 20);
        paths.sort();
        assert_eq!(paths, vec!["TGAGCCA", "TGATCCA"]);
    }

    #[test]
    fn test_cycles_emit_one_path_per_repetition() {
        // ACGTACGTA... is a 4-cycle in 9-mer space
        let graph = graph_of(&["ACGTACGTACGTACGTACGTA"], 9);
        let tree = dfs_tree("ACGTACGTA", &graph);
        let paths = paths_between("ACGTACGTA", "GTACGTACG", &tree, 30);

        let lengths: Vec<usize> = paths.iter().map(String::len).collect();
        assert_eq!(lengths, vec![11, 15, 19, 23, 27, 31]);
        for path in &paths {
            assert!(path.starts_with("ACGTACGT"));
            assert!(path.ends_with("GTACGTACG"));
        }
    }

    #[test]
    fn test_unreachable_end_yields_nothing() {
        let graph = graph_of(&["TGATCAGC"], 3);
        let tree = dfs_tree("TGA", &graph);
        assert!(paths_between("TGA", "TTT", &tree, 20).is_empty());
    }
}
