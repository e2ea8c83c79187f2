// src/map/cluster.rs
//! Grouping a read's hits into per-locus, per-orientation clusters.

use crate::map::hits::MinimizerHit;

/// A compact run of co-located, co-oriented hits of one read against one
/// locus.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub prg_id: u32,
    pub strand: bool,
    pub hits: Vec<MinimizerHit>,
}

impl Cluster {
    pub fn read_start(&self) -> u32 {
        self.hits.first().map(|h| h.read_start).unwrap_or(0)
    }
}

/// Sweep a read's hits into clusters.
///
/// Hits are ordered by (locus, strand, read position); a new cluster starts
/// whenever the locus or strand changes, or the gap between consecutive
/// hits' read start positions exceeds `max_diff`. Only clusters with at
/// least `cluster_thresh` distinct hits survive. Surviving clusters come
/// back ordered by read position, so consecutive clusters describe the
/// order loci were traversed.
pub fn cluster_hits(
    mut hits: Vec<MinimizerHit>,
    max_diff: u32,
    cluster_thresh: usize,
) -> Vec<Cluster> {
    if hits.is_empty() {
        return Vec::new();
    }
    hits.sort_by(|a, b| a.cluster_key().cmp(&b.cluster_key()));
    hits.dedup();

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut current: Vec<MinimizerHit> = Vec::new();

    for hit in hits {
        let split = match current.last() {
            None => false,
            Some(prev) => {
                prev.prg_id != hit.prg_id
                    || prev.strand != hit.strand
                    || hit.read_start - prev.read_start > max_diff
            }
        };
        if split {
            flush(&mut clusters, &mut current, cluster_thresh);
        }
        current.push(hit);
    }
    flush(&mut clusters, &mut current, cluster_thresh);

    clusters.sort_by_key(|c| (c.read_start(), c.prg_id));
    clusters
}

fn flush(clusters: &mut Vec<Cluster>, current: &mut Vec<MinimizerHit>, cluster_thresh: usize) {
    if current.len() >= cluster_thresh && !current.is_empty() {
        let hits = std::mem::take(current);
        clusters.push(Cluster {
            prg_id: hits[0].prg_id,
            strand: hits[0].strand,
            hits,
        });
    } else {
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::GraphPath;

    fn hit(prg_id: u32, strand: bool, read_start: u32) -> MinimizerHit {
        MinimizerHit {
            read_id: 0,
            read_start,
            read_end: read_start + 3,
            prg_id,
            prg_path: GraphPath::from_interval(read_start, read_start + 3),
            strand,
        }
    }

    #[test]
    fn test_hits_group_by_locus_and_strand() {
        let hits = vec![
            hit(0, true, 0),
            hit(0, true, 2),
            hit(1, true, 1),
            hit(1, true, 3),
            hit(0, false, 4),
            hit(0, false, 5),
        ];
        let clusters = cluster_hits(hits, 10, 2);
        assert_eq!(clusters.len(), 3);
        // ordered by read position
        assert_eq!(clusters[0].prg_id, 0);
        assert!(clusters[0].strand);
        assert_eq!(clusters[1].prg_id, 1);
        assert_eq!(clusters[2].prg_id, 0);
        assert!(!clusters[2].strand);
    }

    #[test]
    fn test_gap_splits_cluster() {
        // gap of 11 between read positions 5 and 16 splits at max_diff 10
        let hits = vec![
            hit(0, true, 0),
            hit(0, true, 5),
            hit(0, true, 16),
            hit(0, true, 20),
        ];
        let clusters = cluster_hits(hits.clone(), 10, 2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].hits.len(), 2);
        assert_eq!(clusters[1].hits.len(), 2);

        // a permissive gap keeps them together
        let clusters = cluster_hits(hits, 11, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].hits.len(), 4);
    }

    #[test]
    fn test_threshold_filters_small_clusters() {
        let hits = vec![hit(0, true, 0), hit(1, true, 5), hit(1, true, 6)];
        let clusters = cluster_hits(hits, 10, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].prg_id, 1);
    }

    #[test]
    fn test_duplicate_hits_count_once() {
        let hits = vec![hit(0, true, 0), hit(0, true, 0), hit(0, true, 0)];
        let clusters = cluster_hits(hits, 10, 2);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_hits(Vec::new(), 10, 2).is_empty());
    }
}
