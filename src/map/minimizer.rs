// src/map/minimizer.rs
//! (w,k)-minimizer extraction over a read, mirroring the PRG sketch so the
//! same k-mer hashes to the same index key on both sides.

use crate::seq::NtHashIterator;

/// One minimizer of a read: the canonical hash, the half-open read window
/// it occupies, and the strand whose hash won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Minimizer {
    pub hash: u64,
    pub read_start: u32,
    pub read_end: u32,
    pub strand: bool,
}

/// Sketch a read: the minimum-hash k-mer of every window of `w` consecutive
/// k-mers, leftmost on ties. Reads with fewer than `w` valid k-mers are
/// minimized as a single window.
pub fn sketch_read(seq: &[u8], w: u32, k: u32) -> Vec<Minimizer> {
    let w = w as usize;
    let k = k as usize;
    if w == 0 || k == 0 || seq.len() < k {
        return Vec::new();
    }

    let hashes: Vec<(usize, u64, bool)> = NtHashIterator::new(seq, k).collect();
    if hashes.is_empty() {
        return Vec::new();
    }

    let n = hashes.len();
    let w_eff = w.min(n);
    let mut minimizers: Vec<Minimizer> = Vec::new();
    for win in 0..=(n - w_eff) {
        let &(pos, hash, strand) = hashes[win..win + w_eff]
            .iter()
            .min_by_key(|&&(pos, hash, _)| (hash, pos))
            .expect("non-empty window");
        if minimizers.last().map(|m| m.read_start) != Some(pos as u32) {
            minimizers.push(Minimizer {
                hash,
                read_start: pos as u32,
                read_end: (pos + k) as u32,
                strand,
            });
        }
    }
    minimizers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::canonical_hash;

    #[test]
    fn test_every_kmer_is_a_w1_minimizer() {
        let minimizers = sketch_read(b"AAGCT", 1, 3);
        assert_eq!(minimizers.len(), 3);
        for (i, m) in minimizers.iter().enumerate() {
            assert_eq!(m.read_start as usize, i);
            assert_eq!(m.read_end as usize, i + 3);
            let (hash, strand) = canonical_hash(&b"AAGCT"[i..i + 3]).unwrap();
            assert_eq!(m.hash, hash);
            assert_eq!(m.strand, strand);
        }
    }

    #[test]
    fn test_density_drops_with_window() {
        let seq = b"ACGTTGCAATCGGCTAAGCTTGCA";
        let dense = sketch_read(seq, 1, 5);
        let sparse = sketch_read(seq, 4, 5);
        assert!(sparse.len() < dense.len());
        assert!(!sparse.is_empty());
    }

    #[test]
    fn test_short_read_single_window() {
        // 4 k-mers but w = 10: one window over everything
        let minimizers = sketch_read(b"ACGTTGC", 10, 4);
        assert_eq!(minimizers.len(), 1);
    }

    #[test]
    fn test_too_short_read_is_empty() {
        assert!(sketch_read(b"ACG", 1, 5).is_empty());
        assert!(sketch_read(b"", 1, 5).is_empty());
    }

    #[test]
    fn test_positions_are_increasing() {
        let seq = b"TTACGGATTCAGGCTCAGCATCGATCGGCAT";
        let minimizers = sketch_read(seq, 3, 7);
        for pair in minimizers.windows(2) {
            assert!(pair[0].read_start < pair[1].read_start);
        }
    }
}
