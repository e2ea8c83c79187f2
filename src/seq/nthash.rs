// src/seq/nthash.rs
//! ntHash rolling hash for canonical double-strand k-mer hashing.
//!
//! The canonical hash of a k-mer equals the canonical hash of its reverse
//! complement, so index lookups are strand-insensitive; the strand that
//! achieved the minimum is reported alongside so hits can still be oriented.
//!
//! Reference: Mohamadi, H., Chu, J., Vandervalk, B. P., & Birol, I. (2016).
//! ntHash: recursive nucleotide hashing. Bioinformatics, 32(22), 3492-3494.

/// ntHash seed constants for each nucleotide (from the ntHash paper).
const NT_A: u64 = 0x3c8bfbb395c60474;
const NT_C: u64 = 0x3193c18562a02b4c;
const NT_G: u64 = 0x20323ed082572324;
const NT_T: u64 = 0x295549f54be24456;

const NT_INVALID: u64 = u64::MAX;

const NT_HASH: [u64; 256] = {
    let mut table = [NT_INVALID; 256];
    table[b'A' as usize] = NT_A;
    table[b'a' as usize] = NT_A;
    table[b'C' as usize] = NT_C;
    table[b'c' as usize] = NT_C;
    table[b'G' as usize] = NT_G;
    table[b'g' as usize] = NT_G;
    table[b'T' as usize] = NT_T;
    table[b't' as usize] = NT_T;
    table
};

const NT_HASH_RC: [u64; 256] = {
    let mut table = [NT_INVALID; 256];
    table[b'A' as usize] = NT_T;
    table[b'a' as usize] = NT_T;
    table[b'C' as usize] = NT_G;
    table[b'c' as usize] = NT_G;
    table[b'G' as usize] = NT_C;
    table[b'g' as usize] = NT_C;
    table[b'T' as usize] = NT_A;
    table[b't' as usize] = NT_A;
    table
};

/// Rolling double-strand hash state.
#[derive(Clone, Debug)]
pub struct NtHasher {
    forward: u64,
    reverse: u64,
    k: usize,
}

impl NtHasher {
    /// Initialize from a k-mer. Returns `None` on non-ACGT bases.
    #[inline]
    pub fn new(seq: &[u8], k: usize) -> Option<Self> {
        if seq.len() != k || k == 0 {
            return None;
        }

        let mut forward: u64 = 0;
        let mut reverse: u64 = 0;

        for (i, &base) in seq.iter().enumerate() {
            let h = NT_HASH[base as usize];
            if h == NT_INVALID {
                return None;
            }
            forward = forward.rotate_left(1) ^ h;
            reverse ^= NT_HASH_RC[base as usize].rotate_left(i as u32);
        }

        Some(NtHasher { forward, reverse, k })
    }

    /// Roll one position: drop `out_base` on the left, add `in_base` on the
    /// right. `in_base` must be a valid nucleotide (callers restart the
    /// hasher on invalid bases).
    #[inline]
    pub fn roll(&mut self, out_base: u8, in_base: u8) {
        let h_out = NT_HASH[out_base as usize];
        let h_in = NT_HASH[in_base as usize];
        let h_out_rc = NT_HASH_RC[out_base as usize];
        let h_in_rc = NT_HASH_RC[in_base as usize];

        self.forward = self.forward.rotate_left(1) ^ h_out.rotate_left(self.k as u32) ^ h_in;
        self.reverse =
            (self.reverse ^ h_out_rc).rotate_right(1) ^ h_in_rc.rotate_left((self.k - 1) as u32);
    }

    /// The canonical hash: minimum of the two strand hashes.
    #[inline]
    pub fn canonical(&self) -> u64 {
        self.forward.min(self.reverse)
    }

    /// Which strand achieved the canonical value (`true` = forward).
    ///
    /// Palindromic k-mers hash identically on both strands and report
    /// forward.
    #[inline]
    pub fn strand(&self) -> bool {
        self.forward <= self.reverse
    }

    #[inline]
    pub fn forward_hash(&self) -> u64 {
        self.forward
    }

    #[inline]
    pub fn reverse_hash(&self) -> u64 {
        self.reverse
    }
}

/// Iterator over `(position, canonical hash, strand)` for every k-mer of a
/// sequence. K-mers containing non-ACGT bases are skipped.
pub struct NtHashIterator<'a> {
    seq: &'a [u8],
    hasher: Option<NtHasher>,
    pos: usize,
    k: usize,
    primed: bool,
}

impl<'a> NtHashIterator<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        NtHashIterator {
            seq,
            hasher: None,
            pos: 0,
            k,
            primed: false,
        }
    }

    /// Seek to the next position with a fully valid k-mer, rebuilding the
    /// hasher there.
    fn reprime(&mut self) -> Option<(usize, u64, bool)> {
        while self.pos + self.k <= self.seq.len() {
            if let Some(h) = NtHasher::new(&self.seq[self.pos..self.pos + self.k], self.k) {
                let item = (self.pos, h.canonical(), h.strand());
                self.hasher = Some(h);
                self.primed = true;
                self.pos += 1;
                return Some(item);
            }
            self.pos += 1;
        }
        None
    }
}

impl<'a> Iterator for NtHashIterator<'a> {
    type Item = (usize, u64, bool);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.k == 0 {
            return None;
        }
        if !self.primed {
            return self.reprime();
        }

        let kmer_end = self.pos + self.k;
        if kmer_end > self.seq.len() {
            return None;
        }

        let in_base = self.seq[kmer_end - 1];
        if NT_HASH[in_base as usize] == NT_INVALID {
            // skip past the invalid base entirely
            self.pos = kmer_end;
            return self.reprime();
        }

        let out_base = self.seq[self.pos - 1];
        let hasher = self.hasher.as_mut().expect("primed hasher");
        hasher.roll(out_base, in_base);
        let item = (self.pos, hasher.canonical(), hasher.strand());
        self.pos += 1;
        Some(item)
    }
}

/// One-off canonical hash of a whole k-mer, with its strand.
#[inline]
pub fn canonical_hash(seq: &[u8]) -> Option<(u64, bool)> {
    NtHasher::new(seq, seq.len()).map(|h| (h.canonical(), h.strand()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::dna::reverse_complement;

    #[test]
    fn test_canonical_matches_reverse_complement() {
        for kmer in ["ACGTA", "AAGCT", "GGGGG", "TACGATCGA"] {
            let rc = reverse_complement(kmer);
            let (h_fwd, s_fwd) = canonical_hash(kmer.as_bytes()).unwrap();
            let (h_rev, s_rev) = canonical_hash(rc.as_bytes()).unwrap();
            assert_eq!(h_fwd, h_rev, "canonical hash differs for {}", kmer);
            if kmer != rc {
                assert_ne!(s_fwd, s_rev, "strands should flip for {}", kmer);
            }
        }
    }

    #[test]
    fn test_rolling_matches_direct() {
        let seq = b"ACGTACGGTTCA";
        let k = 4;
        let rolled: Vec<(usize, u64, bool)> = NtHashIterator::new(seq, k).collect();
        assert_eq!(rolled.len(), seq.len() - k + 1);
        for (pos, hash, strand) in rolled {
            let (direct, direct_strand) = canonical_hash(&seq[pos..pos + k]).unwrap();
            assert_eq!(hash, direct, "hash mismatch at {}", pos);
            assert_eq!(strand, direct_strand, "strand mismatch at {}", pos);
        }
    }

    #[test]
    fn test_iterator_skips_invalid() {
        let seq = b"ACGTNGCTAG";
        let k = 4;
        let positions: Vec<usize> = NtHashIterator::new(seq, k).map(|(p, _, _)| p).collect();
        // windows overlapping the N at index 4 are absent
        assert_eq!(positions, vec![0, 5, 6]);
    }

    #[test]
    fn test_invalid_kmer_is_none() {
        assert!(canonical_hash(b"ACNT").is_none());
        assert!(canonical_hash(b"").is_none());
    }
}
