//! Sequence primitives: intervals, graph paths, nucleotide helpers and the
//! canonical double-strand k-mer hash.

pub mod dna;
pub mod interval;
pub mod nthash;
pub mod path;

pub use dna::{count_at, is_dna, reverse_complement};
pub use interval::Interval;
pub use nthash::{canonical_hash, NtHashIterator, NtHasher};
pub use path::GraphPath;
