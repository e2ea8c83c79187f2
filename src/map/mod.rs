//! Read minimization, hit formation against the index, and clustering.

pub mod cluster;
pub mod hits;
pub mod minimizer;

pub use cluster::{cluster_hits, Cluster};
pub use hits::{hits_for_read, MinimizerHit};
pub use minimizer::{sketch_read, Minimizer};
