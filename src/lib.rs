//! prgmap: a pangenome-aware read-to-graph mapper and genotyper.
//!
//! Each locus is a Population Reference Graph (PRG), a DAG of the known
//! allelic variation. Loci are sketched into k-mer graphs of their
//! (w,k)-minimizers; reads are decomposed the same way, hits are clustered
//! per locus, and accumulated k-mer coverage drives a maximum-likelihood
//! path call per locus under a binomial, linear or negative binomial
//! emission model. Loci the graphs cannot explain fall back to local
//! assembly between anchor k-mers.

pub mod assembly;
pub mod error;
pub mod index;
pub mod io;
pub mod map;
pub mod pangraph;
pub mod pipeline;
pub mod prg;
pub mod seq;

pub use error::{PrgMapError, Result};
