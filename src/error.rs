// src/error.rs
//! Error taxonomy for the mapping pipeline.
//!
//! Per-locus failures are logged and the locus skipped by the caller;
//! pipeline-level failures abort the run. Inference on zero coverage is not
//! an error: it is reported as a no-signal sentinel by the inference layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrgMapError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("malformed kmer graph: {0}")]
    MalformedKmerGraph(String),

    #[error("index was built with (w={found_w}, k={found_k}) but (w={want_w}, k={want_k}) was requested")]
    MismatchedIndexParams {
        found_w: u32,
        found_k: u32,
        want_w: u32,
        want_k: u32,
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("could not find start and end anchor k-mers in either orientation")]
    AnchorsNotFound,

    #[error("path traversal exceeded {0} nodes, cycle suspected")]
    CycleSuspected(usize),

    #[error("unknown probability model '{0}', expected one of nbin, bin, lin")]
    UnknownProbModel(String),
}

impl PrgMapError {
    /// Wrap an `io::Error` with the path it occurred on.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        PrgMapError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrgMapError>;
