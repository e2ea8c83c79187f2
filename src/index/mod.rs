// src/index/mod.rs
//! The global minimizer index: canonical hash -> set of PRG occurrences.
//!
//! Built once while sketching the PRGs, then read-only for the whole
//! mapping phase. Persists to a compact binary file keyed by `(w, k)` so a
//! stale index cannot silently be used with different sketch parameters.

mod minirecord;

pub use minirecord::MiniRecord;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ahash::{AHashMap, AHashSet};

use crate::error::{PrgMapError, Result};
use crate::seq::{GraphPath, Interval};

const INDEX_MAGIC: &[u8; 8] = b"PRGIDX01";

#[derive(Debug, Clone)]
pub struct MinimizerIndex {
    pub w: u32,
    pub k: u32,
    minhash: AHashMap<u64, AHashSet<MiniRecord>>,
}

impl MinimizerIndex {
    pub fn new(w: u32, k: u32) -> Self {
        MinimizerIndex {
            w,
            k,
            minhash: AHashMap::new(),
        }
    }

    /// Register one minimizer occurrence. Duplicate records are absorbed.
    pub fn add_record(&mut self, hash: u64, record: MiniRecord) {
        self.minhash.entry(hash).or_default().insert(record);
    }

    pub fn lookup(&self, hash: u64) -> Option<&AHashSet<MiniRecord>> {
        self.minhash.get(&hash)
    }

    /// Number of distinct minimizer hashes.
    pub fn len(&self) -> usize {
        self.minhash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minhash.is_empty()
    }

    /// Total number of stored records.
    pub fn num_records(&self) -> usize {
        self.minhash.values().map(|set| set.len()).sum()
    }

    pub fn save<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
        let path_str = filepath.as_ref().display().to_string();
        let io_err = |e| PrgMapError::io(path_str.as_str(), e);

        let file = File::create(filepath.as_ref()).map_err(io_err)?;
        let mut out = BufWriter::new(file);

        out.write_all(INDEX_MAGIC).map_err(io_err)?;
        out.write_all(&self.w.to_le_bytes()).map_err(io_err)?;
        out.write_all(&self.k.to_le_bytes()).map_err(io_err)?;
        out.write_all(&(self.num_records() as u64).to_le_bytes())
            .map_err(io_err)?;

        // sort for a deterministic artifact
        let mut entries: Vec<(u64, &MiniRecord)> = self
            .minhash
            .iter()
            .flat_map(|(&hash, records)| records.iter().map(move |r| (hash, r)))
            .collect();
        entries.sort_by(|a, b| {
            (a.0, a.1.prg_id, &a.1.path, a.1.strand).cmp(&(b.0, b.1.prg_id, &b.1.path, b.1.strand))
        });

        for (hash, record) in entries {
            out.write_all(&hash.to_le_bytes()).map_err(io_err)?;
            out.write_all(&record.prg_id.to_le_bytes()).map_err(io_err)?;
            out.write_all(&[record.strand as u8]).map_err(io_err)?;
            let intervals = record.path.intervals();
            out.write_all(&(intervals.len() as u32).to_le_bytes())
                .map_err(io_err)?;
            for iv in intervals {
                out.write_all(&iv.start.to_le_bytes()).map_err(io_err)?;
                out.write_all(&iv.end.to_le_bytes()).map_err(io_err)?;
            }
        }
        Ok(())
    }

    /// Load an index, failing unless its `(w, k)` matches the request.
    pub fn load<P: AsRef<Path>>(filepath: P, w: u32, k: u32) -> Result<Self> {
        let path_str = filepath.as_ref().display().to_string();
        let io_err = |e| PrgMapError::io(path_str.as_str(), e);

        let file = File::open(filepath.as_ref()).map_err(io_err)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).map_err(io_err)?;
        if &magic != INDEX_MAGIC {
            return Err(PrgMapError::MalformedInput(format!(
                "{} is not a minimizer index file",
                path_str
            )));
        }

        let found_w = read_u32(&mut reader).map_err(io_err)?;
        let found_k = read_u32(&mut reader).map_err(io_err)?;
        if found_w != w || found_k != k {
            return Err(PrgMapError::MismatchedIndexParams {
                found_w,
                found_k,
                want_w: w,
                want_k: k,
            });
        }

        let count = read_u64(&mut reader).map_err(io_err)?;
        let mut index = MinimizerIndex::new(w, k);
        for _ in 0..count {
            let hash = read_u64(&mut reader).map_err(io_err)?;
            let prg_id = read_u32(&mut reader).map_err(io_err)?;
            let mut strand = [0u8; 1];
            reader.read_exact(&mut strand).map_err(io_err)?;
            let n_intervals = read_u32(&mut reader).map_err(io_err)?;
            let mut intervals = Vec::with_capacity(n_intervals as usize);
            for _ in 0..n_intervals {
                let start = read_u32(&mut reader).map_err(io_err)?;
                let end = read_u32(&mut reader).map_err(io_err)?;
                if start > end {
                    return Err(PrgMapError::MalformedInput(format!(
                        "reversed interval [{}, {}) in {}",
                        start, end, path_str
                    )));
                }
                intervals.push(Interval::new(start, end));
            }
            index.add_record(
                hash,
                MiniRecord::new(prg_id, GraphPath::new(intervals), strand[0] != 0),
            );
        }

        Ok(index)
    }
}

fn read_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
