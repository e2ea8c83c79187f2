// src/io/fastq.rs
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{PrgMapError, Result};

#[derive(Debug, Clone)]
pub struct FastqRecord {
    pub header: String,
    pub sequence: String,
    pub quality: String,
}

/// Open a FASTQ file for reading, transparently decompressing `.gz`.
pub fn open_fastq(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| PrgMapError::io(path.display().to_string(), e))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Stream FASTQ records with bounded memory.
pub fn stream_fastq_records<R: BufRead>(reader: R) -> impl Iterator<Item = FastqRecord> {
    FastqStreamParser {
        lines: reader.lines(),
    }
}

struct FastqStreamParser<I> {
    lines: I,
}

impl<I> Iterator for FastqStreamParser<I>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    type Item = FastqRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match self.lines.next() {
            Some(Ok(line)) => line,
            _ => return None,
        };
        let sequence = match self.lines.next() {
            Some(Ok(line)) => line,
            _ => return None,
        };
        // separator line, unused
        match self.lines.next() {
            Some(Ok(_)) => {}
            _ => return None,
        }
        let quality = match self.lines.next() {
            Some(Ok(line)) => line,
            _ => return None,
        };
        Some(FastqRecord {
            header: header.trim_start_matches('@').to_string(),
            sequence,
            quality,
        })
    }
}
