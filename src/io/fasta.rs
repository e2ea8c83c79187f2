// src/io/fasta.rs
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{PrgMapError, Result};

/// One FASTA record; multi-line sequences arrive joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub header: String,
    pub sequence: String,
}

/// Open a FASTA file for reading, transparently decompressing `.gz`.
pub fn open_fasta(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| PrgMapError::io(path.display().to_string(), e))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Stream FASTA records without holding the whole file.
pub fn stream_fasta_records<R: BufRead>(reader: R) -> impl Iterator<Item = FastaRecord> {
    FastaStreamParser {
        lines: reader.lines(),
        pending_header: None,
        done: false,
    }
}

struct FastaStreamParser<I> {
    lines: I,
    pending_header: Option<String>,
    done: bool,
}

impl<I> Iterator for FastaStreamParser<I>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    type Item = FastaRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                match self.lines.next() {
                    Some(Ok(line)) if line.starts_with('>') => {
                        break line[1..].trim().to_string();
                    }
                    Some(Ok(_)) => continue,
                    _ => {
                        self.done = true;
                        return None;
                    }
                }
            },
        };

        let mut sequence = String::new();
        loop {
            match self.lines.next() {
                Some(Ok(line)) if line.starts_with('>') => {
                    self.pending_header = Some(line[1..].trim().to_string());
                    break;
                }
                Some(Ok(line)) => sequence.push_str(line.trim()),
                _ => {
                    self.done = true;
                    break;
                }
            }
        }

        Some(FastaRecord { header, sequence })
    }
}

enum FastaSink {
    Plain(BufWriter<File>),
    Compressed(BufWriter<GzEncoder<File>>),
}

/// FASTA writer wrapping sequence lines at a fixed width; gzips when the
/// path ends in `.gz`.
pub struct FastaWriter {
    sink: FastaSink,
    line_width: usize,
    path: String,
}

impl FastaWriter {
    pub fn new(path: &Path, line_width: usize) -> Result<Self> {
        let file = File::create(path).map_err(|e| PrgMapError::io(path.display().to_string(), e))?;
        let sink = if path.extension().is_some_and(|ext| ext == "gz") {
            FastaSink::Compressed(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            FastaSink::Plain(BufWriter::new(file))
        };
        Ok(FastaWriter {
            sink,
            line_width: line_width.max(1),
            path: path.display().to_string(),
        })
    }

    pub fn write_record(&mut self, header: &str, sequence: &str) -> Result<()> {
        let path = self.path.clone();
        let io_err = |e| PrgMapError::io(path.as_str(), e);
        self.write_raw(&format!(">{}\n", header)).map_err(io_err)?;

        let path = self.path.clone();
        let io_err = |e| PrgMapError::io(path.as_str(), e);
        let bytes = sequence.as_bytes();
        let mut start = 0;
        while start < bytes.len() {
            let end = (start + self.line_width).min(bytes.len());
            let line = std::str::from_utf8(&bytes[start..end]).expect("ASCII sequence");
            self.write_raw(line).map_err(io_err)?;
            self.write_raw("\n").map_err(io_err)?;
            start = end;
        }
        if sequence.is_empty() {
            self.write_raw("\n").map_err(io_err)?;
        }
        Ok(())
    }

    fn write_raw(&mut self, text: &str) -> std::io::Result<()> {
        match &mut self.sink {
            FastaSink::Plain(w) => w.write_all(text.as_bytes()),
            FastaSink::Compressed(w) => w.write_all(text.as_bytes()),
        }
    }
}
