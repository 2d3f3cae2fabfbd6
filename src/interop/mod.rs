// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Readers for the binary metric files that the instrument writes in the
//! `InterOp` directory of a run.
//!
//! Every file starts with a version byte. Fixed-size families follow it with
//! a record length byte and then a whole number of records of exactly that
//! length. Some families insert a preamble between the header and the
//! records, and some (index metrics) use variable-length records. Any
//! mismatch against what the family expects rejects the whole file.

pub mod error_metrics;
pub mod extraction;
pub mod index;
pub mod quality;
pub mod tile;

use bytes::{Buf, Bytes};
use serde_derive::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::{QcError, Result};

pub use error_metrics::{ErrorMetric, ErrorMetrics};
pub use extraction::{ExtractionMetric, ExtractionMetrics};
pub use index::{IndexMetric, IndexMetrics};
pub use quality::{QualityBinning, QualityMetric, QualityMetrics};
pub use tile::{TileMetric, TileMetrics};

/// How the records following the header are delimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLayout {
    /// Every record has this many bytes, declared again in the header.
    Fixed(usize),
    /// Records carry their own lengths; the header is the version byte only.
    Variable,
}

/// Leading bytes of a metric file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub record_size: Option<u8>,
}

impl FileHeader {
    pub fn size(&self) -> usize {
        if self.record_size.is_some() {
            2
        } else {
            1
        }
    }
}

/// Description of one family of metric files: where it lives, which version
/// and record size it must have, and how to decode its records.
pub trait MetricFamily {
    type Record;

    const NAME: &'static str;
    const FILE_NAME: &'static str;
    const VERSION: u8;
    const LAYOUT: RecordLayout;

    /// Parse the optional section that follows the header.
    fn read_preamble(&mut self, _buf: &mut Bytes) -> Result<()> {
        Ok(())
    }

    /// Decode one record. For fixed-size families `buf` holds exactly one
    /// record; for variable-size families it holds the rest of the file and
    /// the decoder consumes one record from its front.
    fn decode(&self, buf: &mut Bytes) -> Result<Self::Record>;
}

/// Fail with a `FormatError` unless `buf` still holds `n` bytes.
pub(crate) fn ensure_remaining(buf: &Bytes, n: usize, family: &str) -> Result<()> {
    if buf.remaining() < n {
        Err(QcError::format(
            family,
            format!("truncated record: needed {} bytes, {} left", n, buf.remaining()),
        ))
    } else {
        Ok(())
    }
}

/// Read a `u16` length-prefixed string.
pub(crate) fn get_string(buf: &mut Bytes, family: &str) -> Result<String> {
    ensure_remaining(buf, 2, family)?;
    let len = buf.get_u16_le() as usize;
    ensure_remaining(buf, len, family)?;
    let raw = buf.split_to(len);
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Iterator over the records of one metric file.
///
/// The header and the overall size are checked when the file is opened, so
/// a malformed file never yields a single record. The iterator is consumed
/// once; the file contents are released when it is exhausted.
pub struct MetricsReader<F: MetricFamily> {
    family: F,
    path: PathBuf,
    header: FileHeader,
    header_size: usize,
    buf: Bytes,
    done: bool,
}

impl<F: MetricFamily> MetricsReader<F> {
    /// Open `F::FILE_NAME` inside the InterOp directory `dir`.
    pub fn open(dir: impl AsRef<Path>, family: F) -> Result<MetricsReader<F>> {
        let path = dir.as_ref().join(F::FILE_NAME);
        let raw = std::fs::read(&path).map_err(|e| QcError::file(&path, e))?;
        Self::from_bytes(path, Bytes::from(raw), family)
    }

    fn from_bytes(path: PathBuf, mut buf: Bytes, mut family: F) -> Result<MetricsReader<F>> {
        let total = buf.len();

        ensure_remaining(&buf, 1, F::NAME)?;
        let version = buf.get_u8();
        if version != F::VERSION {
            return Err(QcError::format(
                F::NAME,
                format!(
                    "expected version {}, found {} in {}",
                    F::VERSION,
                    version,
                    path.display()
                ),
            ));
        }

        let record_size = match F::LAYOUT {
            RecordLayout::Fixed(size) => {
                ensure_remaining(&buf, 1, F::NAME)?;
                let declared = buf.get_u8();
                if declared as usize != size {
                    return Err(QcError::format(
                        F::NAME,
                        format!(
                            "expected record size {}, found {} in {}",
                            size,
                            declared,
                            path.display()
                        ),
                    ));
                }
                Some(declared)
            }
            RecordLayout::Variable => None,
        };

        family.read_preamble(&mut buf)?;
        let header_size = total - buf.len();

        if let RecordLayout::Fixed(size) = F::LAYOUT {
            let trailing = buf.len() % size;
            if trailing != 0 {
                return Err(QcError::format(
                    F::NAME,
                    format!(
                        "{} bytes after the header of {} are not a multiple of the record size {} ({} trailing bytes)",
                        buf.len(),
                        path.display(),
                        size,
                        trailing
                    ),
                ));
            }
        }

        Ok(MetricsReader {
            family,
            path,
            header: FileHeader {
                version,
                record_size,
            },
            header_size,
            buf,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// Bytes before the first record, header and preamble included.
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// The family descriptor, including anything read from the preamble.
    pub fn family(&self) -> &F {
        &self.family
    }

    /// Number of records left, for fixed-size families.
    pub fn record_count(&self) -> Option<usize> {
        match F::LAYOUT {
            RecordLayout::Fixed(size) => Some(self.buf.len() / size),
            RecordLayout::Variable => None,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.buf = Bytes::new();
    }
}

impl<F: MetricFamily> Iterator for MetricsReader<F> {
    type Item = Result<F::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.buf.is_empty() {
            self.finish();
            return None;
        }

        let decoded = match F::LAYOUT {
            RecordLayout::Fixed(size) => {
                let mut record = self.buf.split_to(size);
                self.family.decode(&mut record)
            }
            RecordLayout::Variable => self.family.decode(&mut self.buf),
        };

        if decoded.is_err() {
            self.finish();
        }
        Some(decoded)
    }
}

/// Open and fully decode one metric file.
pub fn read_all<F: MetricFamily>(dir: impl AsRef<Path>, family: F) -> Result<Vec<F::Record>> {
    MetricsReader::open(dir, family)?.collect()
}

/// One decoded record of any family.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MetricRecord {
    Tile(TileMetric),
    Error(ErrorMetric),
    Extraction(ExtractionMetric),
    Quality(QualityMetric),
    Index(IndexMetric),
}

impl MetricRecord {
    pub fn lane(&self) -> u16 {
        match self {
            MetricRecord::Tile(r) => r.lane,
            MetricRecord::Error(r) => r.lane,
            MetricRecord::Extraction(r) => r.lane,
            MetricRecord::Quality(r) => r.lane,
            MetricRecord::Index(r) => r.lane,
        }
    }

    pub fn tile(&self) -> u16 {
        match self {
            MetricRecord::Tile(r) => r.tile,
            MetricRecord::Error(r) => r.tile,
            MetricRecord::Extraction(r) => r.tile,
            MetricRecord::Quality(r) => r.tile,
            MetricRecord::Index(r) => r.tile,
        }
    }
}

fn read_as_records<F>(dir: &Path, family: F) -> Result<Vec<MetricRecord>>
where
    F: MetricFamily,
    F::Record: Into<MetricRecord>,
{
    MetricsReader::open(dir, family)?
        .map(|r| r.map(Into::into))
        .collect()
}

/// Decode the family called `name` (its `NAME` or file name).
pub fn read_records(dir: impl AsRef<Path>, name: &str) -> Result<Vec<MetricRecord>> {
    let dir = dir.as_ref();
    let is = |n: &str, f: &str| name.eq_ignore_ascii_case(n) || name == f;

    if is(TileMetrics::NAME, TileMetrics::FILE_NAME) {
        read_as_records(dir, TileMetrics)
    } else if is(ErrorMetrics::NAME, ErrorMetrics::FILE_NAME) {
        read_as_records(dir, ErrorMetrics)
    } else if is(ExtractionMetrics::NAME, ExtractionMetrics::FILE_NAME) {
        read_as_records(dir, ExtractionMetrics)
    } else if is(QualityMetrics::NAME, QualityMetrics::FILE_NAME) {
        read_as_records(dir, QualityMetrics::default())
    } else if is(IndexMetrics::NAME, IndexMetrics::FILE_NAME) {
        read_as_records(dir, IndexMetrics)
    } else {
        Err(QcError::config(format!("unknown metric family '{}'", name)))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Builders for synthetic metric files.

    use std::path::Path;

    pub fn tile_file(records: &[(u16, u16, u16, f32)]) -> Vec<u8> {
        let mut buf = vec![2u8, 10u8];
        for &(lane, tile, code, value) in records {
            buf.extend_from_slice(&lane.to_le_bytes());
            buf.extend_from_slice(&tile.to_le_bytes());
            buf.extend_from_slice(&code.to_le_bytes());
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf
    }

    pub fn error_file(records: &[(u16, u16, u16, f32)]) -> Vec<u8> {
        let mut buf = vec![3u8, 30u8];
        for &(lane, tile, cycle, rate) in records {
            buf.extend_from_slice(&lane.to_le_bytes());
            buf.extend_from_slice(&tile.to_le_bytes());
            buf.extend_from_slice(&cycle.to_le_bytes());
            buf.extend_from_slice(&rate.to_le_bytes());
            for _ in 0..5 {
                buf.extend_from_slice(&0f32.to_le_bytes());
            }
        }
        buf
    }

    pub fn extraction_file(records: &[(u16, u16, u16, [u16; 4])]) -> Vec<u8> {
        let mut buf = vec![2u8, 38u8];
        for &(lane, tile, cycle, intensities) in records {
            buf.extend_from_slice(&lane.to_le_bytes());
            buf.extend_from_slice(&tile.to_le_bytes());
            buf.extend_from_slice(&cycle.to_le_bytes());
            for _ in 0..4 {
                buf.extend_from_slice(&2.5f32.to_le_bytes());
            }
            for i in &intensities {
                buf.extend_from_slice(&i.to_le_bytes());
            }
            buf.extend_from_slice(&0u64.to_le_bytes());
        }
        buf
    }

    /// Quality file without binning; `histogram` maps Q-score to count.
    pub fn quality_file(records: &[(u16, u16, u16, Vec<(usize, u32)>)]) -> Vec<u8> {
        let mut buf = vec![5u8, 206u8, 0u8];
        for (lane, tile, cycle, histogram) in records {
            buf.extend_from_slice(&lane.to_le_bytes());
            buf.extend_from_slice(&tile.to_le_bytes());
            buf.extend_from_slice(&cycle.to_le_bytes());
            let mut bins = [0u32; 50];
            for &(q, n) in histogram {
                bins[q - 1] = n;
            }
            for b in &bins {
                buf.extend_from_slice(&b.to_le_bytes());
            }
        }
        buf
    }

    pub fn index_file(records: &[(u16, u16, u16, &str, u32, &str, &str)]) -> Vec<u8> {
        let mut buf = vec![1u8];
        let push_str = |buf: &mut Vec<u8>, s: &str| {
            buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        };
        for &(lane, tile, read, index, count, sample, project) in records {
            buf.extend_from_slice(&lane.to_le_bytes());
            buf.extend_from_slice(&tile.to_le_bytes());
            buf.extend_from_slice(&read.to_le_bytes());
            push_str(&mut buf, index);
            buf.extend_from_slice(&count.to_le_bytes());
            push_str(&mut buf, sample);
            push_str(&mut buf, project);
        }
        buf
    }

    pub fn write(dir: &Path, name: &str, content: &[u8]) {
        std::fs::write(dir.join(name), content).unwrap();
    }
}
