// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `QMetricsOut.bin`: per tile and cycle histogram of quality scores Q1 to
//! Q50. Version 5 files carry the quality binning table in a preamble.

use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use super::{ensure_remaining, MetricFamily, RecordLayout};
use crate::errors::{QcError, Result};

pub const QUALITY_BINS: usize = 50;

/// Quality binning table declared in the preamble.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QualityBinning {
    pub lower: Vec<u8>,
    pub upper: Vec<u8>,
    pub remapped: Vec<u8>,
}

impl QualityBinning {
    pub fn bin_count(&self) -> usize {
        self.remapped.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualityMetric {
    pub lane: u16,
    pub tile: u16,
    pub cycle: u16,
    /// `histogram[i]` counts clusters with quality score `i + 1`.
    pub histogram: Vec<u32>,
}

impl QualityMetric {
    /// Clusters with a quality score of at least `q`.
    pub fn count_at_least(&self, q: usize) -> u64 {
        self.histogram
            .iter()
            .skip(q.saturating_sub(1))
            .map(|&n| u64::from(n))
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.histogram.iter().map(|&n| u64::from(n)).sum()
    }

    /// Sum of the quality scores of all clusters.
    pub fn score_sum(&self) -> u64 {
        self.histogram
            .iter()
            .enumerate()
            .map(|(i, &n)| (i as u64 + 1) * u64::from(n))
            .sum()
    }
}

#[derive(Clone, Debug, Default)]
pub struct QualityMetrics {
    /// `None` until the preamble is read, or when the file is not binned.
    pub binning: Option<QualityBinning>,
}

impl MetricFamily for QualityMetrics {
    type Record = QualityMetric;

    const NAME: &'static str = "QMetricsOut";
    const FILE_NAME: &'static str = "QMetricsOut.bin";
    const VERSION: u8 = 5;
    const LAYOUT: RecordLayout = RecordLayout::Fixed(6 + 4 * QUALITY_BINS);

    fn read_preamble(&mut self, buf: &mut Bytes) -> Result<()> {
        ensure_remaining(buf, 1, Self::NAME)?;
        match buf.get_u8() {
            0 => {
                self.binning = None;
                Ok(())
            }
            1 => {
                ensure_remaining(buf, 1, Self::NAME)?;
                let bins = buf.get_u8() as usize;
                ensure_remaining(buf, 3 * bins, Self::NAME)?;
                let lower = buf.split_to(bins).to_vec();
                let upper = buf.split_to(bins).to_vec();
                let remapped = buf.split_to(bins).to_vec();
                self.binning = Some(QualityBinning {
                    lower,
                    upper,
                    remapped,
                });
                Ok(())
            }
            flag => Err(QcError::format(
                Self::NAME,
                format!("invalid quality binning flag {}", flag),
            )),
        }
    }

    fn decode(&self, buf: &mut Bytes) -> Result<QualityMetric> {
        ensure_remaining(buf, 6 + 4 * QUALITY_BINS, Self::NAME)?;
        let lane = buf.get_u16_le();
        let tile = buf.get_u16_le();
        let cycle = buf.get_u16_le();
        let histogram = (0..QUALITY_BINS).map(|_| buf.get_u32_le()).collect();
        Ok(QualityMetric {
            lane,
            tile,
            cycle,
            histogram,
        })
    }
}

impl From<QualityMetric> for super::MetricRecord {
    fn from(r: QualityMetric) -> Self {
        super::MetricRecord::Quality(r)
    }
}
