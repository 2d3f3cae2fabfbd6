// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `ExtractionMetricsOut.bin`: per tile and cycle focus and intensity of the
//! four channels.

use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use super::{ensure_remaining, MetricFamily, RecordLayout};
use crate::errors::Result;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ExtractionMetric {
    pub lane: u16,
    pub tile: u16,
    pub cycle: u16,
    /// Full width at half maximum, channels A C G T.
    pub fwhm: [f32; 4],
    /// Raw intensity, channels A C G T.
    pub intensities: [u16; 4],
    /// Acquisition time stamp as written by the instrument.
    pub timestamp: u64,
}

impl ExtractionMetric {
    pub fn mean_intensity(&self) -> f64 {
        self.intensities.iter().map(|&i| f64::from(i)).sum::<f64>() / 4.0
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractionMetrics;

impl MetricFamily for ExtractionMetrics {
    type Record = ExtractionMetric;

    const NAME: &'static str = "ExtractionMetricsOut";
    const FILE_NAME: &'static str = "ExtractionMetricsOut.bin";
    const VERSION: u8 = 2;
    const LAYOUT: RecordLayout = RecordLayout::Fixed(38);

    fn decode(&self, buf: &mut Bytes) -> Result<ExtractionMetric> {
        ensure_remaining(buf, 38, Self::NAME)?;
        let lane = buf.get_u16_le();
        let tile = buf.get_u16_le();
        let cycle = buf.get_u16_le();
        let mut fwhm = [0f32; 4];
        for f in fwhm.iter_mut() {
            *f = buf.get_f32_le();
        }
        let mut intensities = [0u16; 4];
        for i in intensities.iter_mut() {
            *i = buf.get_u16_le();
        }
        let timestamp = buf.get_u64_le();
        Ok(ExtractionMetric {
            lane,
            tile,
            cycle,
            fwhm,
            intensities,
            timestamp,
        })
    }
}

impl From<ExtractionMetric> for super::MetricRecord {
    fn from(r: ExtractionMetric) -> Self {
        super::MetricRecord::Extraction(r)
    }
}
