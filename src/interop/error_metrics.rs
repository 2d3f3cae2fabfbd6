// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `ErrorMetricsOut.bin`: per tile and cycle error rate against the control
//! library, with the number of reads having 0 to 4 errors.

use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use super::{ensure_remaining, MetricFamily, RecordLayout};
use crate::errors::Result;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ErrorMetric {
    pub lane: u16,
    pub tile: u16,
    pub cycle: u16,
    pub error_rate: f32,
    /// Number of perfect reads, then reads with 1..4 errors.
    pub reads_with_errors: [f32; 5],
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorMetrics;

impl MetricFamily for ErrorMetrics {
    type Record = ErrorMetric;

    const NAME: &'static str = "ErrorMetricsOut";
    const FILE_NAME: &'static str = "ErrorMetricsOut.bin";
    const VERSION: u8 = 3;
    const LAYOUT: RecordLayout = RecordLayout::Fixed(30);

    fn decode(&self, buf: &mut Bytes) -> Result<ErrorMetric> {
        ensure_remaining(buf, 30, Self::NAME)?;
        let lane = buf.get_u16_le();
        let tile = buf.get_u16_le();
        let cycle = buf.get_u16_le();
        let error_rate = buf.get_f32_le();
        let mut reads_with_errors = [0f32; 5];
        for r in reads_with_errors.iter_mut() {
            *r = buf.get_f32_le();
        }
        Ok(ErrorMetric {
            lane,
            tile,
            cycle,
            error_rate,
            reads_with_errors,
        })
    }
}

impl From<ErrorMetric> for super::MetricRecord {
    fn from(r: ErrorMetric) -> Self {
        super::MetricRecord::Error(r)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::error_file;
    use super::super::MetricsReader;
    use super::*;

    #[test]
    fn test_read_error_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ErrorMetrics::FILE_NAME),
            error_file(&[(1, 1101, 1, 0.25), (1, 1101, 2, 0.5)]),
        )
        .unwrap();

        let reader = MetricsReader::open(dir.path(), ErrorMetrics).unwrap();
        assert_eq!(reader.record_count(), Some(2));
        let records: Vec<_> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(records[1].cycle, 2);
        assert_eq!(records[1].error_rate, 0.5);
        assert_eq!(records[0].reads_with_errors, [0.0; 5]);
    }
}
