// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `qualitymetrics`: share of bases at Q30 or above and mean quality score,
//! per read and lane.

use std::collections::BTreeMap;

use super::{read_lane_key, InteropSource};
use crate::collectors::Collector;
use crate::context::RunContext;
use crate::errors::Result;
use crate::interop::{MetricsReader, QualityMetrics};
use crate::metric_utils::percent;
use crate::reads::ReadLayout;
use crate::run_data::RunData;

const Q30: usize = 30;

#[derive(Clone, Copy, Debug, Default)]
struct QualityTotals {
    bases: u64,
    q30: u64,
    score_sum: u64,
}

#[derive(Default)]
pub struct QualityMetricsCollector {
    source: InteropSource,
}

impl Collector for QualityMetricsCollector {
    fn name(&self) -> &'static str {
        crate::collectors::QUALITY_METRICS
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![crate::collectors::RUN_INFO]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.source.configure(ctx);
        Ok(())
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        let layout = ReadLayout::from_run_data(data)?;
        let lane_count = data.lane_count()?;

        let mut reader = MetricsReader::open(&self.source.dir, QualityMetrics::default())?;
        let binning = reader.family().binning.clone();

        let mut totals: BTreeMap<(usize, usize), QualityTotals> = BTreeMap::new();
        for record in &mut reader {
            let record = record?;
            let read = layout.read_for_cycle(record.cycle as usize)?;
            let t = totals.entry((read.number, record.lane as usize)).or_default();
            t.bases += record.total();
            t.q30 += record.count_at_least(Q30);
            t.score_sum += record.score_sum();
        }

        data.put("qualitymetrics.binning.enabled", binning.is_some());
        data.put(
            "qualitymetrics.binning.bin.count",
            binning.as_ref().map_or(0, |b| b.bin_count()),
        );

        for read in layout.reads() {
            for lane in 1..=lane_count {
                let t = totals.get(&(read.number, lane)).copied().unwrap_or_default();
                let key = |m: &str| read_lane_key(read.number, lane, m);
                let mean = if t.bases == 0 {
                    f64::NAN
                } else {
                    t.score_sum as f64 / t.bases as f64
                };
                data.put(key("prc.q30"), percent(t.q30 as i64, t.bases as i64));
                data.put(key("mean.quality.score"), mean);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::layout;
    use super::*;
    use crate::interop::testutil::{quality_file, write};
    use crate::interop::MetricFamily;

    #[test]
    fn test_q30() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            (1, 1101, 1, vec![(20, 25), (30, 50), (35, 25)]),
            (1, 1101, 2, vec![(29, 100)]),
            (1, 1101, 11, vec![(40, 10)]),
        ];
        write(dir.path(), QualityMetrics::FILE_NAME, &quality_file(&records));

        let mut c = QualityMetricsCollector {
            source: InteropSource {
                dir: dir.path().to_path_buf(),
            },
        };
        let mut data = layout(1, &[(10, false), (6, true)]);
        c.collect(&mut data).unwrap();

        assert_eq!(data.get_double("read1.lane1.prc.q30").unwrap(), 37.5);
        let mean = (20.0 * 25.0 + 30.0 * 50.0 + 35.0 * 25.0 + 29.0 * 100.0) / 200.0;
        assert_eq!(data.get_double("read1.lane1.mean.quality.score").unwrap(), mean);
        assert_eq!(data.get_double("read2.lane1.prc.q30").unwrap(), 100.0);
        assert!(!data.get_bool("qualitymetrics.binning.enabled").unwrap());
        assert_eq!(data.get_int("qualitymetrics.binning.bin.count").unwrap(), 0);
    }

    #[test]
    fn test_no_quality_records() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), QualityMetrics::FILE_NAME, &quality_file(&[]));

        let mut c = QualityMetricsCollector {
            source: InteropSource {
                dir: dir.path().to_path_buf(),
            },
        };
        let mut data = layout(1, &[(10, false)]);
        c.collect(&mut data).unwrap();

        assert!(data.get_double("read1.lane1.prc.q30").unwrap().is_nan());
        assert!(data.get_double("read1.lane1.mean.quality.score").unwrap().is_nan());
    }
}
