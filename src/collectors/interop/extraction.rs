// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `extractionmetrics`: intensity at the first cycle of each read, and how
//! much of it is left 20 cycles later.

use std::collections::BTreeMap;

use super::{read_lane_key, InteropSource};
use crate::collectors::Collector;
use crate::context::RunContext;
use crate::errors::Result;
use crate::interop::{ExtractionMetrics, MetricsReader};
use crate::metric_utils::{GroupedStats, Stat};
use crate::reads::ReadLayout;
use crate::run_data::RunData;

/// Cycle, within the read, compared against the first one.
const LATER_CYCLE: usize = 21;

#[derive(Default)]
pub struct ExtractionMetricsCollector {
    source: InteropSource,
}

impl Collector for ExtractionMetricsCollector {
    fn name(&self) -> &'static str {
        crate::collectors::EXTRACTION_METRICS
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

        // (read, lane) -> tile -> intensity at the first and the later cycle
        let mut first: BTreeMap<(usize, usize), GroupedStats<u16>> = BTreeMap::new();
        let mut later: BTreeMap<(usize, usize), GroupedStats<u16>> = BTreeMap::new();

        for record in MetricsReader::open(&self.source.dir, ExtractionMetrics)? {
            let record = record?;
            let read = layout.read_for_cycle(record.cycle as usize)?;
            let key = (read.number, record.lane as usize);
            match read.cycle_in_read(record.cycle as usize) {
                1 => first
                    .entry(key)
                    .or_default()
                    .add(record.tile, record.mean_intensity()),
                LATER_CYCLE => later
                    .entry(key)
                    .or_default()
                    .add(record.tile, record.mean_intensity()),
                _ => (),
            }
        }

        for read in layout.reads() {
            for lane in 1..=lane_count {
                let k = (read.number, lane);
                let key = |m: &str| read_lane_key(read.number, lane, m);

                let first_stat = first.get(&k).map(|g| g.stat_of_means()).unwrap_or_default();
                let (mean, sd) = if first_stat.is_empty() {
                    (0.0, 0.0)
                } else {
                    (first_stat.mean(), first_stat.sd())
                };
                data.put(key("first.cycle.int.pf"), mean);
                data.put(key("first.cycle.int.pf.sd"), sd);

                // Ratio per tile, averaged over the tiles having both cycles.
                let mut ratio = Stat::new();
                if let (Some(f), Some(l)) = (first.get(&k), later.get(&k)) {
                    for (tile, fs) in f.iter() {
                        if let Some(ls) = l.get(tile) {
                            if fs.mean() > 0.0 {
                                ratio.add(100.0 * ls.mean() / fs.mean());
                            }
                        }
                    }
                }
                // NaN without any tile having both cycles.
                data.put(key("prc.intensity.after.20.cycles.pf"), ratio.mean());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::layout;
    use super::*;
    use crate::interop::testutil::{extraction_file, write};
    use crate::interop::MetricFamily;

    #[test]
    fn test_intensities() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            (1, 1101, 1, [100, 100, 100, 100]),
            (1, 1102, 1, [300, 300, 300, 300]),
            (1, 1101, 2, [90, 90, 90, 90]),
            (1, 1101, 21, [80, 80, 80, 80]),
            (1, 1102, 21, [150, 150, 150, 150]),
            // First cycle of read 2
            (1, 1101, 31, [500, 500, 500, 500]),
        ];
        write(dir.path(), ExtractionMetrics::FILE_NAME, &extraction_file(&records));

        let mut c = ExtractionMetricsCollector {
            source: InteropSource {
                dir: dir.path().to_path_buf(),
            },
        };
        let mut data = layout(1, &[(30, false), (30, false)]);
        c.collect(&mut data).unwrap();

        assert_eq!(data.get_double("read1.lane1.first.cycle.int.pf").unwrap(), 200.0);
        let sd = data.get_double("read1.lane1.first.cycle.int.pf.sd").unwrap();
        assert!((sd - 141.421356).abs() < 1e-4);
        let prc = data.get_double("read1.lane1.prc.intensity.after.20.cycles.pf").unwrap();
        assert!((prc - 65.0).abs() < 1e-9);

        assert_eq!(data.get_double("read2.lane1.first.cycle.int.pf").unwrap(), 500.0);
        let prc = data.get_double("read2.lane1.prc.intensity.after.20.cycles.pf").unwrap();
        assert!(prc.is_nan());
    }
}
