// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `errormetrics`: error rate against the control library, per read and
//! lane, over the whole read and over its first 35, 75 and 100 cycles.

use std::collections::BTreeMap;

use super::{read_lane_key, InteropSource};
use crate::collectors::Collector;
use crate::context::RunContext;
use crate::errors::Result;
use crate::interop::{ErrorMetrics, MetricsReader};
use crate::metric_utils::GroupedStats;
use crate::reads::ReadLayout;
use crate::run_data::RunData;

/// Cycle counts the partial error rates are computed over.
const PARTIAL_CYCLES: [usize; 3] = [35, 75, 100];

/// Per tile error rates of one read and lane, keyed by the cycle within the
/// read.
#[derive(Default)]
struct ReadLaneRates {
    by_tile: BTreeMap<u16, Vec<(usize, f64)>>,
}

impl ReadLaneRates {
    fn calculated_cycles(&self) -> usize {
        let mut cycles: Vec<usize> = self
            .by_tile
            .values()
            .flat_map(|v| v.iter().map(|(c, _)| *c))
            .collect();
        cycles.sort_unstable();
        cycles.dedup();
        cycles.len()
    }

    /// Per tile mean over the cycles up to `max_cycle`, summarised over tiles.
    fn over_cycles(&self, max_cycle: usize) -> GroupedStats<u16> {
        let mut g = GroupedStats::new();
        for (tile, rates) in &self.by_tile {
            for (cycle, rate) in rates {
                if *cycle <= max_cycle {
                    g.add(*tile, *rate);
                }
            }
        }
        g
    }
}

#[derive(Default)]
pub struct ErrorMetricsCollector {
    source: InteropSource,
}

impl Collector for ErrorMetricsCollector {
    fn name(&self) -> &'static str {
        crate::collectors::ERROR_METRICS
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

        let mut rates: BTreeMap<(usize, usize), ReadLaneRates> = BTreeMap::new();
        for record in MetricsReader::open(&self.source.dir, ErrorMetrics)? {
            let record = record?;
            let read = layout.read_for_cycle(record.cycle as usize)?;
            rates
                .entry((read.number, record.lane as usize))
                .or_default()
                .by_tile
                .entry(record.tile)
                .or_default()
                .push((read.cycle_in_read(record.cycle as usize), f64::from(record.error_rate)));
        }

        let none = ReadLaneRates::default();
        for read in layout.reads() {
            for lane in 1..=lane_count {
                let r = rates.get(&(read.number, lane)).unwrap_or(&none);
                let key = |m: &str| read_lane_key(read.number, lane, m);

                let calculated = r.calculated_cycles();
                let all = r.over_cycles(usize::MAX).stat_of_means();
                let (mean, sd) = if all.is_empty() {
                    (0.0, 0.0)
                } else {
                    (all.mean(), all.sd())
                };
                data.put(key("err.rate.phix"), mean);
                data.put(key("err.rate.phix.sd"), sd);
                data.put(key("calculated.cycles"), calculated);

                for &n in &PARTIAL_CYCLES {
                    let value = if calculated >= n {
                        r.over_cycles(n).stat_of_means().mean()
                    } else {
                        0.0
                    };
                    data.put(key(&format!("err.rate.{}", n)), value);
                }
            }
        }
        Ok(())
    }
}
