// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `indexmetrics`: clusters identified per sample index, relative to the PF
//! clusters of the lane.

use indexmap::IndexMap;

use super::InteropSource;
use crate::collectors::Collector;
use crate::context::RunContext;
use crate::errors::Result;
use crate::interop::{IndexMetrics, MetricsReader};
use crate::metric_utils::percent;
use crate::run_data::RunData;

#[derive(Default)]
struct SampleCount {
    index: String,
    project: String,
    clusters: i64,
}

#[derive(Default)]
pub struct IndexMetricsCollector {
    source: InteropSource,
}

impl Collector for IndexMetricsCollector {
    fn name(&self) -> &'static str {
        crate::collectors::INDEX_METRICS
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![crate::collectors::RUN_INFO, crate::collectors::TILE_METRICS]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.source.configure(ctx);
        Ok(())
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        let lane_count = data.lane_count()?;

        let mut lanes: IndexMap<usize, IndexMap<String, SampleCount>> = IndexMap::new();
        for record in MetricsReader::open(&self.source.dir, IndexMetrics)? {
            let record = record?;
            let s = lanes
                .entry(record.lane as usize)
                .or_default()
                .entry(record.sample.clone())
                .or_default();
            s.index = record.index;
            s.project = record.project;
            s.clusters += i64::from(record.cluster_count);
        }

        for lane in 1..=lane_count {
            let pf_key = format!("read1.lane{}.clusters.pf", lane);
            let pf = if data.contains(&pf_key) {
                data.get_long(&pf_key)?
            } else {
                0
            };

            let mut lane_total = 0;
            if let Some(samples) = lanes.get(&lane) {
                for (sample, s) in samples {
                    let key = |m: &str| format!("indexmetrics.lane{}.sample.{}.{}", lane, sample, m);
                    data.put(key("cluster.count"), s.clusters);
                    data.put(key("index"), s.index.as_str());
                    data.put(key("project"), s.project.as_str());
                    data.put(key("prc.pf.clusters"), percent(s.clusters, pf));
                    lane_total += s.clusters;
                }
            }
            data.put(format!("indexmetrics.lane{}.cluster.count", lane), lane_total);
            data.put(
                format!("indexmetrics.lane{}.prc.pf.clusters", lane),
                percent(lane_total, pf),
            );
        }
        Ok(())
    }
}
