// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `demux`: per-sample demultiplexing statistics from the bcl2fastq
//! `Stats/Stats.json` report.

use log::info;
use serde_derive::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::Collector;
use crate::context::RunContext;
use crate::errors::{QcError, Result};
use crate::partition::UNDETERMINED_SAMPLE;
use crate::run_data::RunData;

const PREFIX: &str = "demux";

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct DemuxStats {
    pub flowcell: String,
    pub run_id: String,
    pub conversion_results: Vec<ConversionResult>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConversionResult {
    pub lane_number: usize,
    pub total_clusters_raw: i64,
    #[serde(rename = "TotalClustersPF")]
    pub total_clusters_pf: i64,
    #[serde(rename = "Yield")]
    pub yield_: i64,
    pub demux_results: Vec<SampleResult>,
    pub undetermined: Option<SampleResult>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct SampleResult {
    pub sample_id: String,
    pub sample_name: String,
    pub index_metrics: Vec<IndexMetric>,
    pub number_reads: i64,
    #[serde(rename = "Yield")]
    pub yield_: i64,
    pub read_metrics: Vec<ReadMetric>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct IndexMetric {
    pub index_sequence: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReadMetric {
    pub read_number: usize,
    #[serde(rename = "Yield")]
    pub yield_: i64,
    #[serde(rename = "YieldQ30")]
    pub yield_q30: i64,
    pub quality_score_sum: i64,
}

impl DemuxStats {
    pub fn from_file(path: impl AsRef<Path>) -> Result<DemuxStats> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| QcError::file(path, e))?;
        serde_json::from_reader(BufReader::new(f))
            .map_err(|e| QcError::format("Stats.json", format!("{}: {}", path.display(), e)))
    }

    pub fn write_to(&self, data: &mut RunData) {
        for lane in &self.conversion_results {
            let l = lane.lane_number;
            data.put(
                format!("{}.lane{}.all.raw.cluster.count", PREFIX, l),
                lane.total_clusters_raw,
            );
            data.put(
                format!("{}.lane{}.all.pf.cluster.count", PREFIX, l),
                lane.total_clusters_pf,
            );
            data.put(format!("{}.lane{}.all.pf.yield", PREFIX, l), lane.yield_);

            let samples = lane
                .demux_results
                .iter()
                .map(|s| (s.sample_id.as_str(), s))
                .chain(lane.undetermined.iter().map(|s| (UNDETERMINED_SAMPLE, s)));

            for (name, sample) in samples {
                let prefix = format!("{}.lane{}.sample.{}", PREFIX, l, name);
                let barcode = sample
                    .index_metrics
                    .iter()
                    .map(|i| i.index_sequence.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                if !barcode.is_empty() {
                    data.put(format!("{}.barcode", prefix), barcode);
                }

                for read in &sample.read_metrics {
                    let p = format!("{}.read{}.pf", prefix, read.read_number);
                    data.put(format!("{}.cluster.count", p), sample.number_reads);
                    data.put(format!("{}.yield", p), read.yield_);
                    data.put(format!("{}.yield.q30", p), read.yield_q30);
                    data.put(format!("{}.quality.score.sum", p), read.quality_score_sum);
                }
            }
        }
    }
}

#[derive(Default)]
pub struct DemuxCollector {
    path: PathBuf,
}

impl Collector for DemuxCollector {
    fn name(&self) -> &'static str {
        super::DEMUX
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![super::RUN_INFO, super::DESIGN]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.path = ctx.config.fastq_dir.join("Stats").join("Stats.json");
        Ok(())
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        let stats = DemuxStats::from_file(&self.path)?;
        info!(
            "demultiplexing report {}: {} lanes",
            self.path.display(),
            stats.conversion_results.len()
        );
        stats.write_to(data);
        Ok(())
    }
}
