// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `tmppartialfastq`: copy a random subset of the PF reads of each sample
//! into an uncompressed FASTQ file for the screening collectors.

use anyhow::Context;
use fastq::Record;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use super::{for_each_record, is_filtered, SampleTaskFactory};
use crate::config::PartialFastqConfig;
use crate::context::{FastqStorage, RunContext};
use crate::engine::{CancelToken, ProcessingTask, TaskOutcome};
use crate::errors::{QcError, Result};
use crate::filenames::find_sample_fastqs;
use crate::partition::WorkItem;
use crate::run_data::RunData;

const PREFIX: &str = "tmppartialfastq";

#[derive(Default)]
pub struct PartialFastqFactory {
    config: PartialFastqConfig,
    fastq_dir: PathBuf,
    storage: Option<Arc<FastqStorage>>,
}

impl SampleTaskFactory for PartialFastqFactory {
    fn name(&self) -> &'static str {
        crate::collectors::PARTIAL_FASTQ
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![
            crate::collectors::RUN_INFO,
            crate::collectors::DESIGN,
            crate::collectors::DEMUX,
        ]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.config = ctx.config.partial_fastq.clone();
        self.fastq_dir = ctx.config.fastq_dir.clone();
        self.storage = Some(ctx.storage.clone());
        Ok(())
    }

    fn create_task(
        &self,
        data: &RunData,
        item: &WorkItem,
    ) -> Result<Option<Box<dyn ProcessingTask>>> {
        if item.control && self.config.skip_control_lane {
            return Ok(None);
        }
        if item.read_sample > 1 && (self.config.ignore_paired_mode || !item.paired) {
            return Ok(None);
        }

        let storage = self
            .storage
            .clone()
            .ok_or_else(|| QcError::config("tmppartialfastq used before configure"))?;
        let output = storage.subset_path(&item.sample, item.lane, item.read_sample);
        if output.exists() {
            debug!("{} already exists", output.display());
            return Ok(None);
        }

        let pf_key = format!(
            "demux.lane{}.sample.{}.read{}.pf.cluster.count",
            item.lane, item.sample, item.read_sample
        );
        let pf_clusters = if data.contains(&pf_key) {
            Some(data.get_long(&pf_key)?)
        } else {
            None
        };

        Ok(Some(Box::new(PartialFastqTask {
            item: item.clone(),
            fastq_dir: self.fastq_dir.clone(),
            pf_clusters,
            config: self.config.clone(),
            storage,
            output,
        })))
    }

    fn clear(&mut self) {
        self.storage = None;
    }
}

/// Sampling of the PF reads of one work item.
pub struct PartialFastqTask {
    item: WorkItem,
    fastq_dir: PathBuf,
    /// PF cluster count from the demultiplexing report.
    pf_clusters: Option<i64>,
    config: PartialFastqConfig,
    storage: Arc<FastqStorage>,
    output: PathBuf,
}

impl PartialFastqTask {
    /// Probability of keeping each PF read.
    fn keep_probability(&self, pf_clusters: i64) -> f64 {
        if self.config.reads_pf_to_copy < 0 || pf_clusters <= self.config.reads_pf_to_copy {
            1.0
        } else {
            self.config.reads_pf_to_copy as f64 / pf_clusters as f64
        }
    }

    /// The RNG depends on the configured seed and on the item only, so the
    /// subset does not depend on the order tasks are run in.
    fn rng(&self) -> XorShiftRng {
        let mut seed = self.config.seed;
        for b in self.item.sample.bytes() {
            seed = seed.wrapping_mul(31).wrapping_add(u64::from(b));
        }
        seed = seed
            .wrapping_mul(1_000_003)
            .wrapping_add(((self.item.lane as u64) << 8) | self.item.read_sample as u64);
        XorShiftRng::seed_from_u64(seed)
    }
}

impl ProcessingTask for PartialFastqTask {
    fn label(&self) -> String {
        format!("{} {}", PREFIX, self.item)
    }

    fn run(&mut self, cancel: &CancelToken) -> anyhow::Result<TaskOutcome> {
        let pf_clusters = match self.pf_clusters {
            Some(n) => n,
            None => {
                return Ok(TaskOutcome::Skipped(format!(
                    "no demultiplexing count for {}",
                    self.item
                )))
            }
        };

        let files = find_sample_fastqs(
            &self.fastq_dir,
            self.item.project.as_deref(),
            &self.item.sample,
            self.item.lane,
            self.item.read_sample,
        )?;
        if files.is_empty() {
            return Ok(TaskOutcome::Skipped(format!("no FASTQ file for {}", self.item)));
        }

        let p = self.keep_probability(pf_clusters);
        let max_parsed = if self.config.max_reads_pf_to_parse < 0 {
            u64::MAX
        } else {
            self.config.max_reads_pf_to_parse as u64
        };
        let max_copied = if self.config.reads_pf_to_copy < 0 {
            u64::MAX
        } else {
            self.config.reads_pf_to_copy as u64
        };

        let mut rng = self.rng();
        let tmp = tempfile::NamedTempFile::new_in(self.storage.dir())
            .context("cannot create subset FASTQ file")?;
        let mut writer = BufWriter::new(tmp.as_file());
        let mut parsed = 0u64;
        let mut copied = 0u64;

        for_each_record(&files, cancel, |record| {
            if is_filtered(record.head()) {
                return Ok(true);
            }
            parsed += 1;
            if p >= 1.0 || rng.gen::<f64>() < p {
                record.write(&mut writer)?;
                copied += 1;
            }
            Ok(parsed < max_parsed && copied < max_copied)
        })?;

        writer.flush()?;
        drop(writer);
        tmp.persist(&self.output)
            .with_context(|| format!("cannot write {}", self.output.display()))?;
        self.storage.register(&self.output);

        debug!("{}: copied {} of {} PF reads", self.item, copied, parsed);

        let mut data = RunData::new();
        let key = |m: &str| {
            format!(
                "{}.lane{}.sample.{}.read{}.{}",
                PREFIX, self.item.lane, self.item.sample, self.item.read_sample, m
            )
        };
        data.put(key("reads.parsed"), parsed as i64);
        data.put(key("reads.copied"), copied as i64);
        Ok(TaskOutcome::Completed(data))
    }
}
