// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `qualitymodule`: per-sample read quality modules run over the PF reads of
//! the raw FASTQ files.

use fastq::Record;
use log::debug;
use std::fmt;
use std::path::PathBuf;

use super::{for_each_record, is_filtered, SampleTaskFactory};
use crate::config::QualityModuleConfig;
use crate::context::RunContext;
use crate::engine::{CancelToken, ProcessingTask, TaskOutcome};
use crate::errors::{QcError, Result};
use crate::filenames::find_sample_fastqs;
use crate::partition::WorkItem;
use crate::run_data::{DataValue, RunData};

const PREFIX: &str = "qualitymodule";

/// Offset of the quality characters of Illumina 1.8+ FASTQ files.
const PHRED_OFFSET: u8 = 33;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleStatus::Pass => "pass",
            ModuleStatus::Warn => "warn",
            ModuleStatus::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// What a module concluded about the reads it saw.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleResult {
    pub status: ModuleStatus,
    /// Anchor of the module section in a rendered report.
    pub anchor: String,
    pub values: Vec<(&'static str, DataValue)>,
}

/// A quality module consumes reads one at a time and summarises them.
pub trait QualityModule: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, seq: &[u8], qual: &[u8]);

    fn result(&self) -> ModuleResult;
}

/// Counts, read lengths and GC content.
#[derive(Clone, Debug, Default)]
pub struct BasicStatistics {
    sequences: u64,
    min_length: Option<usize>,
    max_length: usize,
    gc: u64,
    at: u64,
}

impl BasicStatistics {
    pub const NAME: &'static str = "basic_statistics";
}

impl QualityModule for BasicStatistics {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&mut self, seq: &[u8], _qual: &[u8]) {
        self.sequences += 1;
        self.min_length = Some(self.min_length.map_or(seq.len(), |m| m.min(seq.len())));
        self.max_length = self.max_length.max(seq.len());
        for b in seq {
            match b {
                b'G' | b'C' | b'g' | b'c' => self.gc += 1,
                b'A' | b'T' | b'a' | b't' => self.at += 1,
                _ => (),
            }
        }
    }

    fn result(&self) -> ModuleResult {
        let gc = if self.gc + self.at == 0 {
            f64::NAN
        } else {
            100.0 * self.gc as f64 / (self.gc + self.at) as f64
        };
        ModuleResult {
            status: if self.sequences == 0 {
                ModuleStatus::Warn
            } else {
                ModuleStatus::Pass
            },
            anchor: "M0".to_string(),
            values: vec![
                ("total.sequences", DataValue::from(self.sequences as i64)),
                ("sequence.length.min", DataValue::from(self.min_length.unwrap_or(0))),
                ("sequence.length.max", DataValue::from(self.max_length)),
                ("gc.percent", DataValue::from(gc)),
            ],
        }
    }
}

/// Distribution of the mean quality of each read.
#[derive(Clone, Debug, Default)]
pub struct PerSequenceQualityScores {
    /// Reads per rounded mean quality.
    counts: Vec<u64>,
}

impl PerSequenceQualityScores {
    pub const NAME: &'static str = "per_sequence_quality_scores";
    const WARN_BELOW: usize = 27;
    const FAIL_BELOW: usize = 20;

    /// Most frequent mean quality; the lowest one on ties.
    pub fn mode(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n > 0)
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(q, _)| q)
    }
}

impl QualityModule for PerSequenceQualityScores {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&mut self, _seq: &[u8], qual: &[u8]) {
        if qual.is_empty() {
            return;
        }
        let sum: u64 = qual
            .iter()
            .map(|&q| u64::from(q.saturating_sub(PHRED_OFFSET)))
            .sum();
        let mean = ((sum as f64) / (qual.len() as f64)).round() as usize;
        if self.counts.len() <= mean {
            self.counts.resize(mean + 1, 0);
        }
        self.counts[mean] += 1;
    }

    fn result(&self) -> ModuleResult {
        let mode = self.mode();
        let status = match mode {
            None => ModuleStatus::Warn,
            Some(m) if m < Self::FAIL_BELOW => ModuleStatus::Fail,
            Some(m) if m < Self::WARN_BELOW => ModuleStatus::Warn,
            Some(_) => ModuleStatus::Pass,
        };
        ModuleResult {
            status,
            anchor: "M2".to_string(),
            values: vec![("mode", DataValue::from(mode.map_or(-1, |m| m as i64)))],
        }
    }
}

/// Built-in modules, in report order.
pub fn builtin_module_names() -> Vec<&'static str> {
    vec![BasicStatistics::NAME, PerSequenceQualityScores::NAME]
}

/// Instantiate the modules named in `names`; all modules when empty.
pub fn create_modules(names: &[String]) -> Result<Vec<Box<dyn QualityModule>>> {
    let names: Vec<&str> = if names.is_empty() {
        builtin_module_names()
    } else {
        names.iter().map(|n| n.as_str()).collect()
    };
    names
        .into_iter()
        .map(|name| -> Result<Box<dyn QualityModule>> {
            match name {
                BasicStatistics::NAME => Ok(Box::new(BasicStatistics::default())),
                PerSequenceQualityScores::NAME => {
                    Ok(Box::new(PerSequenceQualityScores::default()))
                }
                other => Err(QcError::config(format!("unknown quality module '{}'", other))),
            }
        })
        .collect()
}

#[derive(Default)]
pub struct QualityModuleFactory {
    config: QualityModuleConfig,
    fastq_dir: PathBuf,
}

impl SampleTaskFactory for QualityModuleFactory {
    fn name(&self) -> &'static str {
        crate::collectors::QUALITY_MODULE
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![crate::collectors::RUN_INFO, crate::collectors::DESIGN]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        // Fail on unknown module names before any task runs.
        create_modules(&ctx.config.quality_module.modules)?;
        self.config = ctx.config.quality_module.clone();
        self.fastq_dir = ctx.config.fastq_dir.clone();
        Ok(())
    }

    fn create_task(
        &self,
        _data: &RunData,
        item: &WorkItem,
    ) -> Result<Option<Box<dyn ProcessingTask>>> {
        Ok(Some(Box::new(QualityModuleTask {
            item: item.clone(),
            fastq_dir: self.fastq_dir.clone(),
            modules: create_modules(&self.config.modules)?,
            max_reads: self.config.max_reads,
        })))
    }
}

struct QualityModuleTask {
    item: WorkItem,
    fastq_dir: PathBuf,
    modules: Vec<Box<dyn QualityModule>>,
    max_reads: i64,
}

impl ProcessingTask for QualityModuleTask {
    fn label(&self) -> String {
        format!("{} {}", PREFIX, self.item)
    }

    fn run(&mut self, cancel: &CancelToken) -> anyhow::Result<TaskOutcome> {
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

        let max = if self.max_reads < 0 {
            u64::MAX
        } else {
            self.max_reads as u64
        };
        let modules = &mut self.modules;
        let mut processed = 0u64;
        for_each_record(&files, cancel, |record| {
            if is_filtered(record.head()) {
                return Ok(true);
            }
            for m in modules.iter_mut() {
                m.process(record.seq(), record.qual());
            }
            processed += 1;
            Ok(processed < max)
        })?;
        debug!("{}: {} PF reads", self.item, processed);

        let mut data = RunData::new();
        for m in &self.modules {
            let prefix = format!(
                "{}.lane{}.sample.{}.read{}.{}",
                PREFIX,
                self.item.lane,
                self.item.sample,
                self.item.read_sample,
                m.name()
            );
            let result = m.result();
            data.put(format!("{}.status", prefix), result.status.to_string());
            data.put(format!("{}.anchor", prefix), result.anchor);
            for (key, value) in result.values {
                data.put(format!("{}.{}", prefix, key), value);
            }
        }
        Ok(TaskOutcome::Completed(data))
    }
}
