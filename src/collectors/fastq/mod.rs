// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Collectors working on the FASTQ files of each sample.
//!
//! These collectors split the run into one work item per sequence read,
//! lane and sample, turn each item into a task, and run the tasks on an
//! [`Engine`]. A task copies whatever it needs from the run data when it is
//! created and returns a private result map, so the run data itself is only
//! touched by the collecting thread.

mod partial_fastq;
mod quality_module;
mod screen;

pub use partial_fastq::{PartialFastqFactory, PartialFastqTask};
pub use quality_module::{
    BasicStatistics, ModuleResult, ModuleStatus, PerSequenceQualityScores, QualityModule,
    QualityModuleFactory,
};
pub use screen::{FastqScreenFactory, FastqScreenTask, HitCounter};

use anyhow::Context;
use fastq::{Parser, RefRecord};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;

use super::Collector;
use crate::context::RunContext;
use crate::engine::{CancelToken, Engine, EngineSettings, ProcessingTask};
use crate::errors::Result;
use crate::partition::{Partitioner, WorkItem};
use crate::run_data::RunData;
use crate::utils::open_with_gz;

/// Records between two checks of the cancel token.
const CANCEL_CHECK_INTERVAL: u64 = 10_000;

/// Turns work items into tasks for one fan-out collector.
pub trait SampleTaskFactory: Send {
    fn name(&self) -> &'static str;

    fn required_collectors(&self) -> Vec<&'static str>;

    fn configure(&mut self, ctx: &RunContext) -> Result<()>;

    fn partitioner(&self) -> Partitioner {
        Partitioner::new().with_undetermined(true)
    }

    /// Build the task of `item`, or `None` when the item needs no work.
    fn create_task(&self, data: &RunData, item: &WorkItem)
        -> Result<Option<Box<dyn ProcessingTask>>>;

    fn clear(&mut self) {}
}

/// A collector running the tasks of a `SampleTaskFactory` on an engine.
pub struct FastqCollector<F> {
    factory: F,
    settings: EngineSettings,
}

impl<F: SampleTaskFactory> FastqCollector<F> {
    pub fn new(factory: F) -> FastqCollector<F> {
        FastqCollector {
            factory,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> FastqCollector<F> {
        self.settings = settings;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: SampleTaskFactory> Collector for FastqCollector<F> {
    fn name(&self) -> &'static str {
        self.factory.name()
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        self.factory.required_collectors()
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.settings = EngineSettings::from(&ctx.config.engine);
        self.factory.configure(ctx)
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        let start = Instant::now();
        let items = self.factory.partitioner().partition(data)?;

        let mut engine = Engine::new(self.settings);
        for item in &items {
            match self.factory.create_task(data, item)? {
                Some(task) => {
                    engine.submit(task)?;
                }
                None => debug!("{}: nothing to do for {}", self.name(), item),
            }
        }

        let submitted = engine.handles().len();
        let report = engine.run_all(data)?;
        info!(
            "{}: {} work items, {} tasks, {} merged, {} skipped in {:.1}s",
            self.name(),
            items.len(),
            submitted,
            report.merged,
            report.skipped.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.factory.clear();
    }
}

/// Illumina marks reads failing the chastity filter with `Y` in the second
/// field of the header comment, e.g. `1:Y:0:ACGT`.
pub fn is_filtered(head: &[u8]) -> bool {
    head.splitn(2, |&b| b == b' ')
        .nth(1)
        .map_or(false, |comment| comment.windows(3).any(|w| w == b":Y:"))
}

/// Feed every record of `files`, in order, to `f` until it returns
/// `false`. Returns the number of records read.
pub fn for_each_record<F>(files: &[PathBuf], cancel: &CancelToken, mut f: F) -> anyhow::Result<u64>
where
    F: FnMut(&RefRecord<'_>) -> anyhow::Result<bool>,
{
    let mut n = 0u64;
    for path in files {
        let reader = open_with_gz(path)?;
        let mut iter = Parser::new(reader).ref_iter();
        loop {
            iter.advance()
                .with_context(|| format!("cannot parse {}", path.display()))?;
            let record = match iter.get() {
                Some(r) => r,
                None => break,
            };
            n += 1;
            if n % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }
            if !f(&record)? {
                return Ok(n);
            }
        }
    }
    Ok(n)
}
