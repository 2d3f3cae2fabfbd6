// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `fastqscreen`: map the subset FASTQ of each sample on a list of genomes
//! and report which share of the reads hit each of them.

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use super::{for_each_record, SampleTaskFactory};
use crate::config::{FastqScreenConfig, GenomeIndex};
use crate::context::{FastqStorage, RunContext};
use crate::engine::{CancelToken, ProcessingTask, TaskOutcome};
use crate::errors::{QcError, Result};
use crate::mapper::MapperCommand;
use crate::metric_utils::percent;
use crate::partition::WorkItem;
use crate::run_data::RunData;

const PREFIX: &str = "fastqscreen";

/// How a read hit one genome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HitCategory {
    OneHitOneGenome,
    MultipleHitsOneGenome,
    OneHitMultipleGenomes,
    MultipleHitsMultipleGenomes,
}

impl HitCategory {
    pub const ALL: [HitCategory; 4] = [
        HitCategory::OneHitOneGenome,
        HitCategory::MultipleHitsOneGenome,
        HitCategory::OneHitMultipleGenomes,
        HitCategory::MultipleHitsMultipleGenomes,
    ];

    fn of(hits: u32, genomes: usize) -> HitCategory {
        match (hits > 1, genomes > 1) {
            (false, false) => HitCategory::OneHitOneGenome,
            (true, false) => HitCategory::MultipleHitsOneGenome,
            (false, true) => HitCategory::OneHitMultipleGenomes,
            (true, true) => HitCategory::MultipleHitsMultipleGenomes,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            HitCategory::OneHitOneGenome => "one.hit.one.genome",
            HitCategory::MultipleHitsOneGenome => "multiple.hits.one.genome",
            HitCategory::OneHitMultipleGenomes => "one.hit.multiple.genomes",
            HitCategory::MultipleHitsMultipleGenomes => "multiple.hits.multiple.genomes",
        }
    }
}

/// Alignment counts per read and genome.
#[derive(Clone, Debug)]
pub struct HitCounter {
    genomes: Vec<String>,
    hits: HashMap<String, BTreeMap<usize, u32>>,
    reads_processed: u64,
}

impl HitCounter {
    pub fn new(genomes: Vec<String>) -> HitCounter {
        HitCounter {
            genomes,
            hits: HashMap::new(),
            reads_processed: 0,
        }
    }

    /// Count one alignment of `read` on genome number `genome`. Primary and
    /// secondary alignments both count.
    pub fn add_hit(&mut self, genome: usize, read: &str) {
        *self
            .hits
            .entry(read.to_string())
            .or_default()
            .entry(genome)
            .or_insert(0) += 1;
    }

    pub fn set_reads_processed(&mut self, n: u64) {
        self.reads_processed = n;
    }

    pub fn reads_processed(&self) -> u64 {
        self.reads_processed
    }

    /// Reads with at least one alignment.
    pub fn reads_mapped(&self) -> u64 {
        self.hits.len() as u64
    }

    /// Number of reads of each category, per genome.
    pub fn category_counts(&self) -> Vec<BTreeMap<HitCategory, u64>> {
        let mut counts = vec![BTreeMap::new(); self.genomes.len()];
        for genomes in self.hits.values() {
            for (&g, &hits) in genomes {
                *counts[g]
                    .entry(HitCategory::of(hits, genomes.len()))
                    .or_insert(0) += 1;
            }
        }
        counts
    }

    /// Write the percentages of every genome under `prefix`.
    pub fn write_to(&self, prefix: &str, data: &mut RunData) {
        let total = self.reads_processed as i64;
        for (genome, counts) in self.genomes.iter().zip(self.category_counts()) {
            let mut mapped = 0;
            for cat in HitCategory::ALL.iter() {
                let n = counts.get(cat).copied().unwrap_or(0) as i64;
                mapped += n;
                data.put(
                    format!("{}.{}.{}.percent", prefix, genome, cat.key()),
                    percent(n, total),
                );
            }
            data.put(
                format!("{}.{}.mapped.percent", prefix, genome),
                percent(mapped, total),
            );
        }

        let unmapped = total - self.reads_mapped() as i64;
        data.put(
            format!("{}.hit.no.genomes.percent", prefix),
            percent(unmapped.max(0), total),
        );
        data.put(format!("{}.reads.processed", prefix), total);
        data.put(format!("{}.reads.mapped", prefix), self.reads_mapped() as i64);
    }
}

#[derive(Default)]
pub struct FastqScreenFactory {
    config: FastqScreenConfig,
    storage: Option<Arc<FastqStorage>>,
}

impl SampleTaskFactory for FastqScreenFactory {
    fn name(&self) -> &'static str {
        crate::collectors::FASTQ_SCREEN
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![crate::collectors::PARTIAL_FASTQ]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.config = ctx.config.fastq_screen.clone();
        self.storage = Some(ctx.storage.clone());
        Ok(())
    }

    fn create_task(
        &self,
        _data: &RunData,
        item: &WorkItem,
    ) -> Result<Option<Box<dyn ProcessingTask>>> {
        if self.config.genomes.is_empty() {
            return Ok(None);
        }
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| QcError::config("fastqscreen used before configure"))?;

        Ok(Some(Box::new(FastqScreenTask {
            item: item.clone(),
            subset: storage.subset_path(&item.sample, item.lane, item.read_sample),
            genomes: self.config.genomes.clone(),
            mapper: MapperCommand::from_config(&self.config),
            threads: self.config.threads,
        })))
    }

    fn clear(&mut self) {
        self.storage = None;
    }
}

/// Screening of the subset FASTQ of one work item.
pub struct FastqScreenTask {
    item: WorkItem,
    subset: PathBuf,
    genomes: Vec<GenomeIndex>,
    mapper: MapperCommand,
    threads: usize,
}

impl ProcessingTask for FastqScreenTask {
    fn label(&self) -> String {
        format!("{} {}", PREFIX, self.item)
    }

    fn run(&mut self, cancel: &CancelToken) -> anyhow::Result<TaskOutcome> {
        if !self.subset.exists() {
            return Ok(TaskOutcome::Skipped(format!(
                "no subset FASTQ for {}",
                self.item
            )));
        }

        let mut counter = HitCounter::new(self.genomes.iter().map(|g| g.name.clone()).collect());
        let n = for_each_record(std::slice::from_ref(&self.subset), cancel, |_| Ok(true))?;
        counter.set_reads_processed(n);

        for (i, genome) in self.genomes.iter().enumerate() {
            cancel.check()?;
            let alignments = self.mapper.run(
                &genome.index,
                &self.subset,
                self.threads,
                cancel,
                |record| {
                    if !record.is_unmapped() {
                        counter.add_hit(i, record.qname);
                    }
                    Ok(())
                },
            )?;
            debug!("{}: {} alignments on {}", self.item, alignments, genome.name);
        }

        let mut data = RunData::new();
        let prefix = format!(
            "{}.lane{}.sample.{}.read{}",
            PREFIX, self.item.lane, self.item.sample, self.item.read_sample
        );
        counter.write_to(&prefix, &mut data);
        Ok(TaskOutcome::Completed(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::partition;
    use crate::partition::tests::two_lane_run;
    use std::path::Path;

    fn genomes(dir: &Path) -> Vec<GenomeIndex> {
        let a = dir.join("a.sam");
        let b = dir.join("b.sam");
        std::fs::write(&a, "@SQ\tSN:a1\nr1\t0\ta1\nr2\t0\ta1\nr2\t256\ta1\nr4\t4\t*\n").unwrap();
        std::fs::write(&b, "r2\t0\tb1\nr3\t16\tb1\n").unwrap();
        vec![
            GenomeIndex {
                name: "phix".to_string(),
                index: a,
            },
            GenomeIndex {
                name: "human".to_string(),
                index: b,
            },
        ]
    }

    /// A mapper that prints the file given as its index.
    fn cat_config(dir: &Path) -> FastqScreenConfig {
        FastqScreenConfig {
            mapper: "sh".to_string(),
            args: vec!["-c".to_string(), "cat {index}".to_string()],
            genomes: genomes(dir),
            threads: 1,
        }
    }

    #[test]
    fn test_hit_counter() {
        let mut c = HitCounter::new(vec!["a".to_string(), "b".to_string()]);
        c.add_hit(0, "r1");
        c.add_hit(0, "r2");
        c.add_hit(0, "r2");
        c.add_hit(1, "r2");
        c.add_hit(1, "r3");
        c.set_reads_processed(5);

        let counts = c.category_counts();
        assert_eq!(counts[0].get(&HitCategory::OneHitOneGenome), Some(&1));
        assert_eq!(counts[0].get(&HitCategory::MultipleHitsMultipleGenomes), Some(&1));
        assert_eq!(counts[1].get(&HitCategory::OneHitMultipleGenomes), Some(&1));
        assert_eq!(counts[1].get(&HitCategory::OneHitOneGenome), Some(&1));
        assert_eq!(c.reads_mapped(), 3);

        let mut data = RunData::new();
        c.write_to("x", &mut data);
        assert_eq!(data.get_double("x.a.mapped.percent").unwrap(), 40.0);
        assert_eq!(data.get_double("x.b.one.hit.one.genome.percent").unwrap(), 20.0);
        assert_eq!(data.get_double("x.hit.no.genomes.percent").unwrap(), 40.0);
        assert_eq!(data.get_long("x.reads.mapped").unwrap(), 3);
    }

    #[test]
    fn test_empty_counter() {
        let c = HitCounter::new(vec!["a".to_string()]);
        let mut data = RunData::new();
        c.write_to("x", &mut data);
        assert!(data.get_double("x.a.mapped.percent").unwrap().is_nan());
        assert_eq!(data.get_long("x.reads.processed").unwrap(), 0);
    }

    #[test]
    fn test_screen_task() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FastqStorage::new(dir.path().join("tmp"), "RUN").unwrap());
        let subset = storage.subset_path("S1", 1, 1);
        let mut fastq = String::new();
        for i in 1..=5 {
            fastq.push_str(&format!("@r{}\nACGT\n+\nIIII\n", i));
        }
        std::fs::write(&subset, fastq).unwrap();

        let factory = FastqScreenFactory {
            config: cat_config(dir.path()),
            storage: Some(storage),
        };
        let data = two_lane_run();
        let items = partition(&data).unwrap();

        let mut task = factory.create_task(&data, &items[0]).unwrap().unwrap();
        let result = match task.run(&CancelToken::new()).unwrap() {
            TaskOutcome::Completed(r) => r,
            other => panic!("unexpected {:?}", other),
        };
        let key = |k: &str| format!("fastqscreen.lane1.sample.S1.read1.{}", k);
        assert_eq!(result.get_long(&key("reads.processed")).unwrap(), 5);
        assert_eq!(result.get_long(&key("reads.mapped")).unwrap(), 3);
        assert_eq!(result.get_double(&key("phix.mapped.percent")).unwrap(), 40.0);
        assert_eq!(
            result
                .get_double(&key("human.one.hit.multiple.genomes.percent"))
                .unwrap(),
            20.0
        );
        assert_eq!(result.get_double(&key("hit.no.genomes.percent")).unwrap(), 40.0);

        // No subset for lane 2.
        let mut task = factory.create_task(&data, &items[2]).unwrap().unwrap();
        assert!(matches!(
            task.run(&CancelToken::new()).unwrap(),
            TaskOutcome::Skipped(_)
        ));
    }

    #[test]
    fn test_no_genomes() {
        let factory = FastqScreenFactory::default();
        let data = two_lane_run();
        let items = partition(&data).unwrap();
        assert!(factory.create_task(&data, &items[0]).unwrap().is_none());
    }
}
