// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Splitting a run into per-sample units of work.

use serde_derive::Serialize;
use std::fmt;

use crate::errors::Result;
use crate::run_data::RunData;

/// Name bcl2fastq gives to reads that match no sample index.
pub const UNDETERMINED_SAMPLE: &str = "Undetermined";

/// One (read, lane, sample) combination to process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Read number in the run, index reads included.
    pub read: usize,
    pub lane: usize,
    pub sample: String,
    pub project: Option<String>,
    pub index: Option<String>,
    /// The lane is a control lane in the sample sheet.
    pub control: bool,
    /// The run has two sequence (non-index) reads.
    pub paired: bool,
    /// Rank of the read among the sequence reads, i.e. `n` in the `Rn` of
    /// the FASTQ file names.
    pub read_sample: usize,
}

impl WorkItem {
    pub fn is_undetermined(&self) -> bool {
        self.sample == UNDETERMINED_SAMPLE
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read{}/lane{}/{}", self.read, self.lane, self.sample)
    }
}

/// Builds the work items of a run from the layout and design facts of the
/// run data.
#[derive(Clone, Copy, Debug, Default)]
pub struct Partitioner {
    /// Also emit the `Undetermined` pseudo-sample on every lane.
    pub include_undetermined: bool,
}

impl Partitioner {
    pub fn new() -> Partitioner {
        Partitioner::default()
    }

    pub fn with_undetermined(mut self, include: bool) -> Partitioner {
        self.include_undetermined = include;
        self
    }

    /// Work items ordered by sequence read, then lane, then sample in sample
    /// sheet order. Index reads produce no items.
    pub fn partition(&self, data: &RunData) -> Result<Vec<WorkItem>> {
        let lane_count = data.lane_count()?;
        let read_count = data.read_count()?;

        let mut sequence_reads = Vec::new();
        for read in 1..=read_count {
            if !data.is_read_indexed(read)? {
                sequence_reads.push(read);
            }
        }
        let paired = sequence_reads.len() >= 2;

        let mut items = Vec::new();
        for (rank, &read) in sequence_reads.iter().enumerate() {
            for lane in 1..=lane_count {
                let mut samples = data.sample_names(lane);
                if self.include_undetermined && !samples.iter().any(|s| s == UNDETERMINED_SAMPLE) {
                    samples.push(UNDETERMINED_SAMPLE.to_string());
                }

                for sample in samples {
                    let key = |suffix: &str| format!("design.lane{}.{}.{}", lane, sample, suffix);
                    let text = |suffix: &str| {
                        data.get(&key(suffix))
                            .map(|v| v.to_string())
                            .filter(|s| !s.is_empty())
                    };
                    let control = match data.get(&key("control")) {
                        Some(_) => data.get_bool(&key("control"))?,
                        None => false,
                    };

                    items.push(WorkItem {
                        read,
                        lane,
                        project: text("sample.project"),
                        index: text("index"),
                        control,
                        paired,
                        read_sample: rank + 1,
                        sample,
                    });
                }
            }
        }

        Ok(items)
    }
}

/// Partition `data` without the `Undetermined` pseudo-sample.
pub fn partition(data: &RunData) -> Result<Vec<WorkItem>> {
    Partitioner::new().partition(data)
}
