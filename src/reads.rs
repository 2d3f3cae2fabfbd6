// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Mapping between sequencing cycles and reads.

use crate::errors::{QcError, Result};
use crate::run_data::RunData;

/// One read of the run and the cycle range it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadInfo {
    pub number: usize,
    pub cycles: usize,
    pub indexed: bool,
    /// First cycle of the read, 1-based.
    pub first_cycle: usize,
    /// Last cycle of the read, inclusive.
    pub last_cycle: usize,
}

impl ReadInfo {
    pub fn contains_cycle(&self, cycle: usize) -> bool {
        cycle >= self.first_cycle && cycle <= self.last_cycle
    }

    /// Position of `cycle` within this read, 1-based.
    pub fn cycle_in_read(&self, cycle: usize) -> usize {
        cycle + 1 - self.first_cycle
    }
}

/// Read layout of a run, built once per collection from the run data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadLayout {
    reads: Vec<ReadInfo>,
}

impl ReadLayout {
    /// Build the layout from `(read number, cycle count, indexed)` triples.
    /// Reads are laid out in read number order.
    pub fn new(mut reads: Vec<(usize, usize, bool)>) -> ReadLayout {
        reads.sort_by_key(|r| r.0);

        let mut next_cycle = 1;
        let reads = reads
            .into_iter()
            .map(|(number, cycles, indexed)| {
                let info = ReadInfo {
                    number,
                    cycles,
                    indexed,
                    first_cycle: next_cycle,
                    last_cycle: next_cycle + cycles - 1,
                };
                next_cycle += cycles;
                info
            })
            .filter(|r| r.cycles > 0)
            .collect();

        ReadLayout { reads }
    }

    /// Read the layout written by the `runinfo` collector.
    pub fn from_run_data(data: &RunData) -> Result<ReadLayout> {
        let read_count = data.read_count()?;
        let mut reads = Vec::with_capacity(read_count);
        for read in 1..=read_count {
            reads.push((read, data.read_cycles(read)?, data.is_read_indexed(read)?));
        }
        Ok(ReadLayout::new(reads))
    }

    pub fn reads(&self) -> &[ReadInfo] {
        &self.reads
    }

    pub fn read(&self, number: usize) -> Option<&ReadInfo> {
        self.reads.iter().find(|r| r.number == number)
    }

    /// Total number of cycles of the run.
    pub fn cycle_count(&self) -> usize {
        self.reads.last().map_or(0, |r| r.last_cycle)
    }

    /// Find the read whose cycle range contains `cycle`.
    pub fn read_for_cycle(&self, cycle: usize) -> Result<&ReadInfo> {
        self.reads
            .iter()
            .find(|r| r.contains_cycle(cycle))
            .ok_or_else(|| {
                QcError::config(format!(
                    "cycle {} is outside of the {} cycles of the run",
                    cycle,
                    self.cycle_count()
                ))
            })
    }

    /// Reads that are not index reads, with their rank among them
    /// (the `R1`/`R2` numbering of the FASTQ files).
    pub fn sequence_reads(&self) -> impl Iterator<Item = (usize, &ReadInfo)> {
        self.reads
            .iter()
            .filter(|r| !r.indexed)
            .enumerate()
            .map(|(i, r)| (i + 1, r))
    }
}
