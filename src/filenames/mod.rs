// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Utilities for finding the FASTQ files of a sample on disk, and for naming
//! the files this crate writes.

pub mod bcl2fastq;

pub use bcl2fastq::{find_sample_fastqs, IlmnFastqFile};

/// Name of the subset FASTQ file holding the reads sampled from one
/// lane / sample / read of a run.
pub fn subset_fastq_name(run_id: &str, sample: &str, lane: usize, read: usize) -> String {
    format!(
        "subset_fastq_{}_{}_L{:03}_R{}.fastq",
        run_id, sample, lane, read
    )
}

/// Name of the run data file written at the end of a run.
pub fn run_data_file_name(run_id: &str) -> String {
    format!("{}.data", run_id)
}
