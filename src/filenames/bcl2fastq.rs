// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::errors::{QcError, Result};

lazy_static! {
    static ref BCL2FASTQ_REGEX: Regex =
        Regex::new(r"^([\w_-]+)_S(\d+)_L(\d+)_([RI][A12])_(\d+)\.fastq(\.gz|\.lz4)?$").unwrap();
    static ref BCL2FASTQ_NO_LANE_SPLIT_REGEX: Regex =
        Regex::new(r"^([\w_-]+)_S(\d+)_([RI][A12])_(\d+)\.fastq(\.gz|\.lz4)?$").unwrap();
}

/// A parsed representation of an FASTQ file produced by
/// Illumina's bcl2fastq tool.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IlmnFastqFile {
    pub sample: String,
    pub s: usize,
    /// `None` when bcl2fastq ran with `--no-lane-splitting`.
    pub lane: Option<usize>,
    pub chunk: usize,
    pub read: String,
    pub path: PathBuf,
}

/// Parse the ILMN fastq filename to get the read name, lane, read group,
/// and S field. We expect a filename of the form
/// <path>/<prefix>_S0_L001_R1_001.fastq
impl IlmnFastqFile {
    /// Attempt to parse `path` as an Illumina bcl2fastq-produced
    /// FASTQ file.
    pub fn new(path: impl AsRef<Path>) -> Option<IlmnFastqFile> {
        let f = path.as_ref().file_name()?.to_str()?;

        if let Some(cap) = BCL2FASTQ_REGEX.captures(f) {
            return Some(IlmnFastqFile {
                sample: cap[1].to_string(),
                s: cap[2].parse().ok()?,
                lane: Some(cap[3].parse().ok()?),
                read: cap[4].to_string(),
                chunk: cap[5].parse().ok()?,
                path: path.as_ref().into(),
            });
        }

        // Try out the no lane split version next
        if let Some(cap) = BCL2FASTQ_NO_LANE_SPLIT_REGEX.captures(f) {
            return Some(IlmnFastqFile {
                sample: cap[1].to_string(),
                s: cap[2].parse().ok()?,
                lane: None,
                read: cap[3].to_string(),
                chunk: cap[4].parse().ok()?,
                path: path.as_ref().into(),
            });
        }

        None
    }

    pub fn matches(&self, sample: &str, lane: usize, read: usize) -> bool {
        self.sample == sample
            && self.lane.map_or(true, |l| l == lane)
            && self.read == format!("R{}", read)
    }
}

/// Find all the bcl2fastq FASTQ files present in `path`. A missing
/// directory holds no files.
fn get_bcl2fastq_files(path: impl AsRef<Path>) -> Result<Vec<IlmnFastqFile>> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(Vec::new());
    }

    let mut res = Vec::new();
    let dir_files = std::fs::read_dir(path).map_err(|e| QcError::file(path, e))?;

    for f in dir_files {
        let path = f?.path();
        if let Some(parsed) = IlmnFastqFile::new(&path) {
            res.push(parsed);
        }
    }

    Ok(res)
}

/// Find the FASTQ files of one sample, lane and read (the `R1`/`R2`
/// numbering), looking in `fastq_dir` itself and in the project and sample
/// directories bcl2fastq creates underneath it. Files are returned in chunk
/// order.
pub fn find_sample_fastqs(
    fastq_dir: impl AsRef<Path>,
    project: Option<&str>,
    sample: &str,
    lane: usize,
    read: usize,
) -> Result<Vec<PathBuf>> {
    let fastq_dir = fastq_dir.as_ref();

    let mut dirs = vec![fastq_dir.to_path_buf(), fastq_dir.join(sample)];
    if let Some(project) = project {
        let project_dir = fastq_dir.join(project);
        dirs.push(project_dir.join(sample));
        dirs.push(project_dir.join(format!("Sample_{}", sample)));
        dirs.push(project_dir);
    }

    let mut files = Vec::new();
    for dir in dirs {
        files.extend(
            get_bcl2fastq_files(dir)?
                .into_iter()
                .filter(|f| f.matches(sample, lane, read)),
        );
    }

    files.sort_by(|a, b| (a.chunk, &a.path).cmp(&(b.chunk, &b.path)));
    files.dedup_by(|a, b| a.path == b.path);
    Ok(files.into_iter().map(|f| f.path).collect())
}
