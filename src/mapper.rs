// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Running an external short read mapper and reading its SAM output.

use anyhow::{bail, Context};
use log::debug;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::FastqScreenConfig;
use crate::engine::CancelToken;

/// SAM lines between two checks of the cancel token.
const CANCEL_CHECK_INTERVAL: u64 = 10_000;

/// Bytes of mapper stderr kept in error messages.
const STDERR_TAIL: usize = 2048;

/// SAM flag of an unmapped segment.
pub const FLAG_UNMAPPED: u16 = 0x4;

/// The fields of a SAM alignment line used for screening.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamRecord<'a> {
    pub qname: &'a str,
    pub flag: u16,
    pub rname: &'a str,
}

impl<'a> SamRecord<'a> {
    /// Parse one SAM line. Header lines give `None`.
    pub fn parse(line: &'a str) -> anyhow::Result<Option<SamRecord<'a>>> {
        let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        if line.is_empty() || line.starts_with('@') {
            return Ok(None);
        }

        let mut fields = line.split('\t');
        let (qname, flag, rname) = match (fields.next(), fields.next(), fields.next()) {
            (Some(q), Some(f), Some(r)) => (q, f, r),
            _ => bail!("truncated SAM line: {}", line),
        };
        let flag = flag
            .parse::<u16>()
            .with_context(|| format!("invalid SAM flag '{}'", flag))?;

        Ok(Some(SamRecord { qname, flag, rname }))
    }

    pub fn is_unmapped(&self) -> bool {
        self.flag & FLAG_UNMAPPED != 0 || self.rname == "*"
    }
}

/// A mapper program and its argument template.
///
/// The placeholders `{index}`, `{fastq}` and `{threads}` are replaced in every
/// argument before the program is started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapperCommand {
    program: String,
    args: Vec<String>,
}

impl MapperCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> MapperCommand {
        MapperCommand {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &FastqScreenConfig) -> MapperCommand {
        MapperCommand::new(config.mapper.clone(), config.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self, index: &Path, fastq: &Path, threads: usize) -> Vec<String> {
        let index = index.to_string_lossy();
        let fastq = fastq.to_string_lossy();
        let threads = threads.to_string();
        self.args
            .iter()
            .map(|a| {
                a.replace("{index}", &index)
                    .replace("{fastq}", &fastq)
                    .replace("{threads}", &threads)
            })
            .collect()
    }

    /// Map `fastq` on `index`, handing every alignment line to `f`.
    /// Returns the number of alignment lines read.
    ///
    /// The mapper is killed when `cancel` fires. A non-zero exit status is an
    /// error carrying the end of the mapper's stderr.
    pub fn run<F>(
        &self,
        index: &Path,
        fastq: &Path,
        threads: usize,
        cancel: &CancelToken,
        mut f: F,
    ) -> anyhow::Result<u64>
    where
        F: FnMut(&SamRecord<'_>) -> anyhow::Result<()>,
    {
        let args = self.arguments(index, fastq, threads);
        debug!("running {} {}", self.program, args.join(" "));

        let mut stderr = tempfile::tempfile().context("cannot create mapper stderr file")?;
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()
            .with_context(|| format!("cannot start mapper {}", self.program))?;

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => bail!("mapper {} has no stdout", self.program),
        };

        let parsed = read_alignments(BufReader::new(stdout), cancel, &mut f);
        if parsed.is_err() {
            if let Err(e) = child.kill() {
                debug!("cannot kill mapper {}: {}", self.program, e);
            }
        }
        let status = child
            .wait()
            .with_context(|| format!("cannot wait for mapper {}", self.program))?;
        let n = parsed?;

        if !status.success() {
            let mut text = String::new();
            stderr.seek(SeekFrom::Start(0))?;
            stderr.read_to_string(&mut text)?;
            let start = text.len().saturating_sub(STDERR_TAIL);
            let start = (start..text.len())
                .find(|&i| text.is_char_boundary(i))
                .unwrap_or(text.len());
            bail!(
                "mapper {} failed with {}: {}",
                self.program,
                status,
                text[start..].trim()
            );
        }
        Ok(n)
    }
}

fn read_alignments<R, F>(reader: R, cancel: &CancelToken, f: &mut F) -> anyhow::Result<u64>
where
    R: BufRead,
    F: FnMut(&SamRecord<'_>) -> anyhow::Result<()>,
{
    let mut n = 0u64;
    for (i, line) in reader.lines().enumerate() {
        if i as u64 % CANCEL_CHECK_INTERVAL == 0 {
            cancel.check()?;
        }
        let line = line.context("cannot read mapper output")?;
        if let Some(record) = SamRecord::parse(&line)? {
            f(&record)?;
            n += 1;
        }
    }
    Ok(n)
}
