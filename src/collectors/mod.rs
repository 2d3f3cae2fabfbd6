// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Collectors: each one reads one source of facts about the run and writes
//! them into the run data.
//!
//! Collectors run one after the other, in an order where every collector
//! comes after the collectors it requires. Fan-out collectors (the FASTQ
//! based ones) split their work per sample and run it on an [`Engine`].
//!
//! [`Engine`]: crate::engine::Engine

pub mod demux;
pub mod design;
pub mod fastq;
pub mod interop;
pub mod qc_info;
pub mod registry;
pub mod run_info;

use crate::context::RunContext;
use crate::errors::Result;
use crate::run_data::RunData;

pub use registry::{resolve_order, CollectorFactory, CollectorRegistry};

pub const RUN_INFO: &str = "runinfo";
pub const DESIGN: &str = "design";
pub const DEMUX: &str = "demux";
pub const QC_INFO: &str = "qcinfo";
pub const TILE_METRICS: &str = "tilemetrics";
pub const ERROR_METRICS: &str = "errormetrics";
pub const EXTRACTION_METRICS: &str = "extractionmetrics";
pub const QUALITY_METRICS: &str = "qualitymetrics";
pub const INDEX_METRICS: &str = "indexmetrics";
pub const PARTIAL_FASTQ: &str = "tmppartialfastq";
pub const FASTQ_SCREEN: &str = "fastqscreen";
pub const QUALITY_MODULE: &str = "qualitymodule";

pub trait Collector: Send {
    /// Unique name, used for selection and dependencies.
    fn name(&self) -> &'static str;

    /// Collectors that must have run before this one.
    fn required_collectors(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Read options and paths from the run context. Called once, before any
    /// collector runs.
    fn configure(&mut self, ctx: &RunContext) -> Result<()>;

    fn collect(&mut self, data: &mut RunData) -> Result<()>;

    /// Release anything held between `configure` and the end of the run.
    fn clear(&mut self) {}
}
