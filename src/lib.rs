// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Quality control of Illumina sequencing runs.
//!
//! A run is described by the binary InterOp metrics written by the
//! instrument, its `RunInfo.xml`, the bcl2fastq sample sheet and
//! demultiplexing report, and the FASTQ files of each sample. Collectors read
//! these inputs one after the other and fill a single [`RunData`] store of
//! dotted `key=value` facts, which threshold [`checks`] then score.
//!
//! ```no_run
//! use run_qc::{Qc, QcConfig};
//!
//! let config = QcConfig::from_json_file("qc.json")?;
//! let data = Qc::new(config)?.run()?;
//! println!("{} entries", data.len());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod checks;
pub mod collectors;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod filenames;
pub mod interop;
pub mod mapper;
pub mod metric_utils;
pub mod partition;
pub mod qc;
pub mod reads;
pub mod run_data;
pub mod utils;

pub use crate::config::QcConfig;
pub use crate::errors::{QcError, Result};
pub use crate::qc::{Qc, RunFailure};
pub use crate::run_data::{DataValue, RunData};
