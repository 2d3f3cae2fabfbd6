// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Running the collectors of a QC run in dependency order.

use log::{error, info};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

use crate::collectors::registry::{resolve_order, CollectorRegistry};
use crate::collectors::Collector;
use crate::config::QcConfig;
use crate::context::RunContext;
use crate::errors::{QcError, Result};
use crate::filenames::run_data_file_name;
use crate::run_data::RunData;

/// A run that stopped on an error. `data` holds everything collected before
/// the failure and has been written to the run data file.
#[derive(Error, Debug)]
#[error("QC of run {run_id} failed")]
pub struct RunFailure {
    pub run_id: String,
    pub data: RunData,
    #[source]
    pub error: QcError,
}

/// A configured QC run.
pub struct Qc {
    context: RunContext,
    collectors: Vec<Box<dyn Collector>>,
}

impl Qc {
    /// Instantiate, order and configure the collectors named in the
    /// configuration, using the built-in collectors.
    pub fn new(config: QcConfig) -> Result<Qc> {
        Qc::with_registry(config, &CollectorRegistry::builtin()?)
    }

    pub fn with_registry(config: QcConfig, registry: &CollectorRegistry) -> Result<Qc> {
        config.validate()?;
        let collectors = resolve_order(registry.create_selected(&config.collectors)?)?;
        let context = RunContext::new(config)?;

        let mut qc = Qc {
            context,
            collectors,
        };
        for c in qc.collectors.iter_mut() {
            if let Err(e) = c.configure(&qc.context) {
                qc.context.close();
                return Err(e);
            }
        }
        info!(
            "run {}: collectors {}",
            qc.context.run_id,
            qc.collector_names().join(", ")
        );
        Ok(qc)
    }

    pub fn run_id(&self) -> &str {
        &self.context.run_id
    }

    /// Collector names in execution order.
    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    pub fn data_file(&self) -> PathBuf {
        self.context
            .config
            .output_dir
            .join(run_data_file_name(&self.context.run_id))
    }

    /// Run every collector. The run data is written to the data file on
    /// success and on failure.
    pub fn run(mut self) -> std::result::Result<RunData, RunFailure> {
        let start = Instant::now();
        let mut data = RunData::new();
        let outcome = self.collect(&mut data);

        for c in self.collectors.iter_mut() {
            c.clear();
        }
        self.context.close();

        let written = self.write(&data);
        let error = match (outcome, written) {
            (Ok(()), Ok(())) => {
                info!(
                    "run {}: {} entries in {:.1}s",
                    self.context.run_id,
                    data.len(),
                    start.elapsed().as_secs_f64()
                );
                return Ok(data);
            }
            (Err(e), written) => {
                if let Err(w) = written {
                    error!("cannot write post-mortem run data: {}", w);
                }
                e
            }
            (Ok(()), Err(w)) => w,
        };

        error!("run {}: {}", self.context.run_id, error);
        Err(RunFailure {
            run_id: self.context.run_id.clone(),
            data,
            error,
        })
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        for c in self.collectors.iter_mut() {
            let start = Instant::now();
            info!("collector {}: start", c.name());
            c.collect(data)?;
            info!(
                "collector {}: done in {:.1}s",
                c.name(),
                start.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }

    fn write(&self, data: &RunData) -> Result<()> {
        let dir = &self.context.config.output_dir;
        std::fs::create_dir_all(dir).map_err(|e| QcError::file(dir, e))?;
        data.write_file(self.data_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::demux::tests::STATS_JSON;
    use crate::collectors::design::tests::SAMPLE_SHEET;
    use crate::collectors::run_info::tests::RUN_INFO_XML;
    use crate::interop::testutil;
    use std::error::Error as _;
    use std::path::Path;

    fn setup(root: &Path) -> QcConfig {
        let run_dir = root.join("run");
        let fastq_dir = root.join("fastq");
        std::fs::create_dir_all(run_dir.join("InterOp")).unwrap();
        std::fs::create_dir_all(fastq_dir.join("Stats")).unwrap();
        std::fs::write(run_dir.join("RunInfo.xml"), RUN_INFO_XML).unwrap();
        std::fs::write(run_dir.join("SampleSheet.csv"), SAMPLE_SHEET).unwrap();
        std::fs::write(fastq_dir.join("Stats").join("Stats.json"), STATS_JSON).unwrap();
        testutil::write(
            &run_dir.join("InterOp"),
            "TileMetricsOut.bin",
            &testutil::tile_file(&[(1, 1101, 102, 100.0), (1, 1102, 102, 150.0)]),
        );

        QcConfig {
            run_dir,
            fastq_dir,
            output_dir: root.join("out"),
            tmp_dir: root.join("tmp"),
            run_id: Some("RUN1".to_string()),
            collectors: ["runinfo", "design", "demux", "qcinfo", "tilemetrics"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..QcConfig::default()
        }
    }

    #[test]
    fn test_run() {
        let dir = tempfile::tempdir().unwrap();
        let qc = Qc::new(setup(dir.path())).unwrap();
        assert_eq!(qc.collector_names()[0], "runinfo");
        let path = qc.data_file();

        let data = qc.run().unwrap();
        assert_eq!(data.get_int("read1.lane1.tile.count").unwrap(), 2);
        assert_eq!(data.get_long("demux.lane1.all.pf.cluster.count").unwrap(), 900);
        assert!(data.contains("qc.info.version"));

        let written = RunData::from_file(&path).unwrap();
        assert_eq!(written.len(), data.len());
        assert_eq!(
            written.get_string("run.info.run.id").unwrap(),
            "180101_NB500892_0067_AHGCWFBGXX"
        );
        assert!(!dir.path().join("tmp").join("qc_RUN1").exists());
    }

    #[test]
    fn test_failure_keeps_partial_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path());
        std::fs::remove_file(config.fastq_dir.join("Stats").join("Stats.json")).unwrap();

        let qc = Qc::new(config).unwrap();
        let path = qc.data_file();
        let failure = qc.run().unwrap_err();

        assert!(matches!(failure.error, QcError::File { .. }));
        assert!(failure.source().is_some());
        assert!(failure.data.contains("run.info.run.id"));
        assert!(!failure.data.contains("read1.lane1.tile.count"));
        assert!(RunData::from_file(&path).unwrap().contains("design.lane1.samples.names"));
    }

    #[test]
    fn test_config_errors_before_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(dir.path());
        config.collectors = vec!["demux".to_string()];
        assert!(matches!(Qc::new(config), Err(QcError::Config(_))));

        let mut config = setup(dir.path());
        config.collectors.push("nope".to_string());
        assert!(matches!(Qc::new(config), Err(QcError::Config(_))));
        assert!(!dir.path().join("out").exists());
    }
}
