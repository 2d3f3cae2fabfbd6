// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Options of a QC run, loaded from a JSON file.

use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{QcError, Result};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct QcConfig {
    /// Run folder written by the instrument (holds `RunInfo.xml`, `InterOp/`).
    pub run_dir: PathBuf,
    /// bcl2fastq output folder (holds `Stats/Stats.json` and the FASTQs).
    pub fastq_dir: PathBuf,
    /// Where the `<run_id>.data` file is written.
    pub output_dir: PathBuf,
    /// Where subset FASTQ files are stored while the run is processed.
    pub tmp_dir: PathBuf,
    /// Defaults to `<run_dir>/SampleSheet.csv`.
    pub sample_sheet: Option<PathBuf>,
    /// Defaults to the name of the run folder.
    pub run_id: Option<String>,
    /// Collectors to run. Empty means all registered collectors.
    pub collectors: Vec<String>,
    pub engine: EngineConfig,
    pub partial_fastq: PartialFastqConfig,
    pub fastq_screen: FastqScreenConfig,
    pub quality_module: QualityModuleConfig,
}

impl Default for QcConfig {
    fn default() -> Self {
        QcConfig {
            run_dir: PathBuf::from("."),
            fastq_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            tmp_dir: std::env::temp_dir(),
            sample_sheet: None,
            run_id: None,
            collectors: Vec::new(),
            engine: EngineConfig::default(),
            partial_fastq: PartialFastqConfig::default(),
            fastq_screen: FastqScreenConfig::default(),
            quality_module: QualityModuleConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads per fan-out collector. Defaults to the available
    /// parallelism of the machine.
    pub threads: Option<usize>,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            threads: None,
            poll_interval_ms: 5000,
            shutdown_timeout_secs: 3600,
        }
    }
}

impl EngineConfig {
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PartialFastqConfig {
    /// PF reads copied into each subset file; -1 copies every read.
    pub reads_pf_to_copy: i64,
    /// Stop reading a sample after this many PF reads; -1 reads everything.
    pub max_reads_pf_to_parse: i64,
    pub skip_control_lane: bool,
    /// Treat paired-end runs as single-end.
    pub ignore_paired_mode: bool,
    pub seed: u64,
}

impl Default for PartialFastqConfig {
    fn default() -> Self {
        PartialFastqConfig {
            reads_pf_to_copy: 200_000,
            max_reads_pf_to_parse: 30_000_000,
            skip_control_lane: true,
            ignore_paired_mode: false,
            seed: 0x5eed,
        }
    }
}

/// A genome index the mapper can screen reads against.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenomeIndex {
    pub name: String,
    pub index: PathBuf,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FastqScreenConfig {
    /// Mapper executable.
    pub mapper: String,
    /// Argument template; `{index}`, `{fastq}` and `{threads}` are
    /// substituted.
    pub args: Vec<String>,
    pub genomes: Vec<GenomeIndex>,
    /// Threads handed to each mapper process.
    pub threads: usize,
}

impl Default for FastqScreenConfig {
    fn default() -> Self {
        FastqScreenConfig {
            mapper: "bowtie2".to_string(),
            args: ["-p", "{threads}", "--no-unal", "-k", "2", "-x", "{index}", "-U", "{fastq}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            genomes: Vec::new(),
            threads: 1,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct QualityModuleConfig {
    /// Modules to run. Empty means all built-in modules.
    pub modules: Vec<String>,
    /// Stop after this many reads per sample; -1 reads everything.
    pub max_reads: i64,
}

impl Default for QualityModuleConfig {
    fn default() -> Self {
        QualityModuleConfig {
            modules: Vec::new(),
            max_reads: -1,
        }
    }
}

impl QcConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<QcConfig> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| QcError::file(path, e))?;
        let config: QcConfig = serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            QcError::config(format!("invalid configuration {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<QcConfig> {
        let config: QcConfig = serde_json::from_str(json)
            .map_err(|e| QcError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.threads == Some(0) {
            return Err(QcError::config("engine.threads must be at least 1"));
        }
        if self.engine.poll_interval_ms == 0 {
            return Err(QcError::config("engine.poll_interval_ms must be positive"));
        }
        if self.partial_fastq.reads_pf_to_copy < -1 || self.partial_fastq.reads_pf_to_copy == 0 {
            return Err(QcError::config(
                "partial_fastq.reads_pf_to_copy must be positive or -1",
            ));
        }
        if self.partial_fastq.max_reads_pf_to_parse < -1
            || self.partial_fastq.max_reads_pf_to_parse == 0
        {
            return Err(QcError::config(
                "partial_fastq.max_reads_pf_to_parse must be positive or -1",
            ));
        }
        if self.fastq_screen.threads == 0 {
            return Err(QcError::config("fastq_screen.threads must be at least 1"));
        }
        Ok(())
    }

    pub fn sample_sheet_path(&self) -> PathBuf {
        self.sample_sheet
            .clone()
            .unwrap_or_else(|| self.run_dir.join("SampleSheet.csv"))
    }

    pub fn interop_dir(&self) -> PathBuf {
        self.run_dir.join("InterOp")
    }

    /// Every option as flat `name=value` pairs, nested options joined with
    /// dots. Used to record the configuration in the run data.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(value) = serde_json::to_value(self) {
            flatten_value("", &value, &mut out);
        }
        out
    }
}

fn flatten_value(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    use serde_json::Value;

    let join = |k: &str| {
        if prefix.is_empty() {
            k.to_string()
        } else {
            format!("{}.{}", prefix, k)
        }
    };

    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_value(&join(k), v, out);
            }
        }
        Value::Array(items) if items.iter().all(|v| !v.is_object()) => {
            let joined: Vec<String> = items.iter().map(scalar_text).collect();
            out.push((prefix.to_string(), joined.join(",")));
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_value(&join(&i.to_string()), v, out);
            }
        }
        v => out.push((prefix.to_string(), scalar_text(v))),
    }
}

fn scalar_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_partial_json() {
        let c = QcConfig::from_json_str(
            r#"{ "run_dir": "/runs/A", "engine": { "threads": 4 }, "partial_fastq": { "seed": 7 } }"#,
        )
        .unwrap();

        assert_eq!(c.run_dir, PathBuf::from("/runs/A"));
        assert_eq!(c.engine.thread_count(), 4);
        assert_eq!(c.engine.poll_interval(), Duration::from_secs(5));
        assert_eq!(c.engine.shutdown_timeout(), Duration::from_secs(3600));
        assert_eq!(c.partial_fastq.seed, 7);
        assert_eq!(c.partial_fastq.reads_pf_to_copy, 200_000);
        assert_eq!(c.sample_sheet_path(), PathBuf::from("/runs/A/SampleSheet.csv"));
        assert_eq!(c.interop_dir(), PathBuf::from("/runs/A/InterOp"));
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            QcConfig::from_json_str(r#"{ "engine": { "threads": 0 } }"#),
            Err(QcError::Config(_))
        ));
        assert!(matches!(
            QcConfig::from_json_str(r#"{ "partial_fastq": { "reads_pf_to_copy": -5 } }"#),
            Err(QcError::Config(_))
        ));
        assert!(matches!(
            QcConfig::from_json_str("{ not json"),
            Err(QcError::Config(_))
        ));
    }

    #[test]
    fn test_flatten() {
        let mut c = QcConfig::default();
        c.run_dir = PathBuf::from("/runs/A");
        c.collectors = vec!["runinfo".to_string(), "tilemetrics".to_string()];
        c.fastq_screen.genomes = vec![GenomeIndex {
            name: "phix".to_string(),
            index: PathBuf::from("/idx/phix"),
        }];

        let flat = c.flatten();
        let get = |k: &str| flat.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone());
        assert_eq!(get("run_dir").unwrap(), "/runs/A");
        assert_eq!(get("collectors").unwrap(), "runinfo,tilemetrics");
        assert_eq!(get("engine.poll_interval_ms").unwrap(), "5000");
        assert_eq!(get("fastq_screen.genomes.0.name").unwrap(), "phix");
        assert_eq!(get("sample_sheet").unwrap(), "");
    }
}
