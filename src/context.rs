// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! State shared by the collectors of one run.

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::QcConfig;
use crate::errors::{QcError, Result};
use crate::filenames::subset_fastq_name;

/// Directory holding the subset FASTQ files of a run. Files registered here
/// are removed when the run ends.
#[derive(Debug)]
pub struct FastqStorage {
    dir: PathBuf,
    run_id: String,
    files: Mutex<Vec<PathBuf>>,
}

impl FastqStorage {
    pub fn new(dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Result<FastqStorage> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| QcError::file(&dir, e))?;
        Ok(FastqStorage {
            dir,
            run_id: run_id.into(),
            files: Mutex::new(Vec::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the subset file of one lane / sample / read. The file may not
    /// exist yet.
    pub fn subset_path(&self, sample: &str, lane: usize, read: usize) -> PathBuf {
        self.dir
            .join(subset_fastq_name(&self.run_id, sample, lane, read))
    }

    /// Remember `path` so that it is deleted by `clear`.
    pub fn register(&self, path: impl Into<PathBuf>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.into());
    }

    /// Delete every registered file.
    pub fn clear(&self) {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        for path in files.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                Err(e) => warn!("cannot remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Everything a collector needs to know about the run besides the run data.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub config: QcConfig,
    pub run_id: String,
    pub storage: Arc<FastqStorage>,
}

impl RunContext {
    pub fn new(config: QcConfig) -> Result<RunContext> {
        let run_id = match &config.run_id {
            Some(id) => id.clone(),
            None => config
                .run_dir
                .canonicalize()
                .unwrap_or_else(|_| config.run_dir.clone())
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
                .ok_or_else(|| {
                    QcError::config(format!(
                        "cannot derive a run id from {}, set run_id",
                        config.run_dir.display()
                    ))
                })?,
        };

        let storage = FastqStorage::new(config.tmp_dir.join(format!("qc_{}", run_id)), &run_id)?;

        Ok(RunContext {
            config,
            run_id,
            storage: Arc::new(storage),
        })
    }

    pub fn interop_dir(&self) -> PathBuf {
        self.config.interop_dir()
    }

    /// Release the temporary files of the run.
    pub fn close(&self) {
        self.storage.clear();
        // Only succeeds when nothing else was left in the directory.
        if let Err(e) = std::fs::remove_dir(self.storage.dir()) {
            debug!("keeping {}: {}", self.storage.dir().display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_and_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let run_dir = tmp.path().join("180101_NB500_0001_AHXXX");
        std::fs::create_dir(&run_dir).unwrap();

        let mut config = QcConfig::default();
        config.run_dir = run_dir;
        config.tmp_dir = tmp.path().join("work");

        let ctx = RunContext::new(config).unwrap();
        assert_eq!(ctx.run_id, "180101_NB500_0001_AHXXX");

        let subset = ctx.storage.subset_path("S1", 1, 1);
        assert!(subset.ends_with("subset_fastq_180101_NB500_0001_AHXXX_S1_L001_R1.fastq"));
        std::fs::write(&subset, b"@r\nA\n+\nI\n").unwrap();
        ctx.storage.register(&subset);

        ctx.close();
        assert!(!subset.exists());
        assert!(!ctx.storage.dir().exists());
    }

    #[test]
    fn test_explicit_run_id() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = QcConfig::default();
        config.run_id = Some("RUN42".to_string());
        config.tmp_dir = tmp.path().to_path_buf();

        let ctx = RunContext::new(config).unwrap();
        assert_eq!(ctx.run_id, "RUN42");
        assert!(ctx.storage.dir().ends_with("qc_RUN42"));
    }
}
