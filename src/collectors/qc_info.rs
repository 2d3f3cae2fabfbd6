// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `qcinfo`: which version of the tool produced the run data, where, and
//! with which options.

use super::Collector;
use crate::context::RunContext;
use crate::errors::Result;
use crate::run_data::RunData;

const PREFIX: &str = "qc.info";

#[derive(Default)]
pub struct QcInfoCollector {
    entries: Vec<(String, String)>,
    run_id: String,
}

impl Collector for QcInfoCollector {
    fn name(&self) -> &'static str {
        super::QC_INFO
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.entries = ctx.config.flatten();
        self.run_id = ctx.run_id.clone();
        Ok(())
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        data.put(format!("{}.version", PREFIX), env!("CARGO_PKG_VERSION"));
        data.put(format!("{}.os.name", PREFIX), std::env::consts::OS);
        data.put(format!("{}.os.arch", PREFIX), std::env::consts::ARCH);
        data.put(format!("{}.run.id", PREFIX), self.run_id.as_str());
        for (name, value) in &self.entries {
            data.put(format!("{}.conf.{}", PREFIX, name), value.as_str());
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QcConfig;

    #[test]
    fn test_collect() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = QcConfig::default();
        config.run_id = Some("RUN1".to_string());
        config.tmp_dir = tmp.path().to_path_buf();
        let ctx = RunContext::new(config).unwrap();

        let mut c = QcInfoCollector::default();
        c.configure(&ctx).unwrap();
        let mut data = RunData::new();
        c.collect(&mut data).unwrap();

        assert_eq!(data.get_string("qc.info.version").unwrap(), env!("CARGO_PKG_VERSION"));
        assert_eq!(data.get_string("qc.info.run.id").unwrap(), "RUN1");
        assert_eq!(data.get_string("qc.info.conf.run_id").unwrap(), "RUN1");
        assert_eq!(data.get_int("qc.info.conf.engine.poll_interval_ms").unwrap(), 5000);
    }
}
