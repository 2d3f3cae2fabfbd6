// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

use anyhow::{bail, Context, Error};
use log::info;
use std::io::Write;

use run_qc::interop::read_records;
use run_qc::{Qc, QcConfig};

const USAGE: &str = "\
usage: run_qc <config.json>
       run_qc dump-interop <interop dir> <family>";

/// Decode one InterOp file and print its records as JSON lines.
fn dump_interop(dir: &str, family: &str) -> Result<(), Error> {
    let records = read_records(dir, family)?;
    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    for r in &records {
        serde_json::to_writer(&mut out, r)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn run(config_path: &str) -> Result<(), Error> {
    let config = QcConfig::from_json_file(config_path)?;
    let qc = Qc::new(config)?;
    let path = qc.data_file();
    let data = qc.run()?;
    info!("{} entries written to {}", data.len(), path.display());
    Ok(())
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [cmd, dir, family] if cmd == "dump-interop" => dump_interop(dir, family)
            .with_context(|| format!("cannot dump {} from {}", family, dir)),
        [config] if config != "-h" && config != "--help" => run(config),
        _ => bail!("{}", USAGE),
    }
}
