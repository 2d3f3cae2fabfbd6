// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `design`: samples per lane from the bcl2fastq sample sheet.
//!
//! Both the sectioned sample sheet (`[Header]`, `[Reads]`, `[Data]`...) and
//! the older flat CSV with a single header row are understood. Without a
//! `Lane` column every sample is on every lane.

use indexmap::IndexMap;
use log::info;
use std::path::{Path, PathBuf};

use super::Collector;
use crate::context::RunContext;
use crate::errors::{QcError, Result};
use crate::run_data::RunData;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleEntry {
    pub lane: Option<usize>,
    pub sample: String,
    pub index: Option<String>,
    pub project: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub control: bool,
}

/// The rows of a sample sheet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleSheet {
    pub entries: Vec<SampleEntry>,
}

/// Lines of the `[Data]` section, or the whole text for flat sheets.
fn data_section(text: &str) -> String {
    let mut in_data = false;
    let mut sectioned = false;
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim().trim_end_matches(',');
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            sectioned = true;
            in_data = trimmed.eq_ignore_ascii_case("[Data]");
            continue;
        }
        if in_data {
            lines.push(line);
        }
    }
    if sectioned {
        lines.join("\n")
    } else {
        text.to_string()
    }
}

fn column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

impl SampleSheet {
    pub fn parse(text: &str) -> Result<SampleSheet> {
        let data = data_section(text);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes());

        let bad = |e: csv::Error| QcError::format("sample sheet", e.to_string());
        let headers = reader.headers().map_err(bad)?.clone();

        let sample_col = column(&headers, &["Sample_ID", "SampleID"])
            .ok_or_else(|| QcError::format("sample sheet", "no Sample_ID column"))?;
        let lane_col = column(&headers, &["Lane"]);
        let index_col = column(&headers, &["index", "Index"]);
        let index2_col = column(&headers, &["index2"]);
        let project_col = column(&headers, &["Sample_Project", "SampleProject", "Project"]);
        let description_col = column(&headers, &["Description"]);
        let reference_col = column(&headers, &["SampleRef", "Sample_Ref"]);
        let control_col = column(&headers, &["Control"]);

        let mut entries = Vec::new();
        for (n, row) in reader.records().enumerate() {
            let row = row.map_err(bad)?;
            let get = |c: Option<usize>| c.and_then(|c| row.get(c));

            let sample = match non_empty(row.get(sample_col)) {
                Some(s) => s,
                None => continue,
            };

            let lane = match non_empty(get(lane_col)) {
                Some(l) => Some(l.parse().map_err(|_| {
                    QcError::format(
                        "sample sheet",
                        format!("row {}: invalid lane '{}'", n + 1, l),
                    )
                })?),
                None => None,
            };

            let index = match (non_empty(get(index_col)), non_empty(get(index2_col))) {
                (Some(i1), Some(i2)) => Some(format!("{}-{}", i1, i2)),
                (i1, _) => i1,
            };

            entries.push(SampleEntry {
                lane,
                sample,
                index,
                project: non_empty(get(project_col)),
                description: non_empty(get(description_col)),
                reference: non_empty(get(reference_col)),
                control: non_empty(get(control_col))
                    .map_or(false, |c| c.eq_ignore_ascii_case("Y") || c.eq_ignore_ascii_case("true")),
            });
        }

        Ok(SampleSheet { entries })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<SampleSheet> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| QcError::file(path, e))?;
        SampleSheet::parse(&text)
    }

    /// Entries per lane, in sheet order. Entries without a lane go to every
    /// lane in `1..=lane_count`.
    pub fn by_lane(&self, lane_count: usize) -> IndexMap<usize, Vec<&SampleEntry>> {
        let mut lanes: IndexMap<usize, Vec<&SampleEntry>> = IndexMap::new();
        for lane in 1..=lane_count {
            let entries: Vec<_> = self
                .entries
                .iter()
                .filter(|e| e.lane.map_or(true, |l| l == lane))
                .collect();
            if !entries.is_empty() {
                lanes.insert(lane, entries);
            }
        }
        lanes
    }

    pub fn write_to(&self, lane_count: usize, data: &mut RunData) {
        for (lane, entries) in self.by_lane(lane_count) {
            let mut names: Vec<&str> = Vec::new();
            for e in &entries {
                if !names.contains(&e.sample.as_str()) {
                    names.push(&e.sample);
                }
                let key = |k: &str| format!("design.lane{}.{}.{}", lane, e.sample, k);
                if let Some(index) = &e.index {
                    data.put(key("index"), index.as_str());
                }
                if let Some(project) = &e.project {
                    data.put(key("sample.project"), project.as_str());
                }
                if let Some(description) = &e.description {
                    data.put(key("description"), description.as_str());
                }
                if let Some(reference) = &e.reference {
                    data.put(key("sample.ref"), reference.as_str());
                }
                data.put(key("control"), e.control);
            }
            data.put(format!("design.lane{}.sample.count", lane), names.len());
            data.put(format!("design.lane{}.samples.names", lane), names.join(","));
        }
    }
}

#[derive(Default)]
pub struct DesignCollector {
    path: PathBuf,
}

impl Collector for DesignCollector {
    fn name(&self) -> &'static str {
        super::DESIGN
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![super::RUN_INFO]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.path = ctx.config.sample_sheet_path();
        Ok(())
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        let sheet = SampleSheet::from_file(&self.path)?;
        let lane_count = data.lane_count()?;
        info!(
            "sample sheet {}: {} entries",
            self.path.display(),
            sheet.entries.len()
        );
        sheet.write_to(lane_count, data);
        Ok(())
    }
}
