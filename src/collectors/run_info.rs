// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `runinfo`: run layout from `RunInfo.xml` (reads, lanes, tiles).

use log::info;
use serde_derive::Deserialize;
use std::path::{Path, PathBuf};

use super::Collector;
use crate::context::RunContext;
use crate::errors::{QcError, Result};
use crate::run_data::RunData;

const FILE_NAME: &str = "RunInfo.xml";
const PREFIX: &str = "run.info";

// Document shape of RunInfo.xml. Attributes and child elements are both
// fields; anything not listed here is ignored.
#[derive(Deserialize)]
struct RunInfoXml {
    #[serde(rename = "Run")]
    run: RunXml,
}

#[derive(Deserialize)]
struct RunXml {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Number")]
    number: Option<i32>,
    #[serde(rename = "Flowcell", default)]
    flow_cell: String,
    #[serde(rename = "Instrument", default)]
    instrument: String,
    #[serde(rename = "Date", default)]
    date: String,
    #[serde(rename = "Reads", default)]
    reads: ReadsXml,
    #[serde(rename = "FlowcellLayout")]
    layout: LayoutXml,
    #[serde(rename = "AlignToPhiX", default)]
    align_to_phix: LanesXml,
    #[serde(rename = "ImageChannels", default)]
    image_channels: NamesXml,
}

#[derive(Default, Deserialize)]
struct ReadsXml {
    #[serde(rename = "Read", default)]
    reads: Vec<ReadXml>,
}

#[derive(Deserialize)]
struct ReadXml {
    #[serde(rename = "Number")]
    number: i32,
    #[serde(rename = "NumCycles")]
    cycles: Option<i32>,
    #[serde(rename = "IsIndexedRead")]
    indexed: Option<String>,
}

#[derive(Deserialize)]
struct LayoutXml {
    #[serde(rename = "LaneCount")]
    lane_count: i32,
    #[serde(rename = "SurfaceCount")]
    surface_count: Option<i32>,
    #[serde(rename = "SwathCount")]
    swath_count: Option<i32>,
    #[serde(rename = "TileCount")]
    tile_count: Option<i32>,
    #[serde(rename = "SectionPerLane")]
    section_per_lane: Option<i32>,
    #[serde(rename = "LanePerSection")]
    lane_per_section: Option<i32>,
}

#[derive(Default, Deserialize)]
struct LanesXml {
    #[serde(rename = "Lane", default)]
    lanes: Vec<i32>,
}

#[derive(Default, Deserialize)]
struct NamesXml {
    #[serde(rename = "Name", default)]
    names: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunRead {
    pub number: i32,
    pub cycles: i32,
    pub indexed: bool,
}

/// The parts of `RunInfo.xml` the QC uses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunInfo {
    pub id: String,
    pub number: i32,
    pub flow_cell: String,
    pub instrument: String,
    pub date: String,
    pub reads: Vec<RunRead>,
    pub lane_count: i32,
    pub surface_count: i32,
    pub swath_count: i32,
    pub tile_count: i32,
    pub section_per_lane: i32,
    pub lane_per_section: i32,
    pub align_to_phix: Vec<i32>,
    pub image_channels: Vec<String>,
}

impl RunInfo {
    pub fn parse(xml: &str) -> Result<RunInfo> {
        let doc: RunInfoXml = serde_xml_rs::from_str(xml)
            .map_err(|e| QcError::format(FILE_NAME, e.to_string()))?;
        let run = doc.run;

        let mut reads: Vec<RunRead> = run
            .reads
            .reads
            .into_iter()
            .map(|r| RunRead {
                number: r.number,
                cycles: r.cycles.unwrap_or(0),
                indexed: r.indexed.as_deref().map_or(false, |v| v.trim() == "Y"),
            })
            .collect();
        if reads.is_empty() {
            return Err(QcError::format(FILE_NAME, "no <Read> element"));
        }
        reads.sort_by_key(|r| r.number);

        let layout = run.layout;
        Ok(RunInfo {
            id: run.id,
            number: run.number.unwrap_or(0),
            flow_cell: run.flow_cell.trim().to_string(),
            instrument: run.instrument.trim().to_string(),
            date: run.date.trim().to_string(),
            reads,
            lane_count: layout.lane_count,
            surface_count: layout.surface_count.unwrap_or(0),
            swath_count: layout.swath_count.unwrap_or(0),
            tile_count: layout.tile_count.unwrap_or(0),
            section_per_lane: layout.section_per_lane.unwrap_or(0),
            lane_per_section: layout.lane_per_section.unwrap_or(0),
            align_to_phix: run.align_to_phix.lanes,
            image_channels: run
                .image_channels
                .names
                .into_iter()
                .map(|n| n.trim().to_string())
                .collect(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<RunInfo> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|e| QcError::file(path, e))?;
        RunInfo::parse(&xml)
    }

    /// Tiles per lane, over all surfaces and swaths.
    pub fn tiles_per_lane(&self) -> i32 {
        self.surface_count * self.swath_count * self.tile_count
    }

    /// `SR`, `PE`, or `other`, from the number of non-index reads.
    pub fn run_mode(&self) -> &'static str {
        match self.reads.iter().filter(|r| !r.indexed).count() {
            1 => "SR",
            2 => "PE",
            _ => "other",
        }
    }

    pub fn write_to(&self, data: &mut RunData) {
        let key = |k: &str| format!("{}.{}", PREFIX, k);

        data.put(key("run.id"), self.id.as_str());
        data.put(key("run.number"), self.number);
        data.put(key("flow.cell.id"), self.flow_cell.as_str());
        data.put(key("flow.cell.lane.count"), self.lane_count);
        data.put(key("flow.cell.surface.count"), self.surface_count);
        data.put(key("flow.cell.swath.count"), self.swath_count);
        data.put(key("flow.cell.tile.count"), self.tile_count);
        data.put(key("flow.cell.section.per.lane"), self.section_per_lane);
        data.put(key("flow.cell.lane.per.section"), self.lane_per_section);
        data.put(key("tiles.per.lane.count"), self.tiles_per_lane());
        data.put(key("instrument"), self.instrument.as_str());
        data.put(key("date"), self.date.as_str());
        data.put(key("image.channels"), self.image_channels.join(","));

        data.put(key("read.count"), self.reads.len());
        for read in &self.reads {
            data.put(key(&format!("read{}.cycles", read.number)), read.cycles);
            data.put(key(&format!("read{}.indexed", read.number)), read.indexed);
        }

        for lane in 1..=self.lane_count {
            data.put(
                key(&format!("align.to.phix.lane{}", lane)),
                self.align_to_phix.contains(&lane),
            );
        }

        data.put(key("run.mode"), self.run_mode());
    }
}

#[derive(Default)]
pub struct RunInfoCollector {
    path: PathBuf,
}

impl Collector for RunInfoCollector {
    fn name(&self) -> &'static str {
        super::RUN_INFO
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.path = ctx.config.run_dir.join(FILE_NAME);
        Ok(())
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        let run_info = RunInfo::from_file(&self.path)?;
        info!(
            "run {}: {} lanes, {} reads ({})",
            run_info.id,
            run_info.lane_count,
            run_info.reads.len(),
            run_info.run_mode()
        );
        run_info.write_to(data);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const RUN_INFO_XML: &str = r#"<?xml version="1.0"?>
<RunInfo xmlns:xsd="http://www.w3.org/2001/XMLSchema" Version="2">
  <Run Id="180101_NB500892_0067_AHGCWFBGXX" Number="67">
    <Flowcell>HGCWFBGXX</Flowcell>
    <Instrument>NB500892</Instrument>
    <Date>180101</Date>
    <Reads>
      <Read Number="1" NumCycles="76" IsIndexedRead="N" />
      <Read Number="2" NumCycles="8" IsIndexedRead="Y" />
      <Read Number="3" NumCycles="76" IsIndexedRead="N" />
    </Reads>
    <FlowcellLayout LaneCount="2" SurfaceCount="2" SwathCount="3" TileCount="12" SectionPerLane="3" LanePerSection="2">
      <TileSet TileNamingConvention="FiveDigit" />
    </FlowcellLayout>
    <AlignToPhiX>
      <Lane>1</Lane>
    </AlignToPhiX>
    <ImageChannels>
      <Name>Red</Name>
      <Name>Green</Name>
    </ImageChannels>
  </Run>
</RunInfo>
"#;

    #[test]
    fn test_parse() {
        let info = RunInfo::parse(RUN_INFO_XML).unwrap();
        assert_eq!(info.id, "180101_NB500892_0067_AHGCWFBGXX");
        assert_eq!(info.number, 67);
        assert_eq!(info.flow_cell, "HGCWFBGXX");
        assert_eq!(info.lane_count, 2);
        assert_eq!(info.tiles_per_lane(), 72);
        assert_eq!(info.reads.len(), 3);
        assert!(info.reads[1].indexed);
        assert_eq!(info.align_to_phix, vec![1]);
        assert_eq!(info.image_channels, vec!["Red", "Green"]);
        assert_eq!(info.run_mode(), "PE");
    }

    #[test]
    fn test_keys() {
        let mut data = RunData::new();
        RunInfo::parse(RUN_INFO_XML).unwrap().write_to(&mut data);

        assert_eq!(data.lane_count().unwrap(), 2);
        assert_eq!(data.read_count().unwrap(), 3);
        assert_eq!(data.read_cycles(3).unwrap(), 76);
        assert!(data.is_read_indexed(2).unwrap());
        assert_eq!(data.get_string("run.info.instrument").unwrap(), "NB500892");
        assert!(data.get_bool("run.info.align.to.phix.lane1").unwrap());
        assert!(!data.get_bool("run.info.align.to.phix.lane2").unwrap());
        assert_eq!(data.get_string("run.info.image.channels").unwrap(), "Red,Green");
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(RunInfo::parse("<RunInfo/>"), Err(QcError::Format { .. })));
        let no_reads = RUN_INFO_XML.replace("<Read ", "<Skip ");
        assert!(matches!(RunInfo::parse(&no_reads), Err(QcError::Format { .. })));
        let bad = RUN_INFO_XML.replace("NumCycles=\"76\"", "NumCycles=\"x\"");
        assert!(matches!(RunInfo::parse(&bad), Err(QcError::Format { .. })));
        let no_layout = RUN_INFO_XML
            .replace("<FlowcellLayout ", "<Layout ")
            .replace("</FlowcellLayout>", "</Layout>");
        assert!(matches!(RunInfo::parse(&no_layout), Err(QcError::Format { .. })));
    }

    #[test]
    fn test_optional_elements() {
        let xml = r#"<?xml version="1.0"?>
<RunInfo Version="5">
  <Run Id="R1">
    <Reads>
      <Read Number="2" NumCycles="8" IsIndexedRead="Y"/>
      <Read Number="1" NumCycles="151" IsIndexedRead="N"/>
    </Reads>
    <FlowcellLayout LaneCount="1"/>
  </Run>
</RunInfo>"#;
        let info = RunInfo::parse(xml).unwrap();
        assert_eq!(info.number, 0);
        assert_eq!(info.flow_cell, "");
        assert_eq!(info.tiles_per_lane(), 0);
        assert_eq!(info.reads[0].number, 1);
        assert!(info.align_to_phix.is_empty());
        assert!(info.image_channels.is_empty());
        assert_eq!(info.run_mode(), "SR");
    }
}
