// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `tilemetrics`: cluster counts, densities, phasing and alignment rates.

use log::info;
use std::collections::BTreeMap;

use super::{read_lane_key, InteropSource};
use crate::collectors::Collector;
use crate::context::RunContext;
use crate::errors::Result;
use crate::interop::tile::TileCode;
use crate::interop::{MetricsReader, TileMetrics};
use crate::metric_utils::{percent, Counter, Stat};
use crate::run_data::RunData;

/// Values reported for one tile.
#[derive(Clone, Debug, Default)]
struct TileValues {
    density: Option<f64>,
    density_pf: Option<f64>,
    clusters: Option<f64>,
    clusters_pf: Option<f64>,
    phasing: BTreeMap<usize, f64>,
    prephasing: BTreeMap<usize, f64>,
    aligned: BTreeMap<usize, f64>,
}

/// Summary of one lane.
#[derive(Clone, Debug, Default)]
struct LaneSummary {
    tile_count: usize,
    raw: Counter,
    raw_stat: Stat,
    pf: Counter,
    pf_stat: Stat,
    density: Stat,
    density_pf: Stat,
    phasing: BTreeMap<usize, Stat>,
    prephasing: BTreeMap<usize, Stat>,
    aligned: BTreeMap<usize, Stat>,
}

impl LaneSummary {
    fn new(tiles: &BTreeMap<u16, TileValues>) -> LaneSummary {
        let mut s = LaneSummary {
            tile_count: tiles.len(),
            ..LaneSummary::default()
        };

        for t in tiles.values() {
            if let Some(v) = t.clusters {
                s.raw.add(v.round() as i64);
                s.raw_stat.add(v);
            }
            if let Some(v) = t.clusters_pf {
                s.pf.add(v.round() as i64);
                s.pf_stat.add(v);
            }
            if let Some(v) = t.density {
                s.density.add(v);
            }
            if let Some(v) = t.density_pf {
                s.density_pf.add(v);
            }
            for (read, v) in &t.phasing {
                s.phasing.entry(*read).or_default().add(*v);
            }
            for (read, v) in &t.prephasing {
                s.prephasing.entry(*read).or_default().add(*v);
            }
            for (read, v) in &t.aligned {
                // Tiles not aligned yet report NaN.
                if v.is_finite() {
                    s.aligned.entry(*read).or_default().add(*v);
                }
            }
        }
        s
    }

    fn write(&self, read: usize, lane: usize, data: &mut RunData) {
        let key = |m: &str| read_lane_key(read, lane, m);
        let mean_or_zero = |s: &Stat| if s.is_empty() { 0.0 } else { s.mean() };

        data.put(key("tile.count"), self.tile_count);
        data.put(key("clusters.raw"), self.raw.sum);
        data.put(key("clusters.raw.sd"), self.raw_stat.sd());
        data.put(key("clusters.pf"), self.pf.sum);
        data.put(key("clusters.pf.sd"), self.pf_stat.sd());
        data.put(key("prc.pf.clusters"), percent(self.pf.sum, self.raw.sum));
        data.put(key("cluster.density"), mean_or_zero(&self.density));
        data.put(key("cluster.density.pf"), mean_or_zero(&self.density_pf));

        if let Some(s) = self.phasing.get(&read) {
            data.put(key("phasing"), s.mean());
        }
        if let Some(s) = self.prephasing.get(&read) {
            data.put(key("prephasing"), s.mean());
        }
        if let Some(s) = self.aligned.get(&read) {
            data.put(key("prc.align"), s.mean());
            data.put(key("prc.align.sd"), s.sd());
        }
    }
}

#[derive(Default)]
pub struct TileMetricsCollector {
    source: InteropSource,
}

impl Collector for TileMetricsCollector {
    fn name(&self) -> &'static str {
        crate::collectors::TILE_METRICS
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![crate::collectors::RUN_INFO]
    }

    fn configure(&mut self, ctx: &RunContext) -> Result<()> {
        self.source.configure(ctx);
        Ok(())
    }

    fn collect(&mut self, data: &mut RunData) -> Result<()> {
        let lane_count = data.lane_count()?;
        let read_count = data.read_count()?;

        let reader = MetricsReader::open(&self.source.dir, TileMetrics)?;
        info!(
            "reading {} tile metrics from {}",
            reader.record_count().unwrap_or(0),
            reader.path().display()
        );

        let mut lanes: BTreeMap<u16, BTreeMap<u16, TileValues>> = BTreeMap::new();
        for record in reader {
            let record = record?;
            let tile = lanes
                .entry(record.lane)
                .or_default()
                .entry(record.tile)
                .or_default();
            let v = f64::from(record.value);
            match record.kind() {
                TileCode::ClusterDensity => tile.density = Some(v),
                TileCode::ClusterDensityPf => tile.density_pf = Some(v),
                TileCode::ClusterCount => tile.clusters = Some(v),
                TileCode::ClusterCountPf => tile.clusters_pf = Some(v),
                TileCode::Phasing(read) => {
                    tile.phasing.insert(read, v);
                }
                TileCode::Prephasing(read) => {
                    tile.prephasing.insert(read, v);
                }
                TileCode::Aligned(read) => {
                    tile.aligned.insert(read, v);
                }
                TileCode::Other(_) => (),
            }
        }

        let empty = BTreeMap::new();
        for lane in 1..=lane_count {
            let tiles = lanes.get(&(lane as u16)).unwrap_or(&empty);
            let summary = LaneSummary::new(tiles);
            for read in 1..=read_count {
                summary.write(read, lane, data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::layout;
    use super::*;
    use crate::interop::testutil::{tile_file, write};
    use crate::interop::MetricFamily;
    use crate::interop::tile::{CODE_CLUSTER_COUNT, CODE_CLUSTER_COUNT_PF, CODE_CLUSTER_DENSITY};
    use pretty_assertions::assert_eq;

    fn collect(records: &[(u16, u16, u16, f32)], data: &mut RunData) -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), TileMetrics::FILE_NAME, &tile_file(records));
        let mut c = TileMetricsCollector {
            source: InteropSource {
                dir: dir.path().to_path_buf(),
            },
        };
        c.collect(data)
    }

    #[test]
    fn test_cluster_counts() {
        let mut data = layout(1, &[(76, false)]);
        collect(
            &[
                (1, 1101, CODE_CLUSTER_COUNT, 100.0),
                (1, 1102, CODE_CLUSTER_COUNT, 150.0),
                (1, 1103, CODE_CLUSTER_COUNT, 200.0),
            ],
            &mut data,
        )
        .unwrap();

        assert_eq!(data.get_int("read1.lane1.tile.count").unwrap(), 3);
        assert_eq!(data.get_long("read1.lane1.clusters.raw").unwrap(), 450);
        assert_eq!(data.get_double("read1.lane1.clusters.raw.sd").unwrap(), 50.0);
        assert_eq!(data.get_long("read1.lane1.clusters.pf").unwrap(), 0);
    }

    #[test]
    fn test_full_lane() {
        let mut data = layout(2, &[(76, false), (8, true), (76, false)]);
        let mut records = Vec::new();
        for (tile, raw, pf) in &[(1101u16, 1000.0f32, 800.0f32), (1102, 1200.0, 1000.0)] {
            records.push((1, *tile, CODE_CLUSTER_COUNT, *raw));
            records.push((1, *tile, CODE_CLUSTER_COUNT_PF, *pf));
            records.push((1, *tile, CODE_CLUSTER_DENSITY, 150.0));
            records.push((1, *tile, 200, 0.1));
            records.push((1, *tile, 201, 0.05));
            records.push((1, *tile, 204, 0.2));
            records.push((1, *tile, 300, 1.0));
            records.push((1, *tile, 302, 3.0));
        }
        collect(&records, &mut data).unwrap();

        assert_eq!(data.get_long("read1.lane1.clusters.raw").unwrap(), 2200);
        assert_eq!(data.get_long("read3.lane1.clusters.pf").unwrap(), 1800);
        let prc = data.get_double("read1.lane1.prc.pf.clusters").unwrap();
        assert!((prc - 100.0 * 1800.0 / 2200.0).abs() < 1e-9);
        assert_eq!(data.get_double("read1.lane1.cluster.density").unwrap(), 150.0);
        assert!((data.get_double("read1.lane1.phasing").unwrap() - 0.1).abs() < 1e-6);
        assert!((data.get_double("read1.lane1.prephasing").unwrap() - 0.05).abs() < 1e-6);
        assert!((data.get_double("read3.lane1.phasing").unwrap() - 0.2).abs() < 1e-6);
        assert!(!data.contains("read2.lane1.phasing"));
        assert_eq!(data.get_double("read3.lane1.prc.align").unwrap(), 3.0);
        assert_eq!(data.get_double("read3.lane1.prc.align.sd").unwrap(), 0.0);

        // Lane 2 has no records.
        assert_eq!(data.get_int("read1.lane2.tile.count").unwrap(), 0);
        assert_eq!(data.get_long("read1.lane2.clusters.raw").unwrap(), 0);
        assert!(data.get_double("read1.lane2.prc.pf.clusters").unwrap().is_nan());
        assert!(!data.contains("read1.lane2.prc.align"));
    }

    #[test]
    fn test_collect_twice_gives_same_text() {
        let dir = tempfile::tempdir().unwrap();
        let records = [
            (1, 1101, CODE_CLUSTER_COUNT, 1000.0),
            (1, 1101, CODE_CLUSTER_COUNT_PF, 800.0),
            (1, 1101, 200, 0.1),
            (2, 1101, CODE_CLUSTER_COUNT, 900.0),
        ];
        write(dir.path(), TileMetrics::FILE_NAME, &tile_file(&records));

        let collect_fresh = || {
            let mut data = layout(2, &[(76, false), (8, true)]);
            let mut c = TileMetricsCollector {
                source: InteropSource {
                    dir: dir.path().to_path_buf(),
                },
            };
            c.collect(&mut data).unwrap();
            data.to_text()
        };

        let first = collect_fresh();
        assert!(first.contains("read1.lane1.clusters.raw"));
        assert_eq!(first, collect_fresh());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = TileMetricsCollector {
            source: InteropSource {
                dir: dir.path().to_path_buf(),
            },
        };
        let mut data = layout(1, &[(76, false)]);
        assert!(matches!(
            c.collect(&mut data),
            Err(crate::errors::QcError::File { .. })
        ));
    }
}
