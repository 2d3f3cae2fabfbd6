// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `TileMetricsOut.bin`: per-tile cluster densities, counts, phasing and
//! alignment rates, one coded value per record.

use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use super::{ensure_remaining, MetricFamily, RecordLayout};
use crate::errors::Result;

pub const CODE_CLUSTER_DENSITY: u16 = 100;
pub const CODE_CLUSTER_DENSITY_PF: u16 = 101;
pub const CODE_CLUSTER_COUNT: u16 = 102;
pub const CODE_CLUSTER_COUNT_PF: u16 = 103;

/// What a tile metric code measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileCode {
    ClusterDensity,
    ClusterDensityPf,
    ClusterCount,
    ClusterCountPf,
    /// Phasing of read `n` (1-based).
    Phasing(usize),
    Prephasing(usize),
    /// Percentage of clusters aligned to the control genome in read `n`.
    Aligned(usize),
    Other(u16),
}

impl TileCode {
    pub fn from_code(code: u16) -> TileCode {
        match code {
            CODE_CLUSTER_DENSITY => TileCode::ClusterDensity,
            CODE_CLUSTER_DENSITY_PF => TileCode::ClusterDensityPf,
            CODE_CLUSTER_COUNT => TileCode::ClusterCount,
            CODE_CLUSTER_COUNT_PF => TileCode::ClusterCountPf,
            200..=299 if code % 2 == 0 => TileCode::Phasing(((code - 200) / 2 + 1) as usize),
            200..=299 => TileCode::Prephasing(((code - 201) / 2 + 1) as usize),
            300..=399 => TileCode::Aligned((code - 300 + 1) as usize),
            _ => TileCode::Other(code),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TileMetric {
    pub lane: u16,
    pub tile: u16,
    pub code: u16,
    pub value: f32,
}

impl TileMetric {
    pub fn kind(&self) -> TileCode {
        TileCode::from_code(self.code)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TileMetrics;

impl MetricFamily for TileMetrics {
    type Record = TileMetric;

    const NAME: &'static str = "TileMetricsOut";
    const FILE_NAME: &'static str = "TileMetricsOut.bin";
    const VERSION: u8 = 2;
    const LAYOUT: RecordLayout = RecordLayout::Fixed(10);

    fn decode(&self, buf: &mut Bytes) -> Result<TileMetric> {
        ensure_remaining(buf, 10, Self::NAME)?;
        Ok(TileMetric {
            lane: buf.get_u16_le(),
            tile: buf.get_u16_le(),
            code: buf.get_u16_le(),
            value: buf.get_f32_le(),
        })
    }
}

impl From<TileMetric> for super::MetricRecord {
    fn from(r: TileMetric) -> Self {
        super::MetricRecord::Tile(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(TileCode::from_code(100), TileCode::ClusterDensity);
        assert_eq!(TileCode::from_code(103), TileCode::ClusterCountPf);
        assert_eq!(TileCode::from_code(200), TileCode::Phasing(1));
        assert_eq!(TileCode::from_code(201), TileCode::Prephasing(1));
        assert_eq!(TileCode::from_code(206), TileCode::Phasing(4));
        assert_eq!(TileCode::from_code(207), TileCode::Prephasing(4));
        assert_eq!(TileCode::from_code(300), TileCode::Aligned(1));
        assert_eq!(TileCode::from_code(302), TileCode::Aligned(3));
        assert_eq!(TileCode::from_code(400), TileCode::Other(400));
    }

    #[test]
    fn test_decode() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&2114u16.to_le_bytes());
        raw.extend_from_slice(&101u16.to_le_bytes());
        raw.extend_from_slice(&1234.5f32.to_le_bytes());

        let r = TileMetrics.decode(&mut Bytes::from(raw)).unwrap();
        assert_eq!(r, TileMetric { lane: 3, tile: 2114, code: 101, value: 1234.5 });
        assert_eq!(r.kind(), TileCode::ClusterDensityPf);
    }
}
