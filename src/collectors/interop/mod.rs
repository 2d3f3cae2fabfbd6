// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Collectors summarising the InterOp metric files per read and lane.
//!
//! Every collector writes its values for every lane of the run; lanes
//! without a single record get zero counts so that downstream checks can
//! tell "no data" apart from "not collected".

mod error_rate;
mod extraction;
mod index;
mod quality;
mod tile;

pub use error_rate::ErrorMetricsCollector;
pub use extraction::ExtractionMetricsCollector;
pub use index::IndexMetricsCollector;
pub use quality::QualityMetricsCollector;
pub use tile::TileMetricsCollector;

use std::path::PathBuf;

use crate::context::RunContext;

/// Key of a per read and lane value.
pub(crate) fn read_lane_key(read: usize, lane: usize, metric: &str) -> String {
    format!("read{}.lane{}.{}", read, lane, metric)
}

/// Where a collector finds its metric file.
#[derive(Clone, Debug, Default)]
pub(crate) struct InteropSource {
    pub dir: PathBuf,
}

impl InteropSource {
    pub fn configure(&mut self, ctx: &RunContext) {
        self.dir = ctx.interop_dir();
    }
}
