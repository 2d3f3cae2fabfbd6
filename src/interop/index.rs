// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! `IndexMetricsOut.bin`: clusters identified per index sequence, with the
//! sample and project each index belongs to. Records have variable length.

use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use super::{ensure_remaining, get_string, MetricFamily, RecordLayout};
use crate::errors::Result;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexMetric {
    pub lane: u16,
    pub tile: u16,
    pub read: u16,
    pub index: String,
    pub cluster_count: u32,
    pub sample: String,
    pub project: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IndexMetrics;

impl MetricFamily for IndexMetrics {
    type Record = IndexMetric;

    const NAME: &'static str = "IndexMetricsOut";
    const FILE_NAME: &'static str = "IndexMetricsOut.bin";
    const VERSION: u8 = 1;
    const LAYOUT: RecordLayout = RecordLayout::Variable;

    fn decode(&self, buf: &mut Bytes) -> Result<IndexMetric> {
        ensure_remaining(buf, 6, Self::NAME)?;
        let lane = buf.get_u16_le();
        let tile = buf.get_u16_le();
        let read = buf.get_u16_le();
        let index = get_string(buf, Self::NAME)?;
        ensure_remaining(buf, 4, Self::NAME)?;
        let cluster_count = buf.get_u32_le();
        let sample = get_string(buf, Self::NAME)?;
        let project = get_string(buf, Self::NAME)?;
        Ok(IndexMetric {
            lane,
            tile,
            read,
            index,
            cluster_count,
            sample,
            project,
        })
    }
}

impl From<IndexMetric> for super::MetricRecord {
    fn from(r: IndexMetric) -> Self {
        super::MetricRecord::Index(r)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::index_file;
    use super::super::MetricsReader;
    use super::*;
    use crate::errors::QcError;

    #[test]
    fn test_variable_records() {
        let dir = tempfile::tempdir().unwrap();
        let content = index_file(&[
            (1, 1101, 2, "ACGTACGT", 1000, "S1", "P1"),
            (1, 1102, 2, "TTGGCCAA-AACC", 250, "Sample_2", "Project"),
        ]);
        std::fs::write(dir.path().join(IndexMetrics::FILE_NAME), content).unwrap();

        let reader = MetricsReader::open(dir.path(), IndexMetrics).unwrap();
        assert_eq!(reader.header_size(), 1);
        assert_eq!(reader.record_count(), None);

        let records: Vec<_> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].index, "TTGGCCAA-AACC");
        assert_eq!(records[1].cluster_count, 250);
        assert_eq!(records[1].sample, "Sample_2");
        assert_eq!(records[0].project, "P1");
    }

    #[test]
    fn test_truncated_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = index_file(&[(1, 1101, 2, "ACGT", 10, "S1", "P1")]);
        content.truncate(content.len() - 1);
        std::fs::write(dir.path().join(IndexMetrics::FILE_NAME), content).unwrap();

        let mut reader = MetricsReader::open(dir.path(), IndexMetrics).unwrap();
        assert!(matches!(reader.next(), Some(Err(QcError::Format { .. }))));
        assert!(reader.next().is_none());
    }
}
