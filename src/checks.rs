// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Threshold checks over the run data of a successful run.

use serde_derive::Serialize;
use std::fmt;

use crate::errors::{QcError, Result};
use crate::run_data::RunData;

/// Score given to a value inside the accepted interval.
pub const SCORE_PASS: i32 = 9;
/// Score given to a value outside the accepted interval.
pub const SCORE_FAIL: i32 = 0;
/// Score of a value that could not be evaluated.
pub const SCORE_NOT_EVALUATED: i32 = -1;

/// Closed interval with optional bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Interval {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Interval {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Result<Interval> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(QcError::config(format!(
                    "invalid interval [{}, {}]",
                    lo, hi
                )));
            }
        }
        Ok(Interval { min, max })
    }

    pub fn contains(&self, v: f64) -> bool {
        self.min.map_or(true, |lo| v >= lo) && self.max.map_or(true, |hi| v <= hi)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<f64>| b.map_or_else(|| "*".to_string(), |v| v.to_string());
        write!(f, "[{}, {}]", bound(self.min), bound(self.max))
    }
}

/// Outcome of one check on one read and lane.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub read: usize,
    pub lane: usize,
    pub value: Option<f64>,
    pub score: i32,
    pub message: String,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.score == SCORE_PASS
    }
}

/// A check reads the run data and scores what it finds.
pub trait QcCheck {
    fn name(&self) -> &str;

    /// Collectors whose output the check reads.
    fn required_collectors(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn check(&self, data: &RunData) -> Result<Vec<CheckResult>>;
}

/// Compare `read<R>.lane<L>.<metric>` against an interval for every read and
/// lane of the run.
#[derive(Clone, Debug)]
pub struct LaneThresholdCheck {
    name: String,
    metric: String,
    interval: Interval,
}

impl LaneThresholdCheck {
    pub fn new(name: impl Into<String>, metric: impl Into<String>, interval: Interval) -> Self {
        LaneThresholdCheck {
            name: name.into(),
            metric: metric.into(),
            interval,
        }
    }

    pub fn key(&self, read: usize, lane: usize) -> String {
        format!("read{}.lane{}.{}", read, lane, self.metric)
    }
}

impl QcCheck for LaneThresholdCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_collectors(&self) -> Vec<&'static str> {
        vec![crate::collectors::RUN_INFO]
    }

    fn check(&self, data: &RunData) -> Result<Vec<CheckResult>> {
        let mut results = Vec::new();
        for read in 1..=data.read_count()? {
            for lane in 1..=data.lane_count()? {
                let key = self.key(read, lane);
                let value = if data.contains(&key) {
                    Some(data.get_double(&key)?)
                } else {
                    None
                };

                let (score, message) = match value {
                    None => (SCORE_NOT_EVALUATED, format!("{} is not defined", key)),
                    Some(v) if v.is_nan() => (SCORE_NOT_EVALUATED, format!("{} is NaN", key)),
                    Some(v) if self.interval.contains(v) => (SCORE_PASS, String::new()),
                    Some(v) => (
                        SCORE_FAIL,
                        format!("{} = {} is outside {}", key, v, self.interval),
                    ),
                };
                results.push(CheckResult {
                    check: self.name.clone(),
                    read,
                    lane,
                    value,
                    score,
                    message,
                });
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data() -> RunData {
        let mut data = RunData::new();
        data.put("run.info.flow.cell.lane.count", 2);
        data.put("run.info.read.count", 1);
        data.put("read1.lane1.prc.pf.clusters", 92.5);
        data.put("read1.lane2.prc.pf.clusters", 41.0);
        data
    }

    #[test]
    fn test_interval() {
        let i = Interval::new(Some(80.0), None).unwrap();
        assert!(i.contains(80.0));
        assert!(i.contains(1e9));
        assert!(!i.contains(79.9));
        assert_eq!(i.to_string(), "[80, *]");
        assert!(Interval::new(Some(2.0), Some(1.0)).is_err());
    }

    #[test]
    fn test_lane_threshold() {
        let check = LaneThresholdCheck::new(
            "pf",
            "prc.pf.clusters",
            Interval::new(Some(80.0), Some(100.0)).unwrap(),
        );
        let results = check.check(&data()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].passed());
        assert_eq!(results[0].value, Some(92.5));
        assert_eq!(results[1].score, SCORE_FAIL);
        assert_eq!(
            results[1].message,
            "read1.lane2.prc.pf.clusters = 41 is outside [80, 100]"
        );
    }

    #[test]
    fn test_missing_and_nan() {
        let mut data = data();
        data.put("read1.lane2.prc.pf.clusters", f64::NAN);
        let check = LaneThresholdCheck::new("align", "prc.align", Interval::default());
        let results = check.check(&data).unwrap();
        assert!(results.iter().all(|r| r.score == SCORE_NOT_EVALUATED));

        let check = LaneThresholdCheck::new("pf", "prc.pf.clusters", Interval::default());
        let results = check.check(&data).unwrap();
        assert_eq!(results[1].score, SCORE_NOT_EVALUATED);
        assert!(results[1].value.unwrap().is_nan());
    }
}
