// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Accumulators shared by the metric collectors.

use std::collections::BTreeMap;

/// Compute `100 * matched / total`. A zero total gives `NaN` rather than an
/// error, so that "no data" stays distinguishable from "0%".
#[inline]
pub fn percent(matched: i64, total: i64) -> f64 {
    if total == 0 {
        f64::NAN
    } else {
        100.0 * matched as f64 / total as f64
    }
}

/// Running count / sum / min / max / standard deviation over floating point
/// observations.
#[derive(Clone, Debug, Default)]
pub struct Stat {
    count: usize,
    sum: f64,
    sum_sq: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Stat {
    pub fn new() -> Stat {
        Stat::default()
    }

    pub fn add(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// `NaN` when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    /// Sample standard deviation; 0 with fewer than two observations.
    pub fn sd(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let var = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        var.max(0.0).sqrt()
    }

    pub fn merge(&mut self, other: &Stat) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Exact integer accumulation, for cluster and read counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counter {
    pub count: usize,
    pub sum: i64,
}

impl Counter {
    pub fn add(&mut self, v: i64) {
        self.count += 1;
        self.sum += v;
    }
}

/// A `Stat` per key, iterated in key order.
#[derive(Clone, Debug)]
pub struct GroupedStats<K: Ord> {
    groups: BTreeMap<K, Stat>,
}

impl<K: Ord> Default for GroupedStats<K> {
    fn default() -> Self {
        GroupedStats {
            groups: BTreeMap::new(),
        }
    }
}

impl<K: Ord> GroupedStats<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K, v: f64) {
        self.groups.entry(key).or_default().add(v);
    }

    pub fn get(&self, key: &K) -> Option<&Stat> {
        self.groups.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Stat)> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Summarise the per-key means, e.g. per-tile values into a lane value.
    pub fn stat_of_means(&self) -> Stat {
        let mut s = Stat::new();
        for stat in self.groups.values() {
            s.add(stat.mean());
        }
        s
    }
}
