// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! The list of known collectors, and ordering them by their dependencies.

use itertools::Itertools;
use std::collections::HashSet;

use super::fastq::{FastqCollector, FastqScreenFactory, PartialFastqFactory, QualityModuleFactory};
use super::interop::{
    ErrorMetricsCollector, ExtractionMetricsCollector, IndexMetricsCollector,
    QualityMetricsCollector, TileMetricsCollector,
};
use super::{demux, design, qc_info, run_info, Collector};
use crate::errors::{QcError, Result};

pub type CollectorFactory = fn() -> Box<dyn Collector>;

/// Named collector factories, in registration order.
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    entries: Vec<(&'static str, CollectorFactory)>,
}

impl CollectorRegistry {
    pub fn new() -> CollectorRegistry {
        CollectorRegistry::default()
    }

    /// Every collector of the crate.
    pub fn builtin() -> Result<CollectorRegistry> {
        let mut r = CollectorRegistry::new();
        r.register(super::RUN_INFO, || Box::new(run_info::RunInfoCollector::default()))?;
        r.register(super::DESIGN, || Box::new(design::DesignCollector::default()))?;
        r.register(super::DEMUX, || Box::new(demux::DemuxCollector::default()))?;
        r.register(super::QC_INFO, || Box::new(qc_info::QcInfoCollector::default()))?;
        r.register(super::TILE_METRICS, || Box::new(TileMetricsCollector::default()))?;
        r.register(super::ERROR_METRICS, || Box::new(ErrorMetricsCollector::default()))?;
        r.register(super::EXTRACTION_METRICS, || {
            Box::new(ExtractionMetricsCollector::default())
        })?;
        r.register(super::QUALITY_METRICS, || {
            Box::new(QualityMetricsCollector::default())
        })?;
        r.register(super::INDEX_METRICS, || Box::new(IndexMetricsCollector::default()))?;
        r.register(super::PARTIAL_FASTQ, || {
            Box::new(FastqCollector::new(PartialFastqFactory::default()))
        })?;
        r.register(super::FASTQ_SCREEN, || {
            Box::new(FastqCollector::new(FastqScreenFactory::default()))
        })?;
        r.register(super::QUALITY_MODULE, || {
            Box::new(FastqCollector::new(QualityModuleFactory::default()))
        })?;
        Ok(r)
    }

    pub fn register(&mut self, name: &'static str, factory: CollectorFactory) -> Result<()> {
        if self.contains(name) {
            return Err(QcError::config(format!(
                "collector '{}' is registered twice",
                name
            )));
        }
        self.entries.push((name, factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Collector>> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, factory)| factory())
            .ok_or_else(|| {
                QcError::config(format!(
                    "unknown collector '{}', known collectors: {}",
                    name,
                    self.names().join(", ")
                ))
            })
    }

    /// Instantiate the collectors called `names`, in registration order; all
    /// of them when `names` is empty.
    pub fn create_selected(&self, names: &[String]) -> Result<Vec<Box<dyn Collector>>> {
        if names.is_empty() {
            return Ok(self.entries.iter().map(|(_, f)| f()).collect());
        }

        for name in names {
            if !self.contains(name) {
                // Reports the unknown name.
                self.create(name)?;
            }
        }
        Ok(self
            .entries
            .iter()
            .filter(|(n, _)| names.iter().any(|s| s == n))
            .map(|(_, f)| f())
            .collect())
    }
}

/// Order `collectors` so that each comes after everything it requires.
/// Among collectors whose requirements are met, the earliest in the input
/// goes first, so the result is deterministic.
///
/// A requirement that is not in `collectors`, or a dependency cycle, is a
/// configuration error; no partial order is ever returned.
pub fn resolve_order(collectors: Vec<Box<dyn Collector>>) -> Result<Vec<Box<dyn Collector>>> {
    let names: Vec<&'static str> = collectors.iter().map(|c| c.name()).collect();
    let mut seen = HashSet::new();
    if let Some(dup) = names.iter().find(|n| !seen.insert(**n)) {
        return Err(QcError::config(format!("collector '{}' is listed twice", dup)));
    }

    let requirements: Vec<Vec<&'static str>> =
        collectors.iter().map(|c| c.required_collectors()).collect();

    for (name, required) in names.iter().zip(&requirements) {
        let missing: Vec<_> = required.iter().filter(|r| !names.contains(*r)).collect();
        if !missing.is_empty() {
            return Err(QcError::config(format!(
                "collector '{}' requires {} which is not enabled",
                name,
                missing.iter().map(|m| format!("'{}'", m)).join(", ")
            )));
        }
    }

    let mut placed: HashSet<&'static str> = HashSet::new();
    let mut order: Vec<usize> = Vec::with_capacity(names.len());
    while order.len() < names.len() {
        let next = (0..names.len()).find(|&i| {
            !placed.contains(names[i]) && requirements[i].iter().all(|r| placed.contains(r))
        });
        match next {
            Some(i) => {
                placed.insert(names[i]);
                order.push(i);
            }
            None => {
                let stuck = names
                    .iter()
                    .filter(|n| !placed.contains(*n))
                    .map(|n| format!("'{}'", n))
                    .join(", ");
                return Err(QcError::config(format!(
                    "dependency cycle between collectors {}",
                    stuck
                )));
            }
        }
    }

    let mut slots: Vec<Option<Box<dyn Collector>>> = collectors.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::run_data::RunData;
    use proptest::prelude::*;

    struct Named {
        name: &'static str,
        deps: Vec<&'static str>,
    }

    impl Collector for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn required_collectors(&self) -> Vec<&'static str> {
            self.deps.clone()
        }

        fn configure(&mut self, _ctx: &RunContext) -> Result<()> {
            Ok(())
        }

        fn collect(&mut self, _data: &mut RunData) -> Result<()> {
            Ok(())
        }
    }

    fn named(name: &'static str, deps: &[&'static str]) -> Box<dyn Collector> {
        Box::new(Named {
            name,
            deps: deps.to_vec(),
        })
    }

    fn order_of(collectors: Vec<Box<dyn Collector>>) -> Result<Vec<&'static str>> {
        Ok(resolve_order(collectors)?.iter().map(|c| c.name()).collect())
    }

    #[test]
    fn test_stable_order() {
        let order = order_of(vec![
            named("index", &["tile", "runinfo"]),
            named("tile", &["runinfo"]),
            named("design", &[]),
            named("runinfo", &[]),
        ])
        .unwrap();
        assert_eq!(order, vec!["design", "runinfo", "tile", "index"]);
    }

    #[test]
    fn test_cycle() {
        let err = order_of(vec![named("a", &["b"]), named("b", &["a"])]).unwrap_err();
        match err {
            QcError::Config(msg) => {
                assert!(msg.contains("'a'"));
                assert!(msg.contains("'b'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let err = order_of(vec![named("indexmetrics", &["tilemetrics"])]).unwrap_err();
        match err {
            QcError::Config(msg) => assert!(msg.contains("tilemetrics")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_registration() {
        let mut r = CollectorRegistry::new();
        r.register("a", || named("a", &[])).unwrap();
        assert!(matches!(
            r.register("a", || named("a", &[])),
            Err(QcError::Config(_))
        ));
    }

    #[test]
    fn test_builtin_registry_resolves() {
        let registry = CollectorRegistry::builtin().unwrap();
        let order = order_of(registry.create_selected(&[]).unwrap()).unwrap();
        assert_eq!(order.len(), registry.names().len());
        assert_eq!(order[0], crate::collectors::RUN_INFO);

        let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();
        assert!(pos("tilemetrics") < pos("indexmetrics"));
        assert!(pos("tmppartialfastq") < pos("fastqscreen"));
        assert!(pos("demux") < pos("tmppartialfastq"));

        assert!(matches!(
            registry.create_selected(&["nope".to_string()]),
            Err(QcError::Config(_))
        ));
    }

    const NAMES: [&str; 6] = ["c0", "c1", "c2", "c3", "c4", "c5"];

    proptest! {
        // Dependencies only point at earlier names, so every graph is acyclic.
        #[test]
        fn prop_order_respects_dependencies(
            edges in proptest::collection::vec((0usize..6, 0usize..6), 0..15),
            rotation in 0usize..6,
        ) {
            let mut deps: Vec<Vec<&'static str>> = vec![Vec::new(); 6];
            for (a, b) in edges {
                if b < a && !deps[a].contains(&NAMES[b]) {
                    deps[a].push(NAMES[b]);
                }
            }

            let mut input: Vec<usize> = (0..6).collect();
            input.rotate_left(rotation);
            let collectors = input.iter().map(|&i| named(NAMES[i], &deps[i])).collect();

            let order = order_of(collectors).unwrap();
            prop_assert_eq!(order.len(), 6);
            for (i, d) in deps.iter().enumerate() {
                let pos = order.iter().position(|n| *n == NAMES[i]).unwrap();
                for dep in d {
                    let dep_pos = order.iter().position(|n| n == dep).unwrap();
                    prop_assert!(dep_pos < pos);
                }
            }
        }
    }
}
