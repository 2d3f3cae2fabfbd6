// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! The run data store: every fact collected about a run, keyed by dotted
//! hierarchical names such as `read1.lane3.clusters.pf`.
//!
//! The store is written by one thread at a time. Collectors run one after the
//! other and per-sample tasks fill private `RunData` maps that are merged by
//! the orchestrating thread, so no locking is needed here.

use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::errors::{QcError, Result};
use crate::utils::create_buffered;

/// A scalar stored in `RunData`.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Bool(v) => write!(f, "{}", v),
            DataValue::Int(v) => write!(f, "{}", v),
            DataValue::Long(v) => write!(f, "{}", v),
            DataValue::Double(v) => write!(f, "{}", v),
            DataValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Long(v)
    }
}

impl From<u32> for DataValue {
    fn from(v: u32) -> Self {
        DataValue::Long(i64::from(v))
    }
}

impl From<usize> for DataValue {
    fn from(v: usize) -> Self {
        DataValue::Long(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Double(v)
    }
}

impl From<f32> for DataValue {
    fn from(v: f32) -> Self {
        DataValue::Double(f64::from(v))
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Text(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Text(v.to_string())
    }
}

/// Insertion-ordered key/value store for one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunData {
    map: IndexMap<String, DataValue>,
}

impl RunData {
    pub fn new() -> RunData {
        RunData::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Set `key` to `value`, returning the previous value if there was one.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Option<DataValue> {
        self.map.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, key: &str) -> Result<&DataValue> {
        self.map
            .get(key)
            .ok_or_else(|| QcError::MissingKey(key.to_string()))
    }

    fn type_error(key: &str, expected: &'static str, value: &DataValue) -> QcError {
        QcError::Type {
            key: key.to_string(),
            expected,
            found: value.to_string(),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i32> {
        let value = self.require(key)?;
        match value {
            DataValue::Int(v) => Ok(*v),
            DataValue::Long(v) => i32::try_from(*v).map_err(|_| Self::type_error(key, "int", value)),
            DataValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::type_error(key, "int", value)),
            _ => Err(Self::type_error(key, "int", value)),
        }
    }

    pub fn get_long(&self, key: &str) -> Result<i64> {
        let value = self.require(key)?;
        match value {
            DataValue::Int(v) => Ok(i64::from(*v)),
            DataValue::Long(v) => Ok(*v),
            DataValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::type_error(key, "long", value)),
            _ => Err(Self::type_error(key, "long", value)),
        }
    }

    /// Numeric values widen to `f64`. The text forms `NaN` and `NA` read back
    /// as `f64::NAN`.
    pub fn get_double(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        match value {
            DataValue::Int(v) => Ok(f64::from(*v)),
            DataValue::Long(v) => Ok(*v as f64),
            DataValue::Double(v) => Ok(*v),
            DataValue::Text(s) => match s.trim() {
                "NA" => Ok(f64::NAN),
                t => t.parse().map_err(|_| Self::type_error(key, "double", value)),
            },
            DataValue::Bool(_) => Err(Self::type_error(key, "double", value)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.require(key)?;
        match value {
            DataValue::Bool(v) => Ok(*v),
            DataValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
            DataValue::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(Self::type_error(key, "boolean", value)),
        }
    }

    /// Any value can be read as a string.
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.require(key).map(|v| v.to_string())
    }

    /// Move every entry of `other` into this store. Replacing an existing key
    /// with a different value is reported, since distinct producers are
    /// expected to write disjoint keys.
    pub fn merge(&mut self, other: RunData) {
        for (key, value) in other.map {
            if let Some(previous) = self.map.insert(key.clone(), value) {
                if self.map.get(&key) != Some(&previous) {
                    warn!("run data key '{}' overwritten (was '{}')", key, previous);
                }
            }
        }
    }

    /// All keys starting with `prefix`, in insertion order.
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.map
            .keys()
            .filter(move |k| k.starts_with(prefix))
            .map(|k| k.as_str())
    }

    //
    // Run layout helpers
    //

    pub fn lane_count(&self) -> Result<usize> {
        Ok(self.get_int("run.info.flow.cell.lane.count")?.max(0) as usize)
    }

    pub fn read_count(&self) -> Result<usize> {
        Ok(self.get_int("run.info.read.count")?.max(0) as usize)
    }

    pub fn is_read_indexed(&self, read: usize) -> Result<bool> {
        self.get_bool(&format!("run.info.read{}.indexed", read))
    }

    pub fn read_cycles(&self, read: usize) -> Result<usize> {
        Ok(self.get_int(&format!("run.info.read{}.cycles", read))?.max(0) as usize)
    }

    /// Sample names of a lane in sample sheet order. A lane absent from the
    /// sample sheet has no samples.
    pub fn sample_names(&self, lane: usize) -> Vec<String> {
        match self.get(&format!("design.lane{}.samples.names", lane)) {
            Some(v) => v
                .to_string()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => Vec::new(),
        }
    }

    //
    // Text form
    //

    /// Write one `key=value` line per entry.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        for (key, value) in &self.map {
            writeln!(writer, "{}={}", key, value)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to(create_buffered(path)?)
    }

    pub fn to_text(&self) -> String {
        self.map
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .join("")
    }

    /// Parse the `key=value` form. Values are kept as text and coerced by the
    /// typed accessors. Blank lines and `#` comments are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<RunData> {
        let mut data = RunData::new();
        for (n, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    data.put(key.trim(), value);
                }
                None => {
                    return Err(QcError::config(format!(
                        "run data line {} has no '=' separator: {}",
                        n + 1,
                        line
                    )))
                }
            }
        }
        Ok(data)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<RunData> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| QcError::file(path, e))?;
        RunData::from_reader(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::{prop_assert_eq, proptest};

    #[test]
    fn test_typed_accessors() {
        let mut data = RunData::new();
        data.put("run.info.read.count", 3);
        data.put("read1.lane1.clusters.raw", 450i64);
        data.put("read1.lane1.prc.align", 0.5);
        data.put("run.info.read2.indexed", true);
        data.put("run.info.run.id", "180101_NB500892_0001_AHXXXX");

        assert_eq!(data.get_int("run.info.read.count").unwrap(), 3);
        assert_eq!(data.get_long("read1.lane1.clusters.raw").unwrap(), 450);
        assert_eq!(data.get_double("read1.lane1.clusters.raw").unwrap(), 450.0);
        assert_eq!(data.get_double("read1.lane1.prc.align").unwrap(), 0.5);
        assert!(data.get_bool("run.info.read2.indexed").unwrap());
        assert_eq!(
            data.get_string("run.info.run.id").unwrap(),
            "180101_NB500892_0001_AHXXXX"
        );
    }

    #[test]
    fn test_type_errors() {
        let mut data = RunData::new();
        data.put("a", "not a number");
        data.put("b", 1.5);
        data.put("c", 5_000_000_000i64);

        assert!(matches!(data.get_int("a"), Err(QcError::Type { .. })));
        assert!(matches!(data.get_int("b"), Err(QcError::Type { .. })));
        assert!(matches!(data.get_int("c"), Err(QcError::Type { .. })));
        assert!(matches!(data.get_bool("b"), Err(QcError::Type { .. })));
        assert!(matches!(data.get_long("missing"), Err(QcError::MissingKey(_))));
        assert_eq!(data.get_long("c").unwrap(), 5_000_000_000);
    }

    #[test]
    fn test_nan_text_forms() {
        let mut data = RunData::new();
        data.put("x", f64::NAN);
        data.put("y", "NA");
        let reloaded = RunData::from_reader(data.to_text().as_bytes()).unwrap();
        assert!(reloaded.get_double("x").unwrap().is_nan());
        assert!(reloaded.get_double("y").unwrap().is_nan());
    }

    #[test]
    fn test_text_form_keeps_order() {
        let mut data = RunData::new();
        data.put("z.first", 1);
        data.put("a.second", true);
        data.put("m.third", "x=y");
        assert_eq!(data.to_text(), "z.first=1\na.second=true\nm.third=x=y\n");

        let reloaded = RunData::from_reader(data.to_text().as_bytes()).unwrap();
        let keys: Vec<_> = reloaded.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["z.first", "a.second", "m.third"]);
        assert_eq!(reloaded.get_string("m.third").unwrap(), "x=y");
        assert!(reloaded.get_bool("a.second").unwrap());
    }

    #[test]
    fn test_bad_line() {
        let r = RunData::from_reader("good=1\nbad line\n".as_bytes());
        assert!(matches!(r, Err(QcError::Config(_))));
    }

    #[test]
    fn test_merge_and_layout_helpers() {
        let mut data = RunData::new();
        data.put("run.info.flow.cell.lane.count", 2);
        data.put("design.lane1.samples.names", "S1, S2,");

        let mut part = RunData::new();
        part.put("run.info.read.count", 1);
        data.merge(part);

        assert_eq!(data.lane_count().unwrap(), 2);
        assert_eq!(data.read_count().unwrap(), 1);
        assert_eq!(data.sample_names(1), vec!["S1", "S2"]);
        assert!(data.sample_names(2).is_empty());
        assert_eq!(data.keys_with_prefix("run.info").count(), 2);
    }

    proptest! {
        #[test]
        fn prop_long_survives_text_form(v in proptest::num::i64::ANY) {
            let mut data = RunData::new();
            data.put("k", v);
            let reloaded = RunData::from_reader(data.to_text().as_bytes()).unwrap();
            prop_assert_eq!(reloaded.get_long("k").unwrap(), v);
        }
    }
}
