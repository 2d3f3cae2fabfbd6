// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Error types shared by every stage of a QC run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, QcError>;

/// Boxed cause carried by a failed per-sample task.
pub type TaskCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum QcError {
    /// A binary metric file is malformed or has an unexpected version.
    #[error("{family}: {reason}")]
    Format { family: String, reason: String },

    /// An input file is missing or cannot be read.
    #[error("cannot read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Bad options, unknown or missing collectors, dependency cycles.
    #[error("configuration error: {0}")]
    Config(String),

    /// A run data value was requested with a type it cannot be coerced to.
    #[error("run data key '{key}' holds '{found}', which is not a valid {expected}")]
    Type {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("run data key '{0}' is not defined")]
    MissingKey(String),

    /// A per-sample task failed; the engine aborted the remaining work.
    #[error("processing of {item} failed")]
    Task {
        item: String,
        #[source]
        source: TaskCause,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl QcError {
    pub(crate) fn format(family: &str, reason: impl Into<String>) -> QcError {
        QcError::Format {
            family: family.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> QcError {
        QcError::File {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> QcError {
        QcError::Config(msg.into())
    }
}
