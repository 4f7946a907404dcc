// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("instance metadata unavailable ({field}): {reason}")]
    MetadataUnavailable { field: &'static str, reason: String },

    #[error("object not found: {path}")]
    ObjectNotFound { path: String },

    #[error("object store unavailable for {path}: {reason}")]
    ObjectStoreUnavailable { path: String, reason: String },

    #[error("could not fetch configuration file {path}: {source}")]
    ConfigFetch {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("could not parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("{operation} did not succeed within {}s, last error: {last_error}", .waited.as_secs())]
    TimeoutExceeded {
        operation: String,
        waited: Duration,
        last_error: String,
    },

    #[error("failed to exec {}: {source}", .binary.display())]
    ExecFailure {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
