// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use crate::store::{ObjectLocator, ObjectStore};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;

/// Name → value view of the environment, ordered by name. A missing key
/// means "not configured", which is different from an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MergedEnvironment(BTreeMap<String, String>);

impl MergedEnvironment {
    /// Snapshot of this process' environment. Variables that are not valid
    /// UTF-8 are dropped with a warning; Prometheus will not see them.
    pub fn from_process() -> Self {
        Self::from_vars_os(std::env::vars_os())
    }

    fn from_vars_os(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        vars.into_iter()
            .filter_map(|(k, v)| match (k.to_str(), v.to_str()) {
                (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
                _ => {
                    warn!(
                        "dropping environment variable {} (not valid UTF-8)",
                        k.to_string_lossy()
                    );
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply `assignments` on top of this environment; later assignments win.
    pub fn overlay(mut self, assignments: Vec<(String, String)>) -> Self {
        for (key, value) in assignments {
            self.0.insert(key, value);
        }
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MergedEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Parse env file content: one `KEY="VALUE"` assignment per line. Leading
/// whitespace, blank lines and `#` comments are ignored; single-quoted and
/// bare values are accepted too. Anything else is an error naming the line.
pub fn parse_environment_file(contents: &str, source: &str) -> Result<Vec<(String, String)>> {
    let mut vars = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let malformed = |reason: &str| {
            Error::parse(
                format!("env file {source}"),
                format!("line {}: {reason}", index + 1),
            )
        };

        let (key, raw_value) = trimmed
            .split_once('=')
            .ok_or_else(|| malformed("expected KEY=\"VALUE\""))?;
        if !is_valid_key(key) {
            return Err(malformed(&format!("invalid variable name {key:?}")));
        }
        let value = unquote(raw_value).ok_or_else(|| malformed("unterminated quoted value"))?;
        vars.push((key.to_string(), value.to_string()));
    }
    Ok(vars)
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(raw: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        if let Some(rest) = raw.strip_prefix(quote) {
            return rest.strip_suffix(quote);
        }
    }
    Some(raw)
}

/// Fetch the env file (when one is configured) and overlay it on `base`.
pub async fn load<S: ObjectStore + ?Sized>(
    store: &S,
    locator: Option<&ObjectLocator>,
    base: MergedEnvironment,
) -> Result<MergedEnvironment> {
    let Some(locator) = locator else {
        debug!("no env file configured");
        return Ok(base);
    };

    let bytes = store.fetch(locator).await?;
    let source = locator.to_string();
    let contents = String::from_utf8(bytes)
        .map_err(|_| Error::parse(format!("env file {source}"), "content is not UTF-8"))?;
    let vars = parse_environment_file(&contents, &source)?;
    info!("loaded {} variable(s) from env file {source}", vars.len());
    Ok(base.overlay(vars))
}
