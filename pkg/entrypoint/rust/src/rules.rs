// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::MergedEnvironment;
use crate::error::{Error, Result};
use crate::fsutil::write_atomic;
use crate::store::{ObjectLocator, ObjectStore, StoreSettings};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

pub const RULE_FILE_OBJECT_PATHS: &str = "PROMETHEUS_RULE_FILE_OBJECT_PATHS";

const MAX_CONCURRENT_FETCHES: usize = 4;

/// Rule file contents keyed by the basename they are written under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFileSet(BTreeMap<String, Vec<u8>>);

impl RuleFileSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Write every rule file into `dir`, creating it if needed. Files from
    /// earlier runs that are not part of this set are left in place.
    pub fn materialize(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        for (name, content) in &self.0 {
            write_atomic(&dir.join(name), content)?;
        }
        debug!("wrote {} rule file(s) to {}", self.0.len(), dir.display());
        Ok(())
    }
}

/// Rendered as basename → size, the content is not useful in a plan dump.
impl Serialize for RuleFileSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, content)| (name, content.len())))
    }
}

/// Split the configured rule paths into locators, rejecting lists that would
/// make two objects land on the same file.
pub fn parse_rule_paths(raw: &str, settings: &StoreSettings) -> Result<Vec<(String, ObjectLocator)>> {
    let invalid = |reason: String| Error::parse(RULE_FILE_OBJECT_PATHS, reason);

    let mut seen = BTreeMap::new();
    let mut locators = Vec::new();
    for (index, path) in raw.split(',').enumerate() {
        if path.is_empty() {
            return Err(invalid(format!("entry {} is empty", index + 1)));
        }
        let locator = ObjectLocator::parse(path, settings)?;
        let name = locator
            .basename()
            .ok_or_else(|| invalid(format!("{path} has no file name")))?
            .to_string();
        if let Some(previous) = seen.insert(name.clone(), path) {
            return Err(invalid(format!(
                "{previous} and {path} both resolve to rule file {name}"
            )));
        }
        locators.push((name, locator));
    }
    Ok(locators)
}

/// Fetch every object listed in `PROMETHEUS_RULE_FILE_OBJECT_PATHS`. An unset
/// or empty variable yields an empty set; any failed fetch fails the whole
/// resolution.
pub async fn resolve<S: ObjectStore + ?Sized>(
    store: &S,
    settings: &StoreSettings,
    env: &MergedEnvironment,
) -> Result<RuleFileSet> {
    let Some(raw) = env.get(RULE_FILE_OBJECT_PATHS).filter(|v| !v.is_empty()) else {
        debug!("no rule files configured");
        return Ok(RuleFileSet::default());
    };

    let locators = parse_rule_paths(raw, settings)?;
    let files: BTreeMap<String, Vec<u8>> = stream::iter(locators)
        .map(|(name, locator)| async move {
            let content = store.fetch(&locator).await?;
            Ok::<_, Error>((name, content))
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .try_collect()
        .await?;

    info!("resolved {} rule file(s)", files.len());
    Ok(RuleFileSet(files))
}
