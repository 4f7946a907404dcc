// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::MergedEnvironment;
use crate::error::{Error, Result};
use crate::identity::InstanceIdentity;
use crate::store::{ObjectLocator, ObjectStore, StoreSettings};
use log::info;
use memchr::memmem;
use serde::Serialize;

pub const CONFIGURATION_FILE_OBJECT_PATH: &str = "PROMETHEUS_CONFIGURATION_FILE_OBJECT_PATH";

/// Configuration used when no custom object is configured. Rule globs are
/// relative to the configuration file's directory.
pub const DEFAULT_CONFIGURATION: &str = include_str!("../assets/prometheus.yml");

const TOKEN_PREFIX: &[u8] = b"${SELF_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Default,
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfigFile {
    pub source: ConfigSource,
    pub content: Vec<u8>,
}

/// Pick the configuration content: the custom object when
/// `PROMETHEUS_CONFIGURATION_FILE_OBJECT_PATH` is set and non-empty, the
/// built-in default otherwise. An unreachable custom object is an error,
/// never a fallback.
pub async fn resolve<S: ObjectStore + ?Sized>(
    store: &S,
    settings: &StoreSettings,
    env: &MergedEnvironment,
    identity: &InstanceIdentity,
) -> Result<ResolvedConfigFile> {
    let Some(path) = env
        .get(CONFIGURATION_FILE_OBJECT_PATH)
        .filter(|v| !v.is_empty())
    else {
        info!("using default prometheus configuration");
        return Ok(ResolvedConfigFile {
            source: ConfigSource::Default,
            content: DEFAULT_CONFIGURATION.as_bytes().to_vec(),
        });
    };

    let locator = ObjectLocator::parse(path, settings)?;
    let raw = store
        .fetch(&locator)
        .await
        .map_err(|e| Error::ConfigFetch {
            path: path.to_string(),
            source: Box::new(e),
        })?;

    info!("using prometheus configuration from {locator}");
    Ok(ResolvedConfigFile {
        source: ConfigSource::Object(path.to_string()),
        content: substitute(&raw, identity),
    })
}

/// Replace `${SELF_IP}`, `${SELF_ID}`, `${SELF_HOSTNAME}` and
/// `${SELF_AVAILABILITY_ZONE}` with the identity's values in a single pass.
/// Every other byte, including unknown `${...}` tokens, is copied as is.
pub fn substitute(content: &[u8], identity: &InstanceIdentity) -> Vec<u8> {
    let vars = identity.env_vars();
    let mut out = Vec::with_capacity(content.len());
    let mut rest = content;

    while let Some(pos) = memmem::find(rest, TOKEN_PREFIX) {
        let (before, candidate) = rest.split_at(pos);
        out.extend_from_slice(before);
        match vars
            .iter()
            .find_map(|(name, value)| token_len(candidate, name).map(|len| (len, value)))
        {
            Some((len, value)) => {
                out.extend_from_slice(value.as_bytes());
                rest = &candidate[len..];
            }
            None => {
                out.extend_from_slice(&candidate[..2]);
                rest = &candidate[2..];
            }
        }
    }
    out.extend_from_slice(rest);
    out
}

/// Length of `${<name>}` when `candidate` starts with it.
fn token_len(candidate: &[u8], name: &str) -> Option<usize> {
    let inner = candidate.strip_prefix(b"${")?;
    let tail = inner.strip_prefix(name.as_bytes())?;
    tail.starts_with(b"}").then_some(name.len() + 3)
}
