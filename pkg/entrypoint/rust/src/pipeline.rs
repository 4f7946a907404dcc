// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Startup sequence: identity, then the env file overlay, then configuration
//! and rule files side by side, then the command line.

use crate::command::{CommandLine, Layout};
use crate::config::{self, ResolvedConfigFile};
use crate::env::{self, MergedEnvironment};
use crate::error::Error;
use crate::identity::{IdentitySource, InstanceIdentity};
use crate::rules::{self, RuleFileSet};
use crate::settings::Settings;
use crate::store::ObjectStore;
use log::info;
use serde::Serialize;
use std::fmt;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identity,
    Environment,
    Config,
    Rules,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Identity => "instance identity",
            Stage::Environment => "environment file",
            Stage::Config => "configuration file",
            Stage::Rules => "rule files",
        })
    }
}

#[derive(ThisError, Debug)]
#[error("resolving {stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

fn at(stage: Stage) -> impl FnOnce(Error) -> StageError {
    move |source| StageError { stage, source }
}

/// Everything needed to start Prometheus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub identity: InstanceIdentity,
    pub environment: MergedEnvironment,
    #[serde(rename = "config_source", serialize_with = "config_source")]
    pub config: ResolvedConfigFile,
    pub rules: RuleFileSet,
    pub command: CommandLine,
}

fn config_source<S: serde::Serializer>(
    config: &ResolvedConfigFile,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    config.source.serialize(serializer)
}

/// Resolve the plan. Nothing is written to disk; resolving twice against
/// unchanged inputs yields equal plans.
pub async fn resolve<I, S>(
    identity_source: &I,
    store: &S,
    settings: &Settings,
    base: MergedEnvironment,
    layout: &Layout,
    extra_args: &[String],
) -> Result<Plan, StageError>
where
    I: IdentitySource + ?Sized,
    S: ObjectStore + ?Sized,
{
    let identity = identity_source.resolve().await.map_err(at(Stage::Identity))?;
    info!(
        "instance {} ({}) in {}",
        identity.id, identity.ip, identity.availability_zone
    );

    let environment = env::load(store, settings.env_file.as_ref(), base)
        .await
        .map_err(at(Stage::Environment))?;

    let (config, rules) = tokio::try_join!(
        async {
            config::resolve(store, &settings.store, &environment, &identity)
                .await
                .map_err(at(Stage::Config))
        },
        async {
            rules::resolve(store, &settings.store, &environment)
                .await
                .map_err(at(Stage::Rules))
        },
    )?;

    let command = CommandLine::build(&environment, layout, extra_args);
    Ok(Plan {
        identity,
        environment,
        config,
        rules,
        command,
    })
}
