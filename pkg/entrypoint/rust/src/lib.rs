// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Container entrypoint for Prometheus: resolves the instance identity, the
//! environment, configuration and rule files, then execs Prometheus.

pub mod cli;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod fsutil;
pub mod identity;
pub mod launch;
pub mod pipeline;
pub mod poll;
pub mod rules;
pub mod settings;
pub mod store;

pub use error::{Error, Result};
