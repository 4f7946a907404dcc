// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::MergedEnvironment;
use log::warn;
use serde::Serialize;
use std::path::PathBuf;

pub const STORAGE_TSDB_PATH: &str = "PROMETHEUS_STORAGE_TSDB_PATH";
pub const STORAGE_TSDB_RETENTION_TIME: &str = "PROMETHEUS_STORAGE_TSDB_RETENTION_TIME";
pub const STORAGE_TSDB_MINIMUM_BLOCK_DURATION: &str =
    "PROMETHEUS_STORAGE_TSDB_MINIMUM_BLOCK_DURATION";
pub const STORAGE_TSDB_MAXIMUM_BLOCK_DURATION: &str =
    "PROMETHEUS_STORAGE_TSDB_MAXIMUM_BLOCK_DURATION";
pub const WEB_EXTERNAL_URL: &str = "PROMETHEUS_WEB_EXTERNAL_URL";
pub const WEB_ADMIN_API_ENABLED: &str = "PROMETHEUS_WEB_ADMIN_API_ENABLED";
pub const WEB_LIFECYCLE_ENABLED: &str = "PROMETHEUS_WEB_LIFECYCLE_ENABLED";

const DEPRECATED_WEB_ADMIN_API: &str = "PROMETHEUS_WEB_ENABLE_ADMIN_API";
const DEPRECATED_WEB_LIFECYCLE: &str = "PROMETHEUS_WEB_ENABLE_LIFECYCLE";

const DEFAULT_RETENTION_TIME: &str = "30d";

/// Where things live inside the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub binary: PathBuf,
    pub config_file: PathBuf,
    pub rules_dir: PathBuf,
    pub tsdb_path: PathBuf,
    pub console_libraries: PathBuf,
    pub console_templates: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/opt/prometheus/bin/prometheus"),
            config_file: PathBuf::from("/opt/prometheus/conf/prometheus.yml"),
            rules_dir: PathBuf::from("/opt/prometheus/conf/rules"),
            tsdb_path: PathBuf::from("/var/opt/prometheus"),
            console_libraries: PathBuf::from("/opt/prometheus/console_libraries"),
            console_templates: PathBuf::from("/opt/prometheus/consoles"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

/// `yes` and `true` (any case) switch a feature on. Anything else, empty
/// values included, leaves it off.
pub fn parse_toggle(value: &str) -> Toggle {
    if value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("true") {
        Toggle::On
    } else {
        Toggle::Off
    }
}

/// Read a toggle, falling back to its deprecated spelling only when the
/// current name is absent.
fn toggle(env: &MergedEnvironment, name: &str, deprecated: &str) -> Toggle {
    if let Some(value) = env.get(name) {
        return parse_toggle(value);
    }
    match env.get(deprecated) {
        Some(value) => {
            warn!("{deprecated} is deprecated, use {name} instead");
            parse_toggle(value)
        }
        None => Toggle::Off,
    }
}

/// Arguments passed to Prometheus, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Translate the environment into Prometheus flags. The same environment
    /// and layout always produce the same arguments; `extra_args` are appended
    /// verbatim.
    pub fn build(env: &MergedEnvironment, layout: &Layout, extra_args: &[String]) -> Self {
        let mut args = vec![
            format!("--config.file={}", layout.config_file.display()),
            "--log.format=json".to_string(),
        ];

        let tsdb_path = env
            .get(STORAGE_TSDB_PATH)
            .map(str::to_string)
            .unwrap_or_else(|| layout.tsdb_path.display().to_string());
        args.push(format!("--storage.tsdb.path={tsdb_path}"));
        args.push(format!(
            "--storage.tsdb.retention.time={}",
            env.get(STORAGE_TSDB_RETENTION_TIME)
                .unwrap_or(DEFAULT_RETENTION_TIME)
        ));
        if let Some(v) = env.get(STORAGE_TSDB_MINIMUM_BLOCK_DURATION) {
            args.push(format!("--storage.tsdb.min-block-duration={v}"));
        }
        if let Some(v) = env.get(STORAGE_TSDB_MAXIMUM_BLOCK_DURATION) {
            args.push(format!("--storage.tsdb.max-block-duration={v}"));
        }
        args.push("--storage.tsdb.no-lockfile".to_string());

        args.push(format!(
            "--web.console.libraries={}",
            layout.console_libraries.display()
        ));
        args.push(format!(
            "--web.console.templates={}",
            layout.console_templates.display()
        ));
        if let Some(v) = env.get(WEB_EXTERNAL_URL) {
            args.push(format!("--web.external-url={v}"));
        }
        if toggle(env, WEB_ADMIN_API_ENABLED, DEPRECATED_WEB_ADMIN_API) == Toggle::On {
            args.push("--web.enable-admin-api".to_string());
        }
        if toggle(env, WEB_LIFECYCLE_ENABLED, DEPRECATED_WEB_LIFECYCLE) == Toggle::On {
            args.push("--web.enable-lifecycle".to_string());
        }

        args.extend(extra_args.iter().cloned());
        Self(args)
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, arg: &str) -> bool {
        self.0.iter().any(|a| a == arg)
    }
}
