// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Line-oriented logger for the entrypoint binaries.
//!
//! Records are written in the agent's pipe-separated layout:
//!
//! ```text
//! 2026-01-01 12:00:00 UTC | PROMETHEUS-ENTRYPOINT | INFO | (src/pipeline.rs:42 in prometheus_entrypoint::pipeline) | resolved identity
//! ```

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Mutex;
use time::OffsetDateTime;
use time::macros::format_description;

pub struct AgentLogger {
    component: String,
    level: LevelFilter,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl AgentLogger {
    pub fn new(component: &str, level: LevelFilter, sink: Box<dyn Write + Send>) -> Self {
        Self {
            component: component.to_uppercase(),
            level,
            sink: Mutex::new(sink),
        }
    }
}

impl Log for AgentLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(OffsetDateTime::now_utc(), &self.component, record);
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{line}");
        }
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
    }
}

/// Install an [`AgentLogger`] writing to stderr as the global logger.
pub fn init(component: &str, level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = AgentLogger::new(component, level, Box::new(io::stderr()));
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    Ok(())
}

/// Read a level name (`error`, `warn`, `info`, `debug`, `trace`, `off`) from
/// `var`, falling back to `default` when unset or unparseable.
pub fn level_from_env(var: &str, default: LevelFilter) -> LevelFilter {
    std::env::var(var)
        .ok()
        .and_then(|raw| parse_level(&raw))
        .unwrap_or(default)
}

pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(raw.trim()).ok()
}

pub fn format_record(now: OffsetDateTime, component: &str, record: &Record) -> String {
    let timestamp = now
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());

    let location = match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!("{file}:{line}"),
        (Some(file), None) => file.to_string(),
        _ => "unknown".to_string(),
    };
    let location = match record.module_path() {
        Some(module) => format!("{location} in {module}"),
        None => location,
    };

    format!(
        "{timestamp} | {component} | {} | ({location}) | {}",
        record.level(),
        record.args()
    )
}
