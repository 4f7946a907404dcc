// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::command::Layout;
use crate::error::{Error, Result};
use crate::fsutil::write_atomic;
use crate::pipeline::Plan;
use log::info;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Write the resolved configuration and rule files where Prometheus expects
/// them.
pub fn materialize(plan: &Plan, layout: &Layout) -> Result<()> {
    write_atomic(&layout.config_file, &plan.config.content)?;
    info!("wrote {}", layout.config_file.display());
    plan.rules.materialize(&layout.rules_dir)
}

/// Environment handed to Prometheus: the merged environment plus the
/// `SELF_*` identity variables, which take precedence.
pub fn child_environment(plan: &Plan) -> Vec<(String, String)> {
    let identity = plan
        .identity
        .env_vars()
        .map(|(k, v)| (k.to_string(), v.to_string()));
    plan.environment
        .clone()
        .overlay(identity.into())
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build the exec'able command without running it.
pub fn command(plan: &Plan, layout: &Layout) -> Command {
    let mut cmd = Command::new(&layout.binary);
    cmd.args(plan.command.args())
        .env_clear()
        .envs(child_environment(plan));
    cmd
}

/// Materialize the plan and replace the current process with Prometheus.
/// Only returns when exec fails.
pub fn launch(plan: &Plan, layout: &Layout) -> Error {
    if let Err(e) = materialize(plan, layout) {
        return e;
    }
    let mut cmd = command(plan, layout);
    info!(
        "executing {} {}",
        layout.binary.display(),
        plan.command.args().join(" ")
    );
    let source = cmd.exec();
    Error::ExecFailure {
        binary: layout.binary.clone(),
        source,
    }
}
