// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::command::Layout;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Without a subcommand the arguments are those of `run`, so the image's
/// command line can be passed straight through to Prometheus.
#[derive(Parser, Debug)]
#[command(name = "prometheus-entrypoint")]
#[command(about = "Resolve Prometheus configuration from instance metadata and S3, then exec Prometheus", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// The subcommand to run; `run` with the top-level arguments when none
    /// is given.
    pub fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Run(self.run))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve everything, write the files and exec Prometheus
    Run(RunArgs),
    /// Resolve everything and print the plan as JSON, without writing or exec'ing
    Render(RenderArgs),
    /// Upload a local file to an object path, creating the bucket if needed
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Extra arguments appended to the Prometheus command line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub extra_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload
    pub source: PathBuf,

    /// Destination, as s3://<bucket>/<key>
    pub object_path: String,
}

/// Filesystem layout overrides; unset options keep the image defaults.
#[derive(Args, Debug, Default, Clone)]
pub struct LayoutArgs {
    /// Prometheus binary
    #[arg(long)]
    pub prometheus_binary: Option<PathBuf>,

    /// Where the configuration file is written
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Where rule files are written
    #[arg(long)]
    pub rules_dir: Option<PathBuf>,

    /// TSDB path used when PROMETHEUS_STORAGE_TSDB_PATH is unset
    #[arg(long)]
    pub tsdb_path: Option<PathBuf>,

    #[arg(long)]
    pub console_libraries: Option<PathBuf>,

    #[arg(long)]
    pub console_templates: Option<PathBuf>,
}

impl From<LayoutArgs> for Layout {
    fn from(args: LayoutArgs) -> Self {
        let defaults = Layout::default();
        Layout {
            binary: args.prometheus_binary.unwrap_or(defaults.binary),
            config_file: args.config_file.unwrap_or(defaults.config_file),
            rules_dir: args.rules_dir.unwrap_or(defaults.rules_dir),
            tsdb_path: args.tsdb_path.unwrap_or(defaults.tsdb_path),
            console_libraries: args.console_libraries.unwrap_or(defaults.console_libraries),
            console_templates: args.console_templates.unwrap_or(defaults.console_templates),
        }
    }
}
