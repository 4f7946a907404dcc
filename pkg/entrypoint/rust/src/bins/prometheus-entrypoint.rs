// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};
use prometheus_entrypoint::cli::{Cli, Commands, RenderArgs, RunArgs, UploadArgs};
use prometheus_entrypoint::command::Layout;
use prometheus_entrypoint::env::MergedEnvironment;
use prometheus_entrypoint::identity::MetadataResolver;
use prometheus_entrypoint::launch;
use prometheus_entrypoint::pipeline::{self, Plan};
use prometheus_entrypoint::poll::PollPolicy;
use prometheus_entrypoint::settings::Settings;
use prometheus_entrypoint::store::{ObjectLocator, ObjectStore, S3ObjectStore};

const LOG_LEVEL_VAR: &str = "ENTRYPOINT_LOG_LEVEL";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    entrypoint_log::init(
        "prometheus-entrypoint",
        entrypoint_log::level_from_env(LOG_LEVEL_VAR, LevelFilter::Info),
    )?;
    info!(
        "prometheus-entrypoint starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    match cli.into_command() {
        Commands::Run(args) => run(args).await,
        Commands::Render(args) => render(args).await,
        Commands::Upload(args) => upload(args).await,
    }
}

async fn resolve_plan(layout: &Layout, extra_args: &[String]) -> Result<Plan> {
    let base = MergedEnvironment::from_process();
    let settings = Settings::from_env(&base).context("invalid entrypoint settings")?;
    let identity = MetadataResolver::new(&settings.metadata_url)
        .context("failed to set up the metadata client")?;
    let store = S3ObjectStore::new(PollPolicy::default());

    let plan = pipeline::resolve(&identity, &store, &settings, base, layout, extra_args).await?;
    Ok(plan)
}

async fn run(args: RunArgs) -> Result<()> {
    let layout = Layout::from(args.layout);
    let plan = resolve_plan(&layout, &args.extra_args).await?;

    let err = launch::launch(&plan, &layout);
    Err(err).context("failed to launch prometheus")
}

#[allow(clippy::print_stdout)]
async fn render(args: RenderArgs) -> Result<()> {
    let layout = Layout::from(args.layout);
    let plan = resolve_plan(&layout, &[]).await?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&plan)?
    } else {
        serde_json::to_string(&plan)?
    };
    println!("{json}");
    Ok(())
}

async fn upload(args: UploadArgs) -> Result<()> {
    let settings = Settings::from_env(&MergedEnvironment::from_process())
        .context("invalid entrypoint settings")?;
    let locator = ObjectLocator::parse(&args.object_path, &settings.store)?;
    let content = std::fs::read(&args.source)
        .with_context(|| format!("failed to read {}", args.source.display()))?;

    let store = S3ObjectStore::new(PollPolicy::default());
    store
        .put(&locator, content)
        .await
        .with_context(|| format!("failed to upload {} to {locator}", args.source.display()))?;
    Ok(())
}
