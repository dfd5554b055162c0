// src/main.rs

mod cli;
mod commands;

use anyhow::{Context as _, Result};
use clap::Parser;
use cli::Cli;
use commands::Context;
use goalpost::EngineConfig;
use goalpost::logger::{FileLogger, LoggerLayer};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn init_logging(config: &EngineConfig, quiet: bool) -> Result<()> {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let file = match config.log_file {
        Some(ref path) => {
            let logger = FileLogger::open(path, config.log_level_setting()?)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(LoggerLayer::new(Arc::new(logger)))
        }
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.best |= cli.best;
    config.allow_erasing |= cli.allow_erasing;

    init_logging(&config, cli.quiet)?;

    let mut ctx = Context::open(config, cli.assume_yes, cli.quiet)?;
    commands::dispatch(&mut ctx, &cli.command)
}
