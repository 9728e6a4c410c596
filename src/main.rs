// ABOUTME: Main entry point for replwatch
//
// Binary: replwatch
// Usage: replwatch [--config FILE] [--format text|json] [--log-json] <COMMAND>
// - backlog: sweep backlog across the configured topology
// - vector: fetch one server's version vector for a group
// - report: produce a replication report from one server

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;

use replwatch::cli::{self, Cli, Commands};
use replwatch::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(args.log_json);
    setup_panic_handler();

    let path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_default(&path)?;
    tracing::debug!(path = %path.display(), groups = config.groups.len(), "Configuration loaded");

    match args.command {
        Commands::Backlog(backlog_args) => {
            cli::backlog::execute(backlog_args, args.format, &config).await
        }
        Commands::Vector(vector_args) => cli::query::vector(vector_args, args.format, &config).await,
        Commands::Report(report_args) => cli::query::report(report_args, args.format, &config).await,
    }
}

fn setup_logging(json: bool) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("replwatch=warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json() // Output in JSON Lines format
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {panic_info}");
    }));
}
