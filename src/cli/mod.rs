// ABOUTME: CLI argument parsing and command routing for replwatch
//
// Provides command-line interface for:
// - Sweeping backlog across the configured topology (backlog)
// - Fetching one server's version vector for a group (vector)
// - Producing a replication report (report)

pub mod backlog;
pub mod query;
pub mod util;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use util::Repeat;

/// Replication health from many servers, safely and repeatedly
#[derive(Parser)]
#[command(name = "replwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.replwatch/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Compute backlog for every selected connection
    Backlog(BacklogArgs),

    /// Fetch a server's version vector for a group
    Vector(VectorArgs),

    /// Produce a replication report from a server
    Report(ReportArgs),
}

/// Arguments for the backlog command
#[derive(clap::Args, Debug)]
pub struct BacklogArgs {
    /// Regex of group names to query
    #[arg(short = 'g', long = "group")]
    pub groups: Vec<String>,

    /// Regex of source hostnames
    #[arg(short = 'f', long)]
    pub from: Vec<String>,

    /// Regex of destination hostnames
    #[arg(short = 't', long)]
    pub to: Vec<String>,

    /// Regex of member hostnames (matches either source or destination)
    #[arg(short = 'm', long)]
    pub member: Vec<String>,

    /// Regex of hostnames to skip
    #[arg(long)]
    pub skip: Vec<String>,

    /// Number of sweeps or "infinite"
    #[arg(long = "loop", default_value = "1")]
    pub loops: Repeat,

    /// Seconds between sweeps
    #[arg(long, default_value = "5")]
    pub delay: u64,

    /// Seconds to cache vectors (0 disables)
    #[arg(long, default_value = "5")]
    pub cache: u64,

    /// Seconds before a sweep is cancelled, or "infinite"
    #[arg(long, default_value = "30")]
    pub timeout: Repeat,

    /// Minimum backlog to display
    #[arg(long, default_value = "0")]
    pub min: u64,

    /// Print the call record of every connection
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Arguments for the vector command
#[derive(clap::Args, Debug)]
pub struct VectorArgs {
    /// Server to query
    #[arg(long, short)]
    pub server: String,

    /// Group name or identifier
    #[arg(long, short)]
    pub group: String,

    /// Seconds before the call is cancelled, or "infinite"
    #[arg(long, default_value = "30")]
    pub timeout: Repeat,
}

/// Arguments for the report command
#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Server to query
    #[arg(long, short)]
    pub server: String,

    /// Group name or identifier
    #[arg(long, short)]
    pub group: String,

    /// Include backlog counts
    #[arg(long)]
    pub backlog: bool,

    /// Include per-file detail
    #[arg(long)]
    pub files: bool,

    /// Write the raw report payload to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Seconds before the call is cancelled, or "infinite"
    #[arg(long, default_value = "30")]
    pub timeout: Repeat,
}
