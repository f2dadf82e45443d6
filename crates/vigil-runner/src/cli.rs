//! Command-line interface of the `vigil` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default number of events per category for `get-events`.
pub const DEFAULT_GET_EVENTS_LIMIT: usize = 50;

/// Vigil - incremental security-event collector.
#[derive(Debug, Parser)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(
        long,
        short,
        global = true,
        env = "VIGIL_CONFIG",
        default_value = "vigil-config.yaml"
    )]
    pub config: PathBuf,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one scheduled cycle: fetch, deliver, then save state.
    Fetch,
    /// Query recent events without touching saved state.
    GetEvents(GetEventsArgs),
    /// Check connectivity and credentials with a small query.
    Test,
}

/// Arguments of `vigil get-events`.
#[derive(Debug, Clone, clap::Args)]
pub struct GetEventsArgs {
    /// Maximum events returned per category.
    #[arg(long, default_value_t = DEFAULT_GET_EVENTS_LIMIT)]
    pub limit: usize,

    /// Also deliver the events to the configured sink (default).
    #[arg(long, overrides_with = "no_push")]
    pub push: bool,

    /// Only print the events.
    #[arg(long, overrides_with = "push")]
    pub no_push: bool,
}

impl GetEventsArgs {
    /// Whether the events go to the sink. The last of `--push` and
    /// `--no-push` wins; neither means push.
    pub const fn should_push(&self) -> bool {
        self.push || !self.no_push
    }
}
