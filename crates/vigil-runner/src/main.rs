//! `vigil`: incremental security-event collector.
//!
//! Pulls events for several categories from a remote API that only supports
//! time-window plus offset pagination, drops events already delivered in an
//! earlier run, forwards the rest to a sink and remembers where to resume.
//!
//! # Architecture
//!
//! ```text
//! StateStore --load--> CycleOrchestrator --(ApiClient v1/v2)--> remote API
//!                            |
//!                            +--> batch --> EventSink --> StateStore (save)
//! ```
//!
//! State is saved only after the sink accepted the batch, so a failed run is
//! retried from the same checkpoint.

mod cli;
mod client;
mod commands;
mod error;
mod sink;
mod transport;

use std::io::Write;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_core::config::{CollectorConfig, LogFormat, LoggingConfig};
use vigil_types::EventRecord;

use crate::cli::{Cli, Command};
use crate::commands::Collector;

/// Application entry point.
///
/// Parses the command line, loads configuration (file plus environment),
/// initializes logging, then runs the requested command once.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the command fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CollectorConfig::load(&cli.config)?;
    init_tracing(&config.logging);

    info!(config = %cli.config.display(), "vigil starting");
    config.validate()?;

    let collector = Collector::new(config).await?;
    match cli.command {
        Command::Fetch => {
            collector.fetch().await?;
        }
        Command::GetEvents(args) => {
            let events = collector.get_events(&args).await?;
            print_events(&events)?;
        }
        Command::Test => {
            collector.test().await?;
            println!("ok");
        }
    }
    Ok(())
}

/// Structured logging to stderr; stdout is reserved for event output.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn print_events(events: &[EventRecord]) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, events)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
