//! bedctl - operator CLI for the smartbed allocation console
//!
//! One-shot commands for inspecting capacity and committing placements, plus
//! an interactive console with the live KPI feed running alongside.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod error;
mod feed;
mod output;

use commands::Cli;

/// Logs go to stderr so they never mix with table or JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("BEDCTL_LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
