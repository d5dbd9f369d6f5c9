//! CLI commands.

mod allocate;
mod auth;
mod beds;
mod console;
mod dashboard;
mod forecast;
mod patients;
mod queue;
mod simulate;
mod views;
mod watch;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use smartbed_reconcile::{
    Console, CredentialStore, HttpBackend, KpiBoard, SessionContext, WsConnector,
};

use crate::config::{Config, FileCredentialStore};
use crate::error::CliError;
use crate::output::OutputFormat;

/// bedctl - inspect bed capacity and commit patient placements.
#[derive(Debug, Parser)]
#[command(name = "bedctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// API endpoint, overriding the saved config.
    #[arg(long, global = true, env = "BEDCTL_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in, log out, or inspect the stored session.
    Auth(auth::AuthCommand),

    /// List beds.
    Beds(beds::BedsArgs),

    /// List wards and their occupancy.
    Wards,

    /// Show the waiting queue, most urgent first.
    Queue,

    /// Dashboard KPIs and alerts.
    Dashboard(dashboard::DashboardCommand),

    /// Show the admissions forecast.
    Forecast,

    /// Run a what-if capacity simulation.
    Simulate(simulate::SimulateArgs),

    /// Register patients.
    Patients(patients::PatientsCommand),

    /// Plan and commit bed assignments.
    Allocate(allocate::AllocateCommand),

    /// Interactive allocation console with live KPIs.
    Console(console::ConsoleArgs),

    /// Follow live KPI updates.
    Watch(watch::WatchArgs),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;
        let api_url_flag = self.api_url.is_some();
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }

        let ctx = CommandContext {
            config,
            api_url_flag,
            store: Arc::new(FileCredentialStore::default_location()?),
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Auth(cmd) => cmd.run(ctx).await,
            Commands::Beds(args) => beds::list_beds(ctx, args).await,
            Commands::Wards => beds::list_wards(ctx).await,
            Commands::Queue => queue::show_queue(ctx).await,
            Commands::Dashboard(cmd) => cmd.run(ctx).await,
            Commands::Forecast => forecast::show_forecast(ctx).await,
            Commands::Simulate(args) => simulate::run(ctx, args).await,
            Commands::Patients(cmd) => cmd.run(ctx).await,
            Commands::Allocate(cmd) => cmd.run(ctx).await,
            Commands::Console(args) => console::run(ctx, args).await,
            Commands::Watch(args) => watch::run(ctx, args).await,
            Commands::Version => {
                println!("bedctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    /// The API URL came from a flag or the environment rather than the file.
    pub api_url_flag: bool,
    pub store: Arc<FileCredentialStore>,
    pub format: OutputFormat,
}

impl CommandContext {
    fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    /// The stored session, if one exists.
    pub fn restore_session(&self) -> Result<Option<SessionContext>> {
        SessionContext::restore(self.store())
    }

    /// Require a stored session.
    pub fn session(&self) -> Result<SessionContext> {
        self.restore_session()?
            .ok_or_else(|| CliError::NotAuthenticated.into())
    }

    /// An authenticated backend client.
    pub fn backend(&self) -> Result<(SessionContext, Arc<HttpBackend>)> {
        let session = self.session()?;
        let backend = HttpBackend::new(self.config.api_url(), session.clone())?;
        Ok((session, Arc::new(backend)))
    }

    /// A console over the HTTP backend with its own KPI board.
    pub fn console(&self) -> Result<Console> {
        let (session, backend) = self.backend()?;
        Ok(Console::new(backend, session, KpiBoard::new()))
    }

    /// Connector for the live update socket.
    pub fn live_connector(&self, session: SessionContext) -> Arc<WsConnector> {
        Arc::new(WsConnector::new(
            self.config.api_url(),
            &self.config.live_path,
            session,
        ))
    }
}
