//! Dashboard KPIs and alerts.

use anyhow::Result;
use clap::{Args, Subcommand};
use smartbed_reconcile::Backend;

use super::views::AlertRow;
use super::CommandContext;
use crate::output::{print_output, print_single, OutputFormat};

#[derive(Debug, Args)]
pub struct DashboardCommand {
    #[command(subcommand)]
    command: DashboardSubcommand,
}

#[derive(Debug, Subcommand)]
enum DashboardSubcommand {
    /// Show current KPIs.
    Kpis,

    /// List active alerts.
    Alerts,
}

impl DashboardCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            DashboardSubcommand::Kpis => kpis(ctx).await,
            DashboardSubcommand::Alerts => alerts(ctx).await,
        }
    }
}

async fn kpis(ctx: CommandContext) -> Result<()> {
    let (_, backend) = ctx.backend()?;
    let k = backend.kpis().await?;

    match ctx.format {
        OutputFormat::Json => print_single(&k),
        OutputFormat::Table => {
            println!("Beds:      {}/{} occupied ({}%)", k.occupied_beds, k.total_beds, k.occupancy_rate);
            println!("Available: {}", k.available_beds());
            println!("ICU:       {}/{} occupied ({}%)", k.occupied_icu, k.total_icu, k.icu_rate);
            println!("Expected admissions (24h): {}", k.expected_admissions_24h);
            println!("Average wait: {}m", k.avg_wait_time_mins);
            if let Some(queue) = k.ed_queue_length {
                println!("ED queue: {}", queue);
            }
            if let Some(critical) = k.critical_patients {
                println!("Critical patients: {}", critical);
            }
        }
    }
    Ok(())
}

async fn alerts(ctx: CommandContext) -> Result<()> {
    let (_, backend) = ctx.backend()?;
    let alerts = backend.alerts().await?;

    let rows: Vec<AlertRow> = alerts.iter().map(AlertRow::from).collect();
    print_output(&rows, &alerts, ctx.format);
    Ok(())
}
