//! Plan and commit bed assignments.
//!
//! Suggestions only live for the duration of one process, so `accept-all`
//! runs the optimizer itself and commits what it returns.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;
use smartbed_id::{BedId, PatientId};
use smartbed_reconcile::{Console, ResourceKind};

use super::views::{commit_rows, pairing_rows};
use super::CommandContext;
use crate::error::CliError;
use crate::output::{print_info, print_output, print_single, print_success, print_warning, OutputFormat};

#[derive(Debug, Args)]
pub struct AllocateCommand {
    #[command(subcommand)]
    command: AllocateSubcommand,
}

#[derive(Debug, Subcommand)]
enum AllocateSubcommand {
    /// Run the optimizer and show the suggested pairings.
    Plan,

    /// Assign one patient to one bed.
    Accept(AcceptArgs),

    /// Run the optimizer and commit every suggested pairing.
    AcceptAll(AcceptAllArgs),
}

#[derive(Debug, Args)]
struct AcceptArgs {
    /// Patient to place.
    #[arg(long)]
    patient: PatientId,

    /// Target bed.
    #[arg(long)]
    bed: BedId,

    /// Ask the backend to place the patient ahead of priority rules.
    #[arg(long)]
    priority_override: bool,
}

#[derive(Debug, Args)]
struct AcceptAllArgs {
    #[arg(long)]
    priority_override: bool,
}

impl AllocateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            AllocateSubcommand::Plan => plan(ctx).await,
            AllocateSubcommand::Accept(args) => accept(ctx, args).await,
            AllocateSubcommand::AcceptAll(args) => accept_all(ctx, args).await,
        }
    }
}

/// Load queue and beds, then run the optimizer so staleness can be shown.
async fn planned_console(ctx: &CommandContext) -> Result<Console> {
    let mut console = ctx.console()?;
    console
        .refresh(&[ResourceKind::Queue, ResourceKind::Beds])
        .await;
    console.optimize().await?;
    Ok(console)
}

async fn plan(ctx: CommandContext) -> Result<()> {
    let console = planned_console(&ctx).await?;
    let view = console.view();

    let rows = pairing_rows(&view.suggestions);
    let json = json!({
        "assignments": rows,
        "objective_value": view.objective_value,
        "metrics": view.metrics,
    });
    print_output(&rows, &json, ctx.format);

    if ctx.format == OutputFormat::Table && !rows.is_empty() {
        if let Some(metrics) = &view.metrics {
            print_info(&format!(
                "objective {} | wait reduction {:.0}m | survival +{:.1}%",
                view.objective_value
                    .map(|v| format!("{v:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
                metrics.wait_time_reduction_mins,
                metrics.survival_prob_increase,
            ));
        }
        print_info("Commit with `bedctl allocate accept-all`, or one at a time with `bedctl allocate accept`.");
    }
    Ok(())
}

async fn accept(ctx: CommandContext, args: AcceptArgs) -> Result<()> {
    let mut console = ctx.console()?;
    let receipt = console
        .accept(args.patient.clone(), args.bed.clone(), args.priority_override)
        .await?;

    match ctx.format {
        OutputFormat::Json => print_single(&receipt),
        OutputFormat::Table => {
            print_success(&format!("Assigned {} to bed {}.", args.patient, args.bed))
        }
    }
    Ok(())
}

async fn accept_all(ctx: CommandContext, args: AcceptAllArgs) -> Result<()> {
    let mut console = planned_console(&ctx).await?;
    if console.state().suggestions.is_empty() {
        print_info("The optimizer returned no pairings.");
        return Ok(());
    }

    let outcome = console.accept_all(args.priority_override).await;
    let rows = commit_rows(&outcome);
    print_output(&rows, &rows, ctx.format);

    if outcome.failed() > 0 {
        return Err(CliError::PartialCommit {
            failed: outcome.failed(),
            attempted: outcome.attempted(),
        }
        .into());
    }
    if ctx.format == OutputFormat::Table {
        print_success(&format!("Assigned {} patients.", outcome.succeeded()));
    }
    if console.view().beds.error().is_some() {
        print_warning("Bed inventory could not be re-read after committing.");
    }
    Ok(())
}
