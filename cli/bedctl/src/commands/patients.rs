//! Patient registration.

use anyhow::Result;
use clap::{Args, Subcommand};
use smartbed_reconcile::model::{AcuityScore, NewPatient, TriageLevel};

use super::CommandContext;
use crate::output::{print_single, print_success, OutputFormat};

#[derive(Debug, Args)]
pub struct PatientsCommand {
    #[command(subcommand)]
    command: PatientsSubcommand,
}

#[derive(Debug, Subcommand)]
enum PatientsSubcommand {
    /// Add a patient to the waiting queue.
    Add(AddArgs),
}

#[derive(Debug, Args)]
struct AddArgs {
    /// Full name.
    #[arg(long)]
    name: String,

    #[arg(long)]
    age: u16,

    /// Presenting condition.
    #[arg(long)]
    condition: String,

    /// Triage level (red, yellow, green).
    #[arg(long)]
    triage: TriageLevel,

    /// Acuity score, 0-100.
    #[arg(long)]
    acuity: u8,
}

impl PatientsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            PatientsSubcommand::Add(args) => add(ctx, args).await,
        }
    }
}

async fn add(ctx: CommandContext, args: AddArgs) -> Result<()> {
    let new_patient = NewPatient {
        name: args.name,
        age: args.age,
        condition: args.condition,
        triage_level: args.triage,
        acuity_score: AcuityScore::new(args.acuity)?,
    };
    // Reject bad input before needing a session.
    new_patient.validate()?;

    let (_, backend) = ctx.backend()?;
    let patient = backend.create_patient(&new_patient).await?;

    match ctx.format {
        OutputFormat::Json => print_single(&patient),
        OutputFormat::Table => {
            print_success(&format!(
                "Queued {} as {} (triage {}, acuity {}).",
                patient.name, patient.id, patient.triage_level, patient.acuity_score
            ));
        }
    }
    Ok(())
}
