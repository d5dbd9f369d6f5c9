//! What-if capacity simulation.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use smartbed_reconcile::model::{Pressure, Scenario, SimPoint, SimRequest};
use tabled::Tabled;

use super::CommandContext;
use crate::error::CliError;
use crate::output::{print_info, print_output, print_warning, OutputFormat};

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Start from a preset: baseline, surge or disaster.
    #[arg(long, default_value = "baseline")]
    scenario: Scenario,

    /// Patient inflow multiplier (0.5 to 3.0).
    #[arg(long)]
    inflow: Option<f64>,

    /// Acuity multiplier (0.8 to 2.0).
    #[arg(long)]
    acuity: Option<f64>,

    /// Fraction of staff available (0.5 to 1.0).
    #[arg(long)]
    staff: Option<f64>,
}

impl SimulateArgs {
    /// The preset with any explicit multipliers laid over it.
    fn request(&self) -> SimRequest {
        let preset = self.scenario.request();
        SimRequest {
            acuity_modifier: self.acuity.unwrap_or(preset.acuity_modifier),
            inflow_modifier: self.inflow.unwrap_or(preset.inflow_modifier),
            staff_availability: self.staff.unwrap_or(preset.staff_availability),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct SimRow {
    #[tabled(rename = "Hour")]
    hour: String,
    #[tabled(rename = "Occupancy")]
    occupancy: u32,
    #[tabled(rename = "Capacity")]
    capacity: u32,
    #[tabled(rename = "Load")]
    load: String,
}

impl From<&SimPoint> for SimRow {
    fn from(p: &SimPoint) -> Self {
        let pct = if p.capacity == 0 {
            0
        } else {
            p.occupancy * 100 / p.capacity
        };
        Self {
            hour: format!("+{}h", p.hour),
            occupancy: p.occupancy,
            capacity: p.capacity,
            load: if p.is_over_capacity() {
                format!("{pct}%").red().to_string()
            } else {
                format!("{pct}%")
            },
        }
    }
}

pub async fn run(ctx: CommandContext, args: SimulateArgs) -> Result<()> {
    let request = args.request();
    request.validate()?;

    let (session, backend) = ctx.backend()?;
    let role = session.profile().role;
    if !role.is_planner() {
        return Err(CliError::NotPermitted {
            role: role.to_string(),
            action: "run simulations",
        }
        .into());
    }

    let result = backend.simulate(&request).await?;

    let rows: Vec<SimRow> = result.timeline.iter().map(SimRow::from).collect();
    print_output(&rows, &result, ctx.format);

    if ctx.format == OutputFormat::Table {
        let m = &result.metrics;
        let summary = format!(
            "peak {}% | avg wait {}m | diverted {} | {}",
            m.max_occupancy_pct,
            m.avg_wait_mins,
            m.patients_diverted,
            m.pressure()
        );
        match m.pressure() {
            Pressure::Exceeded => print_warning(&summary),
            _ => print_info(&summary),
        }
    }
    Ok(())
}
