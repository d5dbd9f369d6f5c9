//! Bed and ward inventory.

use anyhow::Result;
use clap::Args;
use smartbed_id::WardId;
use smartbed_reconcile::model::{Bed, BedStatus};
use smartbed_reconcile::Backend;

use super::views::{BedRow, WardRow};
use super::CommandContext;
use crate::output::print_output;

#[derive(Debug, Args)]
pub struct BedsArgs {
    /// Only beds in this status (Available, Occupied, Cleaning, Maintenance).
    #[arg(long)]
    status: Option<BedStatus>,

    /// Only beds in this ward.
    #[arg(long)]
    ward: Option<WardId>,
}

impl BedsArgs {
    fn matches(&self, bed: &Bed) -> bool {
        self.status.map_or(true, |s| bed.status == s)
            && self.ward.as_ref().map_or(true, |w| &bed.ward_id == w)
    }
}

pub async fn list_beds(ctx: CommandContext, args: BedsArgs) -> Result<()> {
    let (_, backend) = ctx.backend()?;

    let beds: Vec<Bed> = backend
        .beds()
        .await?
        .into_iter()
        .filter(|b| args.matches(b))
        .collect();

    let rows: Vec<BedRow> = beds.iter().map(BedRow::from).collect();
    print_output(&rows, &beds, ctx.format);
    Ok(())
}

pub async fn list_wards(ctx: CommandContext) -> Result<()> {
    let (_, backend) = ctx.backend()?;
    let wards = backend.wards().await?;

    let rows: Vec<WardRow> = wards.iter().map(WardRow::from).collect();
    print_output(&rows, &wards, ctx.format);
    Ok(())
}
