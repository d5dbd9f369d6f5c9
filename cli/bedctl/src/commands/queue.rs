//! Waiting queue.

use anyhow::Result;
use smartbed_reconcile::model::TriageLevel;
use smartbed_reconcile::Backend;

use super::views::queue_rows;
use super::CommandContext;
use crate::output::{print_info, print_output, OutputFormat};

pub async fn show_queue(ctx: CommandContext) -> Result<()> {
    let (_, backend) = ctx.backend()?;
    let queue = backend.patient_queue().await?;

    let rows = queue_rows(&queue);
    print_output(&rows, &queue, ctx.format);

    if ctx.format == OutputFormat::Table && !queue.is_empty() {
        let critical = queue
            .iter()
            .filter(|p| p.triage_level == TriageLevel::Red)
            .count();
        print_info(&format!("{} waiting, {} critical", queue.len(), critical));
    }
    Ok(())
}
