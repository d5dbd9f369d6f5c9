//! Follow live KPI updates.

use anyhow::Result;
use clap::Args;
use smartbed_reconcile::actor::BackoffPolicy;
use smartbed_reconcile::live::KpiState;
use smartbed_reconcile::{Backend, ConsoleError, KpiBoard};
use tokio::sync::watch;

use super::views::kpi_line;
use super::CommandContext;
use crate::feed::{run_feed, FeedEnd};
use crate::output::{print_info, print_warning, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Exit after this many live updates.
    #[arg(long)]
    count: Option<usize>,
}

fn print_state(state: &KpiState, format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", kpi_line(state)),
        OutputFormat::Json => {
            if let Some(kpis) = &state.kpis {
                println!(
                    "{}",
                    serde_json::to_string(kpis).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }
}

pub async fn run(ctx: CommandContext, args: WatchArgs) -> Result<()> {
    let (session, backend) = ctx.backend()?;
    let board = KpiBoard::new();

    let initial = backend.kpis().await;
    if let Err(e) = &initial {
        if e.is_auth() {
            return Err(e.clone().into());
        }
    }
    board.replace(initial);
    let mut updates = board.subscribe();
    print_state(&board.current(), ctx.format);

    let (connected_tx, mut connected_rx) = watch::channel(false);
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut feed = tokio::spawn(run_feed(
        ctx.live_connector(session.clone()),
        board.clone(),
        BackoffPolicy::default(),
        connected_tx,
        stop_rx,
    ));
    let mut feed_done = false;
    let mut seen = 0usize;

    let result: Result<(), ConsoleError> = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            end = &mut feed => {
                feed_done = true;
                match end {
                    Ok(FeedEnd::AuthRejected(reason)) => {
                        session.expire();
                        break Err(ConsoleError::Auth(format!("live channel closed: {reason:?}")));
                    }
                    _ => break Ok(()),
                }
            }
            Ok(()) = connected_rx.changed() => {
                let up = *connected_rx.borrow_and_update();
                if ctx.format == OutputFormat::Table {
                    if up {
                        print_info("Live feed connected.");
                    } else {
                        print_warning("Live feed lost; reconnecting.");
                    }
                }
            }
            Ok(()) = updates.changed() => {
                let state = updates.borrow_and_update().clone();
                print_state(&state, ctx.format);
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break Ok(());
                }
            }
        }
    };

    stop_tx.send_replace(true);
    if !feed_done {
        let _ = feed.await;
    }
    result?;
    Ok(())
}
