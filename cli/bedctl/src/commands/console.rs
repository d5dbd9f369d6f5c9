//! Interactive allocation console.
//!
//! The console state is owned by a [`ConsoleActor`]; this loop only sends it
//! commands. The live KPI feed runs in its own task and writes to the same
//! KPI board the console renders from.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use smartbed_id::{BedId, PatientId};
use smartbed_reconcile::actor::BackoffPolicy;
use smartbed_reconcile::{
    Console, ConsoleActor, ConsoleError, ConsoleHandle, ConsoleView, KpiBoard, Region,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::views::{commit_rows, kpi_line, pairing_rows, queue_rows, BedRow, WardRow};
use super::CommandContext;
use crate::feed::{run_feed, FeedEnd};
use crate::output::{print_info, print_output, print_success, print_warning, OutputFormat};

#[derive(Debug, Args)]
pub struct ConsoleArgs {
    /// Do not open the live KPI channel.
    #[arg(long)]
    no_live: bool,

    /// Mailbox size for the console actor.
    #[arg(long, default_value = "32", hide = true)]
    mailbox: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Queue,
    Beds,
    Wards,
    Plan,
    Kpis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Refresh,
    Optimize,
    Accept {
        patient_id: PatientId,
        bed_id: Option<BedId>,
        priority_override: bool,
    },
    AcceptAll {
        priority_override: bool,
    },
    Discard,
    Show(Section),
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  refresh                          re-read queue, beds, wards, alerts and KPIs
  optimize                         run the optimizer (replaces the current plan)
  accept <patient> [bed] [--override]
                                   commit one pairing; bed defaults to the plan's
  accept-all [--override]          commit every planned pairing
  discard                          drop the current plan
  show [queue|beds|wards|plan|kpis]
  help
  quit";

fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let mut words: Vec<&str> = line.split_whitespace().collect();
    let priority_override = match words.iter().position(|w| *w == "--override") {
        Some(idx) => {
            words.remove(idx);
            true
        }
        None => false,
    };

    let Some((&verb, rest)) = words.split_first() else {
        return Err("empty command".to_string());
    };

    let command = match (verb, rest) {
        ("refresh" | "r", []) => ReplCommand::Refresh,
        ("optimize" | "plan", []) => ReplCommand::Optimize,
        ("accept" | "a", [patient]) | ("accept" | "a", [patient, _]) => ReplCommand::Accept {
            patient_id: patient.parse().map_err(|e| format!("{e}"))?,
            bed_id: rest
                .get(1)
                .map(|b| b.parse())
                .transpose()
                .map_err(|e| format!("{e}"))?,
            priority_override,
        },
        ("accept-all", []) => ReplCommand::AcceptAll { priority_override },
        ("discard", []) => ReplCommand::Discard,
        ("show" | "s", []) => ReplCommand::Show(Section::Summary),
        ("show" | "s", [what]) => ReplCommand::Show(match *what {
            "queue" => Section::Queue,
            "beds" => Section::Beds,
            "wards" => Section::Wards,
            "plan" => Section::Plan,
            "kpis" => Section::Kpis,
            other => return Err(format!("nothing called '{other}' to show")),
        }),
        ("help" | "?", []) => ReplCommand::Help,
        ("quit" | "exit" | "q", []) => ReplCommand::Quit,
        _ => return Err(format!("unrecognised command '{}'", line.trim())),
    };

    if priority_override
        && !matches!(
            command,
            ReplCommand::Accept { .. } | ReplCommand::AcceptAll { .. }
        )
    {
        return Err("--override only applies to accept and accept-all".to_string());
    }
    Ok(command)
}

fn region_warning<T>(name: &str, region: &Region<T>) {
    if let Some(e) = region.error() {
        let note = if region.data().is_some() {
            "showing last good data"
        } else {
            "no data"
        };
        print_warning(&format!("{name}: last refresh failed ({e}); {note}"));
    }
}

fn render(view: &ConsoleView, section: Section, connected: bool) {
    let table = OutputFormat::Table;
    match section {
        Section::Kpis => {
            let live = if connected { "live".green() } else { "offline".dimmed() };
            println!("{} [{}]", kpi_line(&view.kpis), live);
        }
        Section::Queue => {
            region_warning("queue", &view.queue);
            let queue = view.queue.data().map(Vec::as_slice).unwrap_or_default();
            print_output(&queue_rows(queue), &(), table);
        }
        Section::Beds => {
            region_warning("beds", &view.beds);
            let rows: Vec<BedRow> = view.beds.data().into_iter().flatten().map(BedRow::from).collect();
            print_output(&rows, &(), table);
        }
        Section::Wards => {
            region_warning("wards", &view.wards);
            let rows: Vec<WardRow> = view.wards.data().into_iter().flatten().map(WardRow::from).collect();
            print_output(&rows, &(), table);
        }
        Section::Plan => {
            if view.suggestions.is_empty() {
                println!("{}", "No plan. Run `optimize`.".dimmed());
                return;
            }
            print_output(&pairing_rows(&view.suggestions), &(), table);
            let stale = view.suggestions.iter().filter(|r| r.stale.is_some()).count();
            if stale > 0 {
                print_warning(&format!(
                    "{stale} pairing(s) no longer match the latest snapshot; the backend decides on accept"
                ));
            }
        }
        Section::Summary => {
            render(view, Section::Kpis, connected);
            let waiting = view.queue.data().map_or(0, Vec::len);
            let available = view.available_beds().count();
            println!("{waiting} waiting, {available} beds available");
            for issue in &view.issues {
                print_warning(&issue.to_string());
            }
            if let Some(alerts) = view.alerts.data() {
                if !alerts.is_empty() {
                    print_info(&format!("{} active alert(s)", alerts.len()));
                }
            }
            render(view, Section::Plan, connected);
        }
    }
}

fn ends_console(e: &ConsoleError) -> bool {
    e.is_auth() || *e == ConsoleError::ConsoleStopped
}

/// Execute one command. Returns false to leave the loop.
async fn execute(
    handle: &ConsoleHandle,
    command: ReplCommand,
    connected: bool,
) -> Result<bool, ConsoleError> {
    match command {
        ReplCommand::Refresh => {
            for (kind, result) in handle.refresh_all().await? {
                if let Err(e) = result {
                    print_warning(&format!("{kind}: {e}"));
                }
            }
            render(&handle.view().await?, Section::Summary, connected);
        }
        ReplCommand::Optimize => match handle.optimize().await {
            Ok(count) => {
                print_success(&format!("Optimizer proposed {count} pairing(s)."));
                render(&handle.view().await?, Section::Plan, connected);
            }
            Err(e) if ends_console(&e) => return Err(e),
            Err(e) => print_warning(&format!("optimize failed: {e}")),
        },
        ReplCommand::Accept {
            patient_id,
            bed_id,
            priority_override,
        } => match handle.accept(patient_id.clone(), bed_id, priority_override).await {
            Ok(receipt) => {
                let bed = receipt
                    .bed_id
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "its bed".to_string());
                print_success(&format!("Assigned {patient_id} to {bed}."));
            }
            Err(e) if ends_console(&e) => return Err(e),
            Err(e) => print_warning(&format!("accept failed: {e}")),
        },
        ReplCommand::AcceptAll { priority_override } => {
            let outcome = handle.accept_all(priority_override).await?;
            if outcome.attempted() == 0 {
                println!("{}", "No plan to accept.".dimmed());
            } else {
                print_output(&commit_rows(&outcome), &(), OutputFormat::Table);
                if outcome.failed() > 0 {
                    print_warning(&format!(
                        "{} of {} failed and remain in the plan",
                        outcome.failed(),
                        outcome.attempted()
                    ));
                }
            }
        }
        ReplCommand::Discard => {
            handle.discard_suggestions().await?;
            print_info("Plan discarded.");
        }
        ReplCommand::Show(section) => render(&handle.view().await?, section, connected),
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit => return Ok(false),
    }
    Ok(true)
}

async fn prompt(connected: bool) -> std::io::Result<()> {
    let mark = if connected { "●".green() } else { "○".dimmed() };
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{mark} bedctl> ").as_bytes())
        .await?;
    stdout.flush().await
}

/// Wait for the feed task if there is one; never resolves otherwise.
async fn feed_finished(feed: &mut Option<JoinHandle<FeedEnd>>) -> FeedEnd {
    match feed.as_mut() {
        Some(task) => {
            let end = task.await.unwrap_or(FeedEnd::Shutdown);
            *feed = None;
            end
        }
        None => std::future::pending().await,
    }
}

pub async fn run(ctx: CommandContext, args: ConsoleArgs) -> Result<()> {
    let (session, backend) = ctx.backend()?;
    let board = KpiBoard::new();
    let console = Console::new(backend, session.clone(), board.clone());
    let (handle, actor_ref) = ConsoleActor::spawn(console, args.mailbox);

    let (connected_tx, connected_rx) = watch::channel(false);
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut feed = (!args.no_live).then(|| {
        tokio::spawn(run_feed(
            ctx.live_connector(session.clone()),
            board,
            BackoffPolicy::default(),
            connected_tx,
            stop_rx,
        ))
    });

    let profile = session.profile();
    println!("Signed in as {} ({}). Type `help` for commands.", profile.name, profile.role);

    let mut exit: Result<(), ConsoleError> = Ok(());
    if let Err(e) = execute(&handle, ReplCommand::Refresh, false).await {
        exit = Err(e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while exit.is_ok() {
        let connected = *connected_rx.borrow();
        prompt(connected).await?;

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let connected = *connected_rx.borrow();
                match parse_command(&line) {
                    Ok(command) => match execute(&handle, command, connected).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => exit = Err(e),
                    },
                    Err(msg) => println!("{} {msg} (try `help`)", "?".yellow()),
                }
            }
            end = feed_finished(&mut feed) => {
                if let FeedEnd::AuthRejected(reason) = end {
                    println!();
                    session.expire();
                    exit = Err(ConsoleError::Auth(format!("live channel closed: {reason:?}")));
                }
            }
        }
    }

    stop_tx.send_replace(true);
    if let Some(task) = feed {
        let _ = task.await;
    }
    actor_ref.join().await;

    match exit {
        // The actor stops once the session ends; report that as the session
        // ending so the login hint is shown.
        Err(e) if !e.is_auth() && !session.is_active() => Err(ConsoleError::NoSession.into()),
        other => other.map_err(Into::into),
    }
}
