//! Reconciliation glue.
//!
//! [`Console`] owns the allocation state and is the single writer for it:
//! fetch results, optimizer runs and commits all go through `&mut self`.
//! [`ConsoleActor`] runs a console inside one task so other tasks (the REPL,
//! timers) reach it only through messages, one at a time.

use std::sync::Arc;

use async_trait::async_trait;
use smartbed_id::{BedId, PatientId};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::actor::{self, Actor, ActorHandle, ActorRef};
use crate::backend::{AssignReceipt, Backend};
use crate::committer::{AssignmentCommitter, BatchOutcome};
use crate::error::ConsoleError;
use crate::fetcher::{ResourceKind, Snapshot, SnapshotFetcher};
use crate::live::{KpiBoard, KpiState};
use crate::model::{Alert, Bed, Patient, Ward};
use crate::session::SessionContext;
use crate::state::{AllocationState, ConsistencyIssue, Region, StaleReason};
use crate::suggestions::{AllocationMetrics, Suggestion};

/// Per-resource outcome of a refresh.
pub type RefreshReport = Vec<(ResourceKind, Result<(), ConsoleError>)>;

/// The allocation console.
pub struct Console {
    session: SessionContext,
    backend: Arc<dyn Backend>,
    fetcher: SnapshotFetcher,
    committer: AssignmentCommitter,
    state: AllocationState,
    kpis: KpiBoard,
}

impl Console {
    pub fn new(backend: Arc<dyn Backend>, session: SessionContext, kpis: KpiBoard) -> Self {
        Self {
            fetcher: SnapshotFetcher::new(backend.clone(), session.clone()),
            committer: AssignmentCommitter::new(backend.clone(), session.clone()),
            session,
            backend,
            state: AllocationState::new(),
            kpis,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn state(&self) -> &AllocationState {
        &self.state
    }

    pub fn kpis(&self) -> &KpiBoard {
        &self.kpis
    }

    /// Fetch the given collections concurrently and apply each result to its
    /// own region.
    pub async fn refresh(&mut self, kinds: &[ResourceKind]) -> RefreshReport {
        let results = self.fetcher.fetch_many(kinds).await;

        let mut report = Vec::with_capacity(results.len());
        for (kind, result) in results {
            let summary = result.as_ref().map(|_| ()).map_err(Clone::clone);
            match result {
                Ok(Snapshot::Kpis(kpis)) => self.kpis.replace(Ok(kpis)),
                Err(e) if kind == ResourceKind::Kpis => self.kpis.replace(Err(e)),
                other => self.state.apply(kind, other),
            }
            report.push((kind, summary));
        }

        for issue in self.state.consistency_issues() {
            warn!(issue = %issue, "Snapshot inconsistency");
        }
        report
    }

    pub async fn refresh_all(&mut self) -> RefreshReport {
        self.refresh(&ResourceKind::ALL).await
    }

    /// Run the optimizer and install its output, replacing any previous set.
    /// Returns the number of pairings installed.
    pub async fn optimize(&mut self) -> Result<usize, ConsoleError> {
        self.session.token()?;
        let set = self.session.observe(self.backend.optimize().await)?;

        let count = set.len();
        let generation = self.state.suggestions.replace(set);
        info!(generation, pairings = count, "Optimizer run installed");
        Ok(count)
    }

    /// Commit an arbitrary pairing.
    pub async fn accept(
        &mut self,
        patient_id: PatientId,
        bed_id: BedId,
        priority_override: bool,
    ) -> Result<AssignReceipt, ConsoleError> {
        self.committer
            .commit_one(&mut self.state, patient_id, bed_id, priority_override)
            .await
    }

    /// Commit the suggested bed for one patient.
    pub async fn accept_suggestion(
        &mut self,
        patient_id: &PatientId,
        priority_override: bool,
    ) -> Result<AssignReceipt, ConsoleError> {
        let suggestion = self
            .state
            .suggestions
            .get(patient_id)
            .cloned()
            .ok_or_else(|| {
                ConsoleError::Invalid(format!("no suggestion for patient {patient_id}"))
            })?;

        self.accept(suggestion.patient_id, suggestion.bed_id, priority_override)
            .await
    }

    /// Commit every live suggestion.
    pub async fn accept_all(&mut self, priority_override: bool) -> BatchOutcome {
        self.committer
            .commit_all(&mut self.state, priority_override)
            .await
    }

    /// Drop the live suggestion set without committing.
    pub fn discard_suggestions(&mut self) {
        self.state.suggestions.clear();
    }

    /// Immutable snapshot for rendering.
    pub fn view(&self) -> ConsoleView {
        let suggestions = self
            .state
            .suggestions
            .entries()
            .into_iter()
            .map(|suggestion| SuggestionRow {
                stale: self.state.staleness(&suggestion),
                suggestion,
            })
            .collect();

        let live_set = self.state.suggestions.current();
        ConsoleView {
            queue: self.state.queue.clone(),
            beds: self.state.beds.clone(),
            wards: self.state.wards.clone(),
            alerts: self.state.alerts.clone(),
            suggestions,
            objective_value: live_set.and_then(|s| s.objective_value()),
            metrics: live_set.map(|s| s.metrics().clone()),
            suggestion_generation: self.state.suggestions.generation(),
            issues: self.state.consistency_issues(),
            kpis: self.kpis.current(),
        }
    }
}

/// A suggestion with its staleness against the latest snapshots.
#[derive(Debug, Clone)]
pub struct SuggestionRow {
    pub suggestion: Suggestion,
    pub stale: Option<StaleReason>,
}

/// Render snapshot of the console.
#[derive(Debug, Clone)]
pub struct ConsoleView {
    pub queue: Region<Vec<Patient>>,
    pub beds: Region<Vec<Bed>>,
    pub wards: Region<Vec<Ward>>,
    pub alerts: Region<Vec<Alert>>,
    pub suggestions: Vec<SuggestionRow>,
    pub objective_value: Option<f64>,
    pub metrics: Option<AllocationMetrics>,
    pub suggestion_generation: u64,
    pub issues: Vec<ConsistencyIssue>,
    pub kpis: KpiState,
}

impl ConsoleView {
    pub fn available_beds(&self) -> impl Iterator<Item = &Bed> {
        self.beds
            .data()
            .into_iter()
            .flatten()
            .filter(|b| b.is_available())
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Messages accepted by [`ConsoleActor`].
#[derive(Debug)]
pub enum ConsoleCommand {
    Refresh {
        kinds: Vec<ResourceKind>,
        reply: oneshot::Sender<RefreshReport>,
    },
    Optimize {
        reply: oneshot::Sender<Result<usize, ConsoleError>>,
    },
    Accept {
        patient_id: PatientId,
        bed_id: Option<BedId>,
        priority_override: bool,
        reply: oneshot::Sender<Result<AssignReceipt, ConsoleError>>,
    },
    AcceptAll {
        priority_override: bool,
        reply: oneshot::Sender<BatchOutcome>,
    },
    Discard,
    View {
        reply: oneshot::Sender<ConsoleView>,
    },
}

/// Runs a [`Console`] as the sole owner of its state.
pub struct ConsoleActor {
    console: Console,
}

impl ConsoleActor {
    pub fn new(console: Console) -> Self {
        Self { console }
    }

    /// Spawn the actor. Stop it through the returned [`ActorRef`].
    pub fn spawn(console: Console, mailbox_size: usize) -> (ConsoleHandle, ActorRef) {
        let (inner, actor_ref) = actor::spawn(Self::new(console), mailbox_size);
        (ConsoleHandle { inner }, actor_ref)
    }
}

#[async_trait]
impl Actor for ConsoleActor {
    type Message = ConsoleCommand;

    fn name(&self) -> &str {
        "console"
    }

    async fn handle(&mut self, msg: ConsoleCommand) -> bool {
        // Replies are dropped silently if the caller went away.
        match msg {
            ConsoleCommand::Refresh { kinds, reply } => {
                let _ = reply.send(self.console.refresh(&kinds).await);
            }
            ConsoleCommand::Optimize { reply } => {
                let _ = reply.send(self.console.optimize().await);
            }
            ConsoleCommand::Accept {
                patient_id,
                bed_id: Some(bed_id),
                priority_override,
                reply,
            } => {
                let result = self
                    .console
                    .accept(patient_id, bed_id, priority_override)
                    .await;
                let _ = reply.send(result);
            }
            ConsoleCommand::Accept {
                patient_id,
                bed_id: None,
                priority_override,
                reply,
            } => {
                let result = self
                    .console
                    .accept_suggestion(&patient_id, priority_override)
                    .await;
                let _ = reply.send(result);
            }
            ConsoleCommand::AcceptAll {
                priority_override,
                reply,
            } => {
                let _ = reply.send(self.console.accept_all(priority_override).await);
            }
            ConsoleCommand::Discard => self.console.discard_suggestions(),
            ConsoleCommand::View { reply } => {
                let _ = reply.send(self.console.view());
            }
        }

        // A dead session ends the console; the caller must log in again.
        if !self.console.session().is_active() {
            debug!("Session no longer active, stopping console");
            return false;
        }
        true
    }
}

/// Cloneable handle to a running [`ConsoleActor`].
#[derive(Clone)]
pub struct ConsoleHandle {
    inner: ActorHandle<ConsoleCommand>,
}

impl ConsoleHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ConsoleCommand,
    ) -> Result<T, ConsoleError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .send(build(tx))
            .await
            .map_err(|_| ConsoleError::ConsoleStopped)?;
        rx.await.map_err(|_| ConsoleError::ConsoleStopped)
    }

    pub async fn refresh(&self, kinds: &[ResourceKind]) -> Result<RefreshReport, ConsoleError> {
        let kinds = kinds.to_vec();
        self.request(|reply| ConsoleCommand::Refresh { kinds, reply })
            .await
    }

    pub async fn refresh_all(&self) -> Result<RefreshReport, ConsoleError> {
        self.refresh(&ResourceKind::ALL).await
    }

    pub async fn optimize(&self) -> Result<usize, ConsoleError> {
        self.request(|reply| ConsoleCommand::Optimize { reply })
            .await?
    }

    /// Commit a pairing. With `bed_id` absent, the suggested bed is used.
    pub async fn accept(
        &self,
        patient_id: PatientId,
        bed_id: Option<BedId>,
        priority_override: bool,
    ) -> Result<AssignReceipt, ConsoleError> {
        self.request(|reply| ConsoleCommand::Accept {
            patient_id,
            bed_id,
            priority_override,
            reply,
        })
        .await?
    }

    pub async fn accept_all(&self, priority_override: bool) -> Result<BatchOutcome, ConsoleError> {
        self.request(|reply| ConsoleCommand::AcceptAll {
            priority_override,
            reply,
        })
        .await
    }

    pub async fn discard_suggestions(&self) -> Result<(), ConsoleError> {
        self.inner
            .send(ConsoleCommand::Discard)
            .await
            .map_err(|_| ConsoleError::ConsoleStopped)
    }

    pub async fn view(&self) -> Result<ConsoleView, ConsoleError> {
        self.request(|reply| ConsoleCommand::View { reply }).await
    }
}
