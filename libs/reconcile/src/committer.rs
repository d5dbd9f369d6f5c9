//! Turning suggestions into real assignments.
//!
//! The committer never predicts the resulting bed or patient status. After a
//! successful commit it re-reads the queue and bed inventory, because the
//! backend may apply side effects beyond the single assignment.
//!
//! Batch policy:
//!
//! ```text
//! entries (insertion order) --fan out--> assign, assign, assign ...
//!                                             |
//!                                   barrier: all outcomes known
//!                                             |
//!               remove each success, keep each failure, clear iff none failed
//!                                             |
//!                                   exactly one queue+beds re-fetch
//! ```

use std::sync::Arc;

use futures_util::future::join_all;
use smartbed_id::{BedId, PatientId};
use tracing::{info, warn};

use crate::backend::{AssignReceipt, AssignRequest, Backend};
use crate::error::ConsoleError;
use crate::fetcher::{Resync, SnapshotFetcher};
use crate::session::SessionContext;
use crate::state::AllocationState;
use crate::suggestions::Suggestion;

/// Outcome of one attempted pairing.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub suggestion: Suggestion,
    pub outcome: Result<AssignReceipt, ConsoleError>,
}

impl CommitResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Aggregate of a batch accept.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Per-pairing results, in attempt order.
    pub results: Vec<CommitResult>,

    /// Whether the post-batch re-fetch ran. False only for an empty batch.
    pub resynced: bool,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    /// Some, but not all, pairings failed. Not an error; the remainder is
    /// left in the suggestion set for the operator.
    pub fn is_partial_failure(&self) -> bool {
        self.failed() > 0 && self.succeeded() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommitResult> {
        self.results.iter().filter(|r| !r.succeeded())
    }
}

/// Executes single and batch accepts against the backend.
#[derive(Clone)]
pub struct AssignmentCommitter {
    backend: Arc<dyn Backend>,
    session: SessionContext,
    fetcher: SnapshotFetcher,
}

impl AssignmentCommitter {
    pub fn new(backend: Arc<dyn Backend>, session: SessionContext) -> Self {
        let fetcher = SnapshotFetcher::new(backend.clone(), session.clone());
        Self {
            backend,
            session,
            fetcher,
        }
    }

    /// Commit one pairing.
    ///
    /// On success the pairing is removed from the suggestion set and queue
    /// and beds are re-fetched once. On failure nothing local changes and no
    /// re-fetch happens.
    pub async fn commit_one(
        &self,
        state: &mut AllocationState,
        patient_id: PatientId,
        bed_id: BedId,
        priority_override: bool,
    ) -> Result<AssignReceipt, ConsoleError> {
        let suggested = state
            .suggestions
            .get(&patient_id)
            .is_some_and(|s| s.bed_id == bed_id);
        let plan = state.suggestions.plan_id().filter(|_| suggested);
        let request = AssignRequest::new(patient_id, bed_id, priority_override).with_plan(plan);
        let receipt = self.send(&request).await?;

        state.suggestions.remove(&request.patient_id);
        info!(
            patient_id = %request.patient_id,
            bed_id = %request.bed_id,
            "Assignment committed"
        );

        self.apply_resync(state).await;
        Ok(receipt)
    }

    /// Commit every pairing in the live suggestion set.
    ///
    /// Each pairing is attempted independently; a failure never skips the
    /// rest. Nothing is removed and nothing is re-fetched until every
    /// outcome is known. An empty or absent set is a no-op.
    pub async fn commit_all(
        &self,
        state: &mut AllocationState,
        priority_override: bool,
    ) -> BatchOutcome {
        let entries = state.suggestions.entries();
        if entries.is_empty() {
            return BatchOutcome::default();
        }
        let plan = state.suggestions.plan_id();

        // join_all polls in order, so requests are dispatched in insertion
        // order; completions may interleave.
        let attempts = entries.into_iter().map(|suggestion| async move {
            let request = AssignRequest::new(
                suggestion.patient_id.clone(),
                suggestion.bed_id.clone(),
                priority_override,
            )
            .with_plan(plan);
            let outcome = self.send(&request).await;
            CommitResult {
                suggestion,
                outcome,
            }
        });
        let results = join_all(attempts).await;

        for result in &results {
            match &result.outcome {
                Ok(_) => {
                    state.suggestions.remove(&result.suggestion.patient_id);
                }
                Err(e) => warn!(
                    patient_id = %result.suggestion.patient_id,
                    bed_id = %result.suggestion.bed_id,
                    error = %e,
                    "Pairing left for retry"
                ),
            }
        }

        let outcome = BatchOutcome {
            results,
            resynced: true,
        };
        if outcome.failed() == 0 {
            state.suggestions.clear();
        }

        info!(
            attempted = outcome.attempted(),
            succeeded = outcome.succeeded(),
            "Batch accept settled"
        );

        self.apply_resync(state).await;
        outcome
    }

    async fn send(&self, request: &AssignRequest) -> Result<AssignReceipt, ConsoleError> {
        self.session.token()?;
        let result = self.backend.assign(request).await;
        if let Err(e) = &result {
            warn!(
                patient_id = %request.patient_id,
                bed_id = %request.bed_id,
                error = %e,
                "Assignment failed"
            );
        }
        self.session.observe(result)
    }

    async fn apply_resync(&self, state: &mut AllocationState) {
        let Resync { queue, beds } = self.fetcher.resync().await;
        state.queue.apply(queue);
        state.beds.apply(beds);
    }
}
