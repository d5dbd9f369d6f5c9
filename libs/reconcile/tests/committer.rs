//! Integration tests for single and batch accept.
//!
//! These exercise the partial-failure policy against an in-process backend
//! that actually moves patients into beds.

mod support;

use std::time::Duration;

use rstest::rstest;
use smartbed_id::PatientId;
use smartbed_reconcile::model::{BedStatus, TriageLevel};
use smartbed_reconcile::{AllocationState, AssignmentCommitter, ConsoleError, SessionState};
use support::{bed, conflict, patient, session, suggestions, Event, FakeBackend};

fn pid(s: &str) -> PatientId {
    s.parse().unwrap()
}

fn remaining(state: &AllocationState) -> Vec<String> {
    state
        .suggestions
        .entries()
        .into_iter()
        .map(|s| s.patient_id.to_string())
        .collect()
}

#[tokio::test]
async fn test_single_accept_removes_entry_and_refetches_once() {
    let backend = FakeBackend::new(
        vec![patient("P1", TriageLevel::Red), patient("P2", TriageLevel::Yellow)],
        vec![bed("B1"), bed("B2")],
    );
    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();
    state.suggestions.replace(suggestions(&[("P1", "B1"), ("P2", "B2")]));

    committer
        .commit_one(&mut state, pid("P1"), "B1".parse().unwrap(), false)
        .await
        .unwrap();

    assert_eq!(remaining(&state), vec!["P2"]);
    assert_eq!(backend.queue_fetches(), 1);
    assert_eq!(backend.bed_fetches(), 1);

    // Local state reflects the authoritative re-read, not a local guess.
    let queue = state.queue.data().unwrap();
    assert_eq!(queue.len(), 1);
    let b1 = state
        .beds
        .data()
        .unwrap()
        .iter()
        .find(|b| b.id.as_str() == "B1")
        .unwrap();
    assert_eq!(b1.status, BedStatus::Occupied);
}

#[tokio::test]
async fn test_single_failure_changes_nothing_and_skips_refetch() {
    let backend = FakeBackend::new(
        vec![patient("P1", TriageLevel::Red), patient("P2", TriageLevel::Yellow)],
        vec![bed("B1"), bed("B2")],
    );
    backend.reject_bed("B1", conflict());
    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();
    state.suggestions.replace(suggestions(&[("P1", "B1"), ("P2", "B2")]));

    let err = committer
        .commit_one(&mut state, pid("P1"), "B1".parse().unwrap(), false)
        .await
        .unwrap_err();

    assert_eq!(err, conflict());
    assert_eq!(remaining(&state), vec!["P1", "P2"]);
    assert_eq!(backend.queue_fetches(), 0);
    assert_eq!(backend.bed_fetches(), 0);
}

#[tokio::test]
async fn test_partial_batch_keeps_failed_pairing() {
    // queue = [P1 (Red), P2 (Yellow)], {P1->B1, P2->B2}, B2 no longer available.
    let backend = FakeBackend::new(
        vec![patient("P1", TriageLevel::Red), patient("P2", TriageLevel::Yellow)],
        vec![bed("B1"), bed("B2")],
    );
    backend.reject_bed("B2", conflict());
    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();
    state.suggestions.replace(suggestions(&[("P1", "B1"), ("P2", "B2")]));

    let outcome = committer.commit_all(&mut state, false).await;

    assert_eq!(outcome.attempted(), 2);
    assert_eq!(outcome.succeeded(), 1);
    assert!(outcome.is_partial_failure());
    assert_eq!(remaining(&state), vec!["P2"]);

    // One fewer patient waiting; P1's placement was not rolled back.
    assert_eq!(state.queue.data().unwrap().len(), 1);
    assert_eq!(backend.queue_ids(), vec!["P2"]);
    assert_eq!(backend.queue_fetches(), 1);
    assert_eq!(backend.bed_fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_batch_attempts_every_pairing_then_refetches_once() {
    let backend = FakeBackend::new(
        vec![
            patient("P1", TriageLevel::Red),
            patient("P2", TriageLevel::Yellow),
            patient("P3", TriageLevel::Green),
        ],
        vec![bed("B1"), bed("B2"), bed("B3")],
    );
    backend.reject_bed("B2", conflict());
    // Completions land out of insertion order.
    backend.delay_bed("B1", Duration::from_millis(300));
    backend.delay_bed("B3", Duration::from_millis(100));

    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();
    state
        .suggestions
        .replace(suggestions(&[("P1", "B1"), ("P2", "B2"), ("P3", "B3")]));

    let outcome = committer.commit_all(&mut state, false).await;

    assert_eq!(backend.assign_calls(), 3);
    assert_eq!(outcome.attempted(), 3);
    assert_eq!(outcome.failed(), 1);
    assert_eq!(remaining(&state), vec!["P2"]);
    assert_eq!(backend.queue_fetches(), 1);
    assert_eq!(backend.bed_fetches(), 1);

    let events = backend.events();
    let started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::AssignStarted(p) => Some(p.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["P1", "P2", "P3"]);

    // Barrier: no fetch before the last settlement.
    let last_settled = events
        .iter()
        .rposition(|e| matches!(e, Event::AssignSettled(_)))
        .unwrap();
    let first_fetch = events
        .iter()
        .position(|e| matches!(e, Event::Fetched(_)))
        .unwrap();
    assert!(first_fetch > last_settled);
}

#[rstest]
#[case::none_fail(&[], 0)]
#[case::one_fails(&["B2"], 1)]
#[case::two_fail(&["B1", "B4"], 2)]
#[case::all_fail(&["B1", "B2", "B3", "B4"], 4)]
#[tokio::test]
async fn test_batch_removes_exactly_the_successes(#[case] failing: &[&str], #[case] k: usize) {
    let ids = ["P1", "P2", "P3", "P4"];
    let beds = ["B1", "B2", "B3", "B4"];
    let backend = FakeBackend::new(
        ids.iter().map(|p| patient(p, TriageLevel::Yellow)).collect(),
        beds.iter().map(|b| bed(b)).collect(),
    );
    for b in failing {
        backend.reject_bed(b, conflict());
    }

    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();
    let pairs: Vec<(&str, &str)> = ids.iter().copied().zip(beds.iter().copied()).collect();
    state.suggestions.replace(suggestions(&pairs));

    let outcome = committer.commit_all(&mut state, false).await;

    assert_eq!(outcome.attempted(), 4);
    assert_eq!(outcome.failed(), k);
    assert_eq!(state.suggestions.len(), k);
    // Cleared as a whole iff nothing failed.
    assert_eq!(state.suggestions.is_empty(), k == 0);
    assert_eq!(backend.queue_fetches(), 1);
    assert_eq!(backend.bed_fetches(), 1);

    let kept: Vec<String> = outcome
        .failures()
        .map(|r| r.suggestion.bed_id.to_string())
        .collect();
    assert_eq!(kept, failing.iter().map(|b| b.to_string()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let backend = FakeBackend::new(vec![], vec![bed("B1")]);
    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();

    let outcome = committer.commit_all(&mut state, false).await;

    assert_eq!(outcome.attempted(), 0);
    assert!(!outcome.resynced);
    assert_eq!(backend.assign_calls(), 0);
    assert_eq!(backend.queue_fetches(), 0);
}

#[tokio::test]
async fn test_failed_refetch_degrades_only_that_region() {
    let backend = FakeBackend::new(
        vec![patient("P1", TriageLevel::Red)],
        vec![bed("B1")],
    );
    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();
    state.suggestions.replace(suggestions(&[("P1", "B1")]));
    backend.fail_fetch(smartbed_reconcile::ResourceKind::Queue);

    committer
        .commit_one(&mut state, pid("P1"), "B1".parse().unwrap(), false)
        .await
        .unwrap();

    assert!(state.queue.error().is_some());
    assert!(state.beds.is_fresh());
    assert!(state.suggestions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_expires_session_without_stopping_batch() {
    let backend = FakeBackend::new(
        vec![patient("P1", TriageLevel::Red), patient("P2", TriageLevel::Red)],
        vec![bed("B1"), bed("B2")],
    );
    backend.reject_bed("B1", ConsoleError::Auth("token expired".into()));
    backend.delay_bed("B1", Duration::from_millis(50));
    let session = session();
    let committer = AssignmentCommitter::new(backend.clone(), session.clone());
    let mut state = AllocationState::new();
    state.suggestions.replace(suggestions(&[("P1", "B1"), ("P2", "B2")]));

    let outcome = committer.commit_all(&mut state, false).await;

    // Both were dispatched before the rejection was known.
    assert_eq!(backend.assign_calls(), 2);
    assert_eq!(outcome.attempted(), 2);
    assert_eq!(session.state(), SessionState::Expired);
    assert_eq!(remaining(&state), vec!["P1"]);
    // The re-fetch ran but could not authenticate.
    assert_eq!(state.queue.error(), Some(&ConsoleError::NoSession));
}

#[tokio::test]
async fn test_retry_within_a_run_reuses_the_idempotency_key() {
    let backend = FakeBackend::new(
        vec![patient("P1", TriageLevel::Red)],
        vec![bed("B1"), bed("B2")],
    );
    backend.reject_bed("B1", conflict());
    let committer = AssignmentCommitter::new(backend.clone(), session());
    let mut state = AllocationState::new();
    state.suggestions.replace(suggestions(&[("P1", "B1")]));

    // The same pairing from the same run: batch, then an operator retry.
    committer.commit_all(&mut state, false).await;
    let _ = committer
        .commit_one(&mut state, pid("P1"), "B1".parse().unwrap(), false)
        .await;

    // A fresh optimizer run proposing the identical pairing.
    state.suggestions.replace(suggestions(&[("P1", "B1")]));
    let _ = committer.commit_all(&mut state, false).await;

    // A manual pick of a bed the run did not suggest.
    let _ = committer
        .commit_one(&mut state, pid("P1"), "B2".parse().unwrap(), false)
        .await;

    let keys = backend.assign_keys();
    assert_eq!(keys.len(), 4);
    assert_eq!(keys[0], keys[1]);
    assert_ne!(keys[1], keys[2]);
    assert_ne!(keys[2], keys[3]);
}
