//! Idempotency keys for assignment posts.
//!
//! A key is stable for one pairing drawn from one optimizer run, so resending
//! that pairing cannot double-book. A later run of the optimizer yields new
//! keys for the same patient and bed, and every manual pick gets its own.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::backend::AssignRequest;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Key for `POST /api/patients/{id}/assign`.
pub fn assign_key(request: &AssignRequest) -> String {
    let origin = match request.plan {
        Some(plan) => format!("plan:{plan}"),
        None => format!("manual:{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
    };
    let mode = if request.priority_override {
        "override"
    } else {
        "standard"
    };

    let mut hasher = Sha256::new();
    for part in [
        "patients.assign",
        request.patient_id.as_str(),
        request.bed_id.as_str(),
        mode,
        origin.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }

    format!("sb_{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestions::{AllocationMetrics, Suggestion, SuggestionSet, SuggestionStore};

    fn request(bed: &str, priority_override: bool) -> AssignRequest {
        AssignRequest::new("P-1".parse().unwrap(), bed.parse().unwrap(), priority_override)
    }

    fn install(store: &mut SuggestionStore) {
        let set = SuggestionSet::new(
            vec![Suggestion::new("P-1".parse().unwrap(), "B-1".parse().unwrap())],
            None,
            AllocationMetrics::default(),
        )
        .unwrap();
        store.replace(set);
    }

    #[test]
    fn test_same_run_same_key() {
        let mut store = SuggestionStore::new();
        install(&mut store);
        let plan = store.plan_id();

        let a = assign_key(&request("B-1", false).with_plan(plan));
        let b = assign_key(&request("B-1", false).with_plan(plan));
        assert_eq!(a, b);
        assert!(a.starts_with("sb_") && a.len() <= 128);
    }

    #[test]
    fn test_key_depends_on_pairing() {
        let mut store = SuggestionStore::new();
        install(&mut store);
        let plan = store.plan_id();

        let base = assign_key(&request("B-1", false).with_plan(plan));
        assert_ne!(base, assign_key(&request("B-2", false).with_plan(plan)));
        assert_ne!(base, assign_key(&request("B-1", true).with_plan(plan)));
    }

    #[test]
    fn test_new_run_gets_new_key_for_same_pair() {
        let mut store = SuggestionStore::new();
        install(&mut store);
        let first = assign_key(&request("B-1", false).with_plan(store.plan_id()));

        install(&mut store);
        let second = assign_key(&request("B-1", false).with_plan(store.plan_id()));
        assert_ne!(first, second);
    }
}
