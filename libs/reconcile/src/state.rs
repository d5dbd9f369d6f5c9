//! Locally held allocation state.
//!
//! Each collection lives in its own [`Region`]: the last successfully fetched
//! value plus the most recent error. A failed fetch degrades only its own
//! region and never discards the last good data. Successful fetches replace
//! the whole collection; nothing is merged field by field.

use chrono::{DateTime, Utc};
use smartbed_id::{BedId, PatientId, WardId};

use crate::error::ConsoleError;
use crate::fetcher::{ResourceKind, Snapshot};
use crate::model::{Alert, Bed, BedStatus, Patient, Ward};
use crate::suggestions::{Suggestion, SuggestionStore};

/// One independently fetched slice of state.
#[derive(Debug, Clone)]
pub struct Region<T> {
    data: Option<T>,
    error: Option<ConsoleError>,
    fetched_at: Option<DateTime<Utc>>,
}

impl<T> Default for Region<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            fetched_at: None,
        }
    }
}

impl<T> Region<T> {
    /// Record a fetch outcome.
    pub fn apply(&mut self, result: Result<T, ConsoleError>) {
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.fetched_at = Some(Utc::now());
            }
            Err(e) => self.error = Some(e),
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ConsoleError> {
        self.error.as_ref()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Data is present and the last fetch succeeded.
    pub fn is_fresh(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }
}

/// Everything the console holds apart from the KPI slice.
#[derive(Debug, Default)]
pub struct AllocationState {
    pub queue: Region<Vec<Patient>>,
    pub beds: Region<Vec<Bed>>,
    pub wards: Region<Vec<Ward>>,
    pub alerts: Region<Vec<Alert>>,
    pub suggestions: SuggestionStore,
}

impl AllocationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a fetch outcome to its region.
    ///
    /// KPI snapshots are not held here; they are ignored and the caller
    /// hands them to the KPI board.
    pub fn apply(&mut self, kind: ResourceKind, result: Result<Snapshot, ConsoleError>) {
        match (kind, result) {
            (_, Ok(Snapshot::Queue(v))) => self.queue.apply(Ok(v)),
            (_, Ok(Snapshot::Beds(v))) => self.beds.apply(Ok(v)),
            (_, Ok(Snapshot::Wards(v))) => self.wards.apply(Ok(v)),
            (_, Ok(Snapshot::Alerts(v))) => self.alerts.apply(Ok(v)),
            (_, Ok(Snapshot::Kpis(_))) => {}
            (ResourceKind::Queue, Err(e)) => self.queue.apply(Err(e)),
            (ResourceKind::Beds, Err(e)) => self.beds.apply(Err(e)),
            (ResourceKind::Wards, Err(e)) => self.wards.apply(Err(e)),
            (ResourceKind::Alerts, Err(e)) => self.alerts.apply(Err(e)),
            (ResourceKind::Kpis, Err(_)) => {}
        }
    }

    /// Why a suggestion no longer matches the latest snapshots, if it doesn't.
    pub fn staleness(&self, suggestion: &Suggestion) -> Option<StaleReason> {
        if let Some(queue) = self.queue.data() {
            if !queue.iter().any(|p| p.id == suggestion.patient_id) {
                return Some(StaleReason::PatientNotQueued);
            }
        }
        if let Some(beds) = self.beds.data() {
            match beds.iter().find(|b| b.id == suggestion.bed_id) {
                None => return Some(StaleReason::BedUnknown),
                Some(bed) if !bed.is_available() => {
                    return Some(StaleReason::BedUnavailable(bed.status))
                }
                Some(_) => {}
            }
        }
        None
    }

    /// Check the cross-collection invariants against the latest snapshots.
    pub fn consistency_issues(&self) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();

        if let Some(beds) = self.beds.data() {
            for bed in beds.iter().filter(|b| !b.is_consistent()) {
                issues.push(ConsistencyIssue::BedOccupantMismatch {
                    bed_id: bed.id.clone(),
                    status: bed.status,
                });
            }

            if let Some(queue) = self.queue.data() {
                for bed in beds.iter().filter(|b| b.status == BedStatus::Occupied) {
                    let Some(occupant) = &bed.patient else { continue };
                    if queue.iter().any(|p| p.id == occupant.id) {
                        issues.push(ConsistencyIssue::PatientQueuedAndPlaced {
                            patient_id: occupant.id.clone(),
                            bed_id: bed.id.clone(),
                        });
                    }
                }
            }
        }

        if let Some(wards) = self.wards.data() {
            for ward in wards.iter().filter(|w| !w.is_consistent()) {
                issues.push(ConsistencyIssue::WardOverCapacity {
                    ward_id: ward.id.clone(),
                    occupancy: ward.current_occupancy,
                    capacity: ward.capacity,
                });
            }
        }

        issues
    }
}

/// Why a suggestion is flagged stale. Display only; stale suggestions can
/// still be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    PatientNotQueued,
    BedUnknown,
    BedUnavailable(BedStatus),
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PatientNotQueued => f.write_str("patient no longer queued"),
            Self::BedUnknown => f.write_str("bed not in inventory"),
            Self::BedUnavailable(status) => write!(f, "bed is {status}"),
        }
    }
}

/// A violated data-model invariant, reported rather than repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyIssue {
    BedOccupantMismatch { bed_id: BedId, status: BedStatus },
    PatientQueuedAndPlaced { patient_id: PatientId, bed_id: BedId },
    WardOverCapacity { ward_id: WardId, occupancy: u32, capacity: u32 },
}

impl std::fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BedOccupantMismatch { bed_id, status } => {
                write!(f, "bed {bed_id} is {status} but occupant does not match")
            }
            Self::PatientQueuedAndPlaced { patient_id, bed_id } => {
                write!(f, "patient {patient_id} is queued and placed in bed {bed_id}")
            }
            Self::WardOverCapacity {
                ward_id,
                occupancy,
                capacity,
            } => write!(f, "ward {ward_id} holds {occupancy} of {capacity}"),
        }
    }
}
