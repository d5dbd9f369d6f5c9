//! In-process backend and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use smartbed_id::{BedId, PatientId, WardId};
use smartbed_reconcile::idempotency::assign_key;
use smartbed_reconcile::model::{
    AcuityScore, Alert, Bed, BedCategory, BedStatus, Kpis, Patient, PatientStatus, TriageLevel,
    WaitDuration, Ward,
};
use smartbed_reconcile::session::{EphemeralStore, Role, StoredSession, UserProfile};
use smartbed_reconcile::suggestions::{AllocationMetrics, Suggestion, SuggestionSet};
use smartbed_reconcile::{
    AssignReceipt, AssignRequest, Backend, ConsoleError, ResourceKind, SessionContext,
};

/// Things the fake backend observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AssignStarted(String),
    AssignSettled(String),
    Fetched(ResourceKind),
}

#[derive(Default)]
struct World {
    queue: Vec<Patient>,
    beds: Vec<Bed>,
    wards: Vec<Ward>,
    alerts: Vec<Alert>,
    kpis: Kpis,
    next_run: Option<SuggestionSet>,
}

/// A backend that behaves like the real one for assignments: a successful
/// assign moves the patient out of the queue and into the bed.
#[derive(Default)]
pub struct FakeBackend {
    world: Mutex<World>,
    rejected_beds: Mutex<HashMap<BedId, ConsoleError>>,
    failing_kinds: Mutex<HashSet<ResourceKind>>,
    assign_delays: Mutex<HashMap<BedId, Duration>>,
    events: Mutex<Vec<Event>>,
    assign_keys: Mutex<Vec<String>>,
    queue_fetches: AtomicUsize,
    bed_fetches: AtomicUsize,
    assign_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(queue: Vec<Patient>, beds: Vec<Bed>) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut world = backend.world.lock().unwrap();
            world.queue = queue;
            world.beds = beds;
        }
        Arc::new(backend)
    }

    pub fn with_wards(self: Arc<Self>, wards: Vec<Ward>) -> Arc<Self> {
        self.world.lock().unwrap().wards = wards;
        self
    }

    pub fn set_next_run(&self, set: SuggestionSet) {
        self.world.lock().unwrap().next_run = Some(set);
    }

    pub fn set_kpis(&self, kpis: Kpis) {
        self.world.lock().unwrap().kpis = kpis;
    }

    /// Make assigning `bed` fail with `error`.
    pub fn reject_bed(&self, bed: &str, error: ConsoleError) {
        self.rejected_beds
            .lock()
            .unwrap()
            .insert(bed.parse().unwrap(), error);
    }

    /// Make fetches of `kind` fail with a network error.
    pub fn fail_fetch(&self, kind: ResourceKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    pub fn heal_fetch(&self, kind: ResourceKind) {
        self.failing_kinds.lock().unwrap().remove(&kind);
    }

    /// Delay the completion of assignments to `bed`.
    pub fn delay_bed(&self, bed: &str, delay: Duration) {
        self.assign_delays
            .lock()
            .unwrap()
            .insert(bed.parse().unwrap(), delay);
    }

    pub fn queue_fetches(&self) -> usize {
        self.queue_fetches.load(Ordering::SeqCst)
    }

    pub fn bed_fetches(&self) -> usize {
        self.bed_fetches.load(Ordering::SeqCst)
    }

    pub fn assign_calls(&self) -> usize {
        self.assign_calls.load(Ordering::SeqCst)
    }

    /// Idempotency keys of every assign received, in arrival order.
    pub fn assign_keys(&self) -> Vec<String> {
        self.assign_keys.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn queue_ids(&self) -> Vec<String> {
        self.world
            .lock()
            .unwrap()
            .queue
            .iter()
            .map(|p| p.id.to_string())
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn check_fetch(&self, kind: ResourceKind) -> Result<(), ConsoleError> {
        self.record(Event::Fetched(kind));
        if self.failing_kinds.lock().unwrap().contains(&kind) {
            return Err(ConsoleError::Network(format!("{kind} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn patient_queue(&self) -> Result<Vec<Patient>, ConsoleError> {
        self.queue_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_fetch(ResourceKind::Queue)?;
        Ok(self.world.lock().unwrap().queue.clone())
    }

    async fn beds(&self) -> Result<Vec<Bed>, ConsoleError> {
        self.bed_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_fetch(ResourceKind::Beds)?;
        Ok(self.world.lock().unwrap().beds.clone())
    }

    async fn wards(&self) -> Result<Vec<Ward>, ConsoleError> {
        self.check_fetch(ResourceKind::Wards)?;
        Ok(self.world.lock().unwrap().wards.clone())
    }

    async fn kpis(&self) -> Result<Kpis, ConsoleError> {
        self.check_fetch(ResourceKind::Kpis)?;
        Ok(self.world.lock().unwrap().kpis.clone())
    }

    async fn alerts(&self) -> Result<Vec<Alert>, ConsoleError> {
        self.check_fetch(ResourceKind::Alerts)?;
        Ok(self.world.lock().unwrap().alerts.clone())
    }

    async fn optimize(&self) -> Result<SuggestionSet, ConsoleError> {
        self.world
            .lock()
            .unwrap()
            .next_run
            .take()
            .ok_or_else(|| ConsoleError::rejected(400, "No patients in queue"))
    }

    async fn assign(&self, request: &AssignRequest) -> Result<AssignReceipt, ConsoleError> {
        self.assign_calls.fetch_add(1, Ordering::SeqCst);
        self.assign_keys.lock().unwrap().push(assign_key(request));
        self.record(Event::AssignStarted(request.patient_id.to_string()));

        let delay = self.assign_delays.lock().unwrap().get(&request.bed_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rejected = self.rejected_beds.lock().unwrap().get(&request.bed_id).cloned();
        let result = match rejected {
            Some(error) => Err(error),
            None => self.place(request),
        };

        self.record(Event::AssignSettled(request.patient_id.to_string()));
        result
    }
}

impl FakeBackend {
    fn place(&self, request: &AssignRequest) -> Result<AssignReceipt, ConsoleError> {
        let mut world = self.world.lock().unwrap();

        let idx = world
            .queue
            .iter()
            .position(|p| p.id == request.patient_id)
            .ok_or_else(|| ConsoleError::rejected(404, "Patient not found"))?;
        let bed = world
            .beds
            .iter()
            .position(|b| b.id == request.bed_id)
            .ok_or_else(|| ConsoleError::rejected(404, "Bed not found"))?;
        if world.beds[bed].status == BedStatus::Occupied {
            return Err(ConsoleError::rejected(400, "Bed is already occupied"));
        }

        let mut patient = world.queue.remove(idx);
        patient.status = Some(PatientStatus::Assigned);
        world.beds[bed].status = BedStatus::Occupied;
        world.beds[bed].patient = Some(patient);

        Ok(AssignReceipt {
            status: Some("success".into()),
            patient_id: Some(request.patient_id.clone()),
            bed_id: Some(request.bed_id.clone()),
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn session() -> SessionContext {
    session_with_role(Role::Manager)
}

pub fn session_with_role(role: Role) -> SessionContext {
    SessionContext::from_stored(
        StoredSession {
            token: "test-token".into(),
            profile: UserProfile {
                name: "Test Operator".into(),
                role,
                email: None,
            },
        },
        Arc::new(EphemeralStore),
    )
}

pub fn patient(id: &str, triage: TriageLevel) -> Patient {
    Patient {
        id: id.parse().unwrap(),
        name: format!("Patient {id}"),
        age: 54,
        condition: "Chest pain".into(),
        triage_level: triage,
        acuity_score: AcuityScore::new(60).unwrap(),
        status: Some(PatientStatus::InQueue),
        wait_time: WaitDuration::from_minutes(12),
    }
}

pub fn bed(id: &str) -> Bed {
    Bed {
        id: id.parse().unwrap(),
        ward_id: "W-1".parse::<WardId>().unwrap(),
        ward_name: Some("General Medicine".into()),
        bed_type: BedCategory::General,
        status: BedStatus::Available,
        patient: None,
    }
}

pub fn ward(id: &str, capacity: u32, occupancy: u32) -> Ward {
    Ward {
        id: id.parse().unwrap(),
        name: format!("Ward {id}"),
        capacity,
        current_occupancy: occupancy,
        occupancy_rate: None,
        staff_ratio: None,
    }
}

pub fn suggestions(pairs: &[(&str, &str)]) -> SuggestionSet {
    let entries = pairs
        .iter()
        .map(|(p, b)| Suggestion::new(p.parse::<PatientId>().unwrap(), b.parse::<BedId>().unwrap()))
        .collect();
    SuggestionSet::new(entries, Some(100.0), AllocationMetrics::default()).unwrap()
}

pub fn conflict() -> ConsoleError {
    ConsoleError::rejected(400, "Bed is already occupied")
}

pub fn kpis(total: u32, occupied: u32) -> Kpis {
    Kpis {
        total_beds: total,
        occupied_beds: occupied,
        occupancy_rate: if total == 0 { 0 } else { occupied * 100 / total },
        ..Kpis::default()
    }
}
