//! The backend seam.
//!
//! Everything the core needs from the server, one method per endpoint. The
//! production implementation is [`crate::http::HttpBackend`]; tests supply
//! in-process fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smartbed_id::{BedId, PatientId};

use crate::error::ConsoleError;
use crate::model::{Alert, Bed, Kpis, Patient, Ward};
use crate::suggestions::{PlanId, SuggestionSet};

/// Body of `POST /api/patients/{id}/assign`. The patient travels in the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignRequest {
    #[serde(skip)]
    pub patient_id: PatientId,
    pub bed_id: BedId,
    pub priority_override: bool,
    /// The optimizer run this pairing came from; `None` for manual picks.
    #[serde(skip)]
    pub plan: Option<PlanId>,
}

impl AssignRequest {
    pub fn new(patient_id: PatientId, bed_id: BedId, priority_override: bool) -> Self {
        Self {
            patient_id,
            bed_id,
            priority_override,
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: Option<PlanId>) -> Self {
        self.plan = plan;
        self
    }
}

/// Backend acknowledgement of an assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignReceipt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub patient_id: Option<PatientId>,
    #[serde(default)]
    pub bed_id: Option<BedId>,
}

/// Authoritative backend operations consumed by the core.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// `GET /api/patients/queue`
    async fn patient_queue(&self) -> Result<Vec<Patient>, ConsoleError>;

    /// `GET /api/beds`
    async fn beds(&self) -> Result<Vec<Bed>, ConsoleError>;

    /// `GET /api/wards`
    async fn wards(&self) -> Result<Vec<Ward>, ConsoleError>;

    /// `GET /api/dashboard/kpis`
    async fn kpis(&self) -> Result<Kpis, ConsoleError>;

    /// `GET /api/dashboard/alerts`
    async fn alerts(&self) -> Result<Vec<Alert>, ConsoleError>;

    /// `POST /api/allocation/optimize`
    async fn optimize(&self) -> Result<SuggestionSet, ConsoleError>;

    /// `POST /api/patients/{id}/assign`
    async fn assign(&self, request: &AssignRequest) -> Result<AssignReceipt, ConsoleError>;
}
