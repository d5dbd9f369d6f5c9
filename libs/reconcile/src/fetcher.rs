//! Point-in-time reads of authoritative collections.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::ConsoleError;
use crate::model::{Alert, Bed, Kpis, Patient, Ward};
use crate::session::SessionContext;

/// Independently fetchable collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Queue,
    Beds,
    Wards,
    Kpis,
    Alerts,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Queue,
        ResourceKind::Beds,
        ResourceKind::Wards,
        ResourceKind::Kpis,
        ResourceKind::Alerts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Beds => "beds",
            Self::Wards => "wards",
            Self::Kpis => "kpis",
            Self::Alerts => "alerts",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of one successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Queue(Vec<Patient>),
    Beds(Vec<Bed>),
    Wards(Vec<Ward>),
    Kpis(Kpis),
    Alerts(Vec<Alert>),
}

/// Queue and bed collections pulled after a commit.
#[derive(Debug, Clone)]
pub struct Resync {
    pub queue: Result<Vec<Patient>, ConsoleError>,
    pub beds: Result<Vec<Bed>, ConsoleError>,
}

/// Stateless reader over a [`Backend`].
///
/// Every call is independent and free of side effects apart from expiring the
/// session when the backend rejects the credential.
#[derive(Clone)]
pub struct SnapshotFetcher {
    backend: Arc<dyn Backend>,
    session: SessionContext,
}

impl SnapshotFetcher {
    pub fn new(backend: Arc<dyn Backend>, session: SessionContext) -> Self {
        Self { backend, session }
    }

    /// Fetch one collection.
    pub async fn fetch(&self, kind: ResourceKind) -> Result<Snapshot, ConsoleError> {
        self.session.token()?;

        let result = match kind {
            ResourceKind::Queue => self.backend.patient_queue().await.map(Snapshot::Queue),
            ResourceKind::Beds => self.backend.beds().await.map(Snapshot::Beds),
            ResourceKind::Wards => self.backend.wards().await.map(Snapshot::Wards),
            ResourceKind::Kpis => self.backend.kpis().await.map(Snapshot::Kpis),
            ResourceKind::Alerts => self.backend.alerts().await.map(Snapshot::Alerts),
        };

        match &result {
            Ok(_) => debug!(resource = %kind, "Fetched snapshot"),
            Err(e) => warn!(resource = %kind, error = %e, "Snapshot fetch failed"),
        }

        self.session.observe(result)
    }

    /// Fetch several collections concurrently. One failure never affects the
    /// others; results come back in request order.
    pub async fn fetch_many(
        &self,
        kinds: &[ResourceKind],
    ) -> Vec<(ResourceKind, Result<Snapshot, ConsoleError>)> {
        join_all(kinds.iter().map(|&kind| async move { (kind, self.fetch(kind).await) })).await
    }

    /// Re-read the queue and bed inventory together.
    pub async fn resync(&self) -> Resync {
        let (queue, beds) = tokio::join!(
            self.fetch(ResourceKind::Queue),
            self.fetch(ResourceKind::Beds)
        );

        Resync {
            queue: queue.and_then(|s| match s {
                Snapshot::Queue(v) => Ok(v),
                other => Err(unexpected(ResourceKind::Queue, &other)),
            }),
            beds: beds.and_then(|s| match s {
                Snapshot::Beds(v) => Ok(v),
                other => Err(unexpected(ResourceKind::Beds, &other)),
            }),
        }
    }
}

fn unexpected(kind: ResourceKind, got: &Snapshot) -> ConsoleError {
    ConsoleError::decode(kind.as_str(), format!("unexpected snapshot {got:?}"))
}
