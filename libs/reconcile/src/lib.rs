//! Client-side allocation reconciliation.
//!
//! Keeps a locally displayed view of the patient queue, bed inventory and
//! optimizer suggestions consistent with an authoritative backend that
//! changes concurrently. Key pieces:
//!
//! - **SnapshotFetcher**: independent point-in-time reads of each collection.
//! - **SuggestionStore**: the live optimizer output, shrinking as pairings
//!   are committed.
//! - **AssignmentCommitter**: single and batch accepts with a partial-failure
//!   policy and one authoritative re-fetch afterwards.
//! - **LiveUpdateChannel**: push KPI updates that only ever touch the KPI
//!   slice, with teardown that guarantees no late delivery.
//! - **Console**: the single writer tying it together, run as an actor.
//!
//! # Invariants
//!
//! - The committer never predicts bed or patient status; it re-fetches.
//! - A batch never rolls back a succeeded commit.
//! - Nothing here is fatal to the process; failures are scoped to the region
//!   they affect.

pub mod actor;
pub mod backend;
pub mod committer;
pub mod console;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod idempotency;
pub mod live;
pub mod model;
pub mod session;
pub mod state;
pub mod suggestions;
pub mod ws;

pub use backend::{AssignReceipt, AssignRequest, Backend};
pub use committer::{AssignmentCommitter, BatchOutcome, CommitResult};
pub use console::{Console, ConsoleActor, ConsoleHandle, ConsoleView, SuggestionRow};
pub use error::{ConsoleError, ErrorKind};
pub use fetcher::{ResourceKind, Snapshot, SnapshotFetcher};
pub use http::HttpBackend;
pub use live::{
    ChannelExit, ChannelState, ConnectionTracker, KpiBoard, KpiState, LiveConnector,
    LiveMessage, LiveUpdateChannel,
};
pub use session::{CredentialStore, Role, SessionContext, SessionState, StoredSession, UserProfile};
pub use state::{AllocationState, ConsistencyIssue, Region, StaleReason};
pub use suggestions::{PlanId, Suggestion, SuggestionSet, SuggestionStore};
pub use ws::WsConnector;
