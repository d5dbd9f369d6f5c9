//! Live KPI updates over a push connection.
//!
//! Channel lifecycle:
//!
//! ```text
//! Closed -> Connecting -> Open -> Closed
//! ```
//!
//! `Closed` is terminal for a channel; remounting means opening a new one.
//! The channel only ever writes the KPI slice, through a [`KpiBoard`]. Every
//! channel attaches to the board with a fresh epoch and may write only while
//! that epoch is attached. Teardown detaches under the board's lock, so once
//! [`LiveUpdateChannel::teardown`] returns, no frame from that channel can be
//! applied, including one that was already being processed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ConsoleError;
use crate::model::Kpis;

/// Tag carried by KPI update frames.
pub const KPI_UPDATE_TAG: &str = "UPDATE_KPI";

// =============================================================================
// Messages
// =============================================================================

/// A parsed push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    KpiUpdate(Kpis),
    /// Well-formed frame with a tag this client does not consume.
    Unhandled { tag: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl LiveMessage {
    /// Parse a `{"type": ..., "payload": ...}` frame.
    pub fn parse(text: &str) -> Result<Self, ConsoleError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ConsoleError::decode("live frame", e))?;

        if envelope.tag != KPI_UPDATE_TAG {
            return Ok(Self::Unhandled { tag: envelope.tag });
        }

        if !envelope.payload.is_object() {
            return Err(ConsoleError::decode("kpi payload", "expected an object"));
        }

        serde_json::from_value(envelope.payload)
            .map(Self::KpiUpdate)
            .map_err(|e| ConsoleError::decode("kpi payload", e))
    }
}

// =============================================================================
// KPI board
// =============================================================================

/// Where the current KPI values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpiSource {
    Fetch,
    Live,
}

/// The KPI slice as seen by readers.
#[derive(Debug, Clone, Default)]
pub struct KpiState {
    pub kpis: Option<Kpis>,
    pub source: Option<KpiSource>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Last fetch error; cleared by the next successful write.
    pub last_error: Option<ConsoleError>,
    attached: Option<u64>,
    next_epoch: u64,
}

impl KpiState {
    /// Whether a live channel currently holds the write lease.
    pub fn has_live_writer(&self) -> bool {
        self.attached.is_some()
    }

    fn write(&mut self, kpis: Kpis, source: KpiSource) {
        self.kpis = Some(kpis);
        self.source = Some(source);
        self.updated_at = Some(Utc::now());
        self.last_error = None;
    }
}

/// Shared cell for the KPI slice. Cheap to clone.
#[derive(Clone)]
pub struct KpiBoard {
    cell: Arc<watch::Sender<KpiState>>,
}

impl Default for KpiBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KpiBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KpiBoard").field(&*self.cell.borrow()).finish()
    }
}

impl KpiBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(KpiState::default());
        Self { cell: Arc::new(tx) }
    }

    pub fn current(&self) -> KpiState {
        self.cell.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<KpiState> {
        self.cell.subscribe()
    }

    /// Record a fetch outcome. A failed fetch keeps the last values.
    pub fn replace(&self, result: Result<Kpis, ConsoleError>) {
        self.cell.send_modify(|state| match result {
            Ok(kpis) => state.write(kpis, KpiSource::Fetch),
            Err(e) => state.last_error = Some(e),
        });
    }

    /// Take the live write lease, revoking any previous holder.
    fn attach(&self) -> u64 {
        let mut epoch = 0;
        self.cell.send_if_modified(|state| {
            state.next_epoch += 1;
            epoch = state.next_epoch;
            state.attached = Some(epoch);
            false
        });
        epoch
    }

    /// Release the lease if `epoch` still holds it.
    fn detach(&self, epoch: u64) {
        self.cell.send_if_modified(|state| {
            if state.attached == Some(epoch) {
                state.attached = None;
            }
            false
        });
    }

    /// Replace the KPI slice wholesale if `epoch` holds the lease.
    fn apply_live(&self, epoch: u64, kpis: Kpis) -> bool {
        self.cell.send_if_modified(|state| {
            if state.attached != Some(epoch) {
                return false;
            }
            state.write(kpis, KpiSource::Live);
            true
        })
    }
}

// =============================================================================
// Transport seam
// =============================================================================

/// Inbound text frames. Ends when the server closes the connection.
pub type FrameStream = BoxStream<'static, Result<String, ConsoleError>>;

/// Opens the push connection.
#[async_trait]
pub trait LiveConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<FrameStream, ConsoleError>;
}

// =============================================================================
// Channel
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// Why a channel reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelExit {
    TornDown,
    ServerClosed,
    TransportFailed(ConsoleError),
    ConnectFailed(ConsoleError),
}

impl ChannelExit {
    /// The credential was rejected; remounting will not help.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::TransportFailed(e) | Self::ConnectFailed(e) => e.is_auth(),
            _ => false,
        }
    }
}

/// Published channel status.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub exit: Option<ChannelExit>,
    torn_down: bool,
}

struct StatusCell(watch::Sender<ChannelStatus>);

impl StatusCell {
    fn new() -> Self {
        let (tx, _) = watch::channel(ChannelStatus {
            state: ChannelState::Closed,
            exit: None,
            torn_down: false,
        });
        Self(tx)
    }

    /// Move to `next` unless the channel was torn down. Returns whether the
    /// transition happened.
    fn transition(&self, next: ChannelState, exit: Option<ChannelExit>) -> bool {
        let mut moved = false;
        self.0.send_if_modified(|status| {
            if status.torn_down || status.exit.is_some() {
                return false;
            }
            status.state = next;
            status.exit = exit;
            moved = true;
            true
        });
        moved
    }

    fn tear_down(&self) {
        self.0.send_if_modified(|status| {
            if status.torn_down {
                return false;
            }
            status.torn_down = true;
            status.state = ChannelState::Closed;
            if status.exit.is_none() {
                status.exit = Some(ChannelExit::TornDown);
            }
            true
        });
    }
}

/// A live KPI subscription. Dropping it tears it down.
pub struct LiveUpdateChannel {
    status: Arc<StatusCell>,
    board: KpiBoard,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl LiveUpdateChannel {
    /// Start connecting. Must be called within a tokio runtime.
    pub fn open(connector: Arc<dyn LiveConnector>, board: KpiBoard) -> Self {
        let status = Arc::new(StatusCell::new());
        let epoch = board.attach();
        status.transition(ChannelState::Connecting, None);

        let task = tokio::spawn(run_channel(connector, board.clone(), epoch, status.clone()));

        debug!(epoch, "Live channel opening");
        Self {
            status,
            board,
            epoch,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.status.0.borrow().state
    }

    /// Connectivity signal for display.
    pub fn tracker(&self) -> ConnectionTracker {
        ConnectionTracker {
            rx: self.status.0.subscribe(),
        }
    }

    /// Wait until the channel closes on its own (or is torn down elsewhere).
    pub async fn closed(&self) -> ChannelExit {
        let mut rx = self.status.0.subscribe();
        let exit = match rx.wait_for(|s| s.exit.is_some()).await {
            Ok(status) => status.exit.clone().unwrap_or(ChannelExit::TornDown),
            Err(_) => ChannelExit::TornDown,
        };
        exit
    }

    /// Close the connection and stop delivery. When this returns, no further
    /// frame from this channel will reach the board.
    pub fn teardown(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(task) = self.task.take() else { return };
        self.status.tear_down();
        self.board.detach(self.epoch);
        task.abort();
        debug!(epoch = self.epoch, "Live channel torn down");
    }
}

impl Drop for LiveUpdateChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_channel(
    connector: Arc<dyn LiveConnector>,
    board: KpiBoard,
    epoch: u64,
    status: Arc<StatusCell>,
) {
    let mut frames = match connector.connect().await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(error = %e, "Live channel failed to connect");
            board.detach(epoch);
            status.transition(ChannelState::Closed, Some(ChannelExit::ConnectFailed(e)));
            return;
        }
    };

    if !status.transition(ChannelState::Open, None) {
        return;
    }
    info!(epoch, "Live channel open");

    let exit = loop {
        match frames.next().await {
            Some(Ok(text)) => match LiveMessage::parse(&text) {
                Ok(LiveMessage::KpiUpdate(kpis)) => {
                    if !board.apply_live(epoch, kpis) {
                        break ChannelExit::TornDown;
                    }
                }
                Ok(LiveMessage::Unhandled { tag }) => {
                    debug!(tag = %tag, "Ignoring live frame");
                }
                Err(e) => {
                    warn!(error = %e, "Dropping malformed live frame");
                }
            },
            Some(Err(e)) => break ChannelExit::TransportFailed(e),
            None => break ChannelExit::ServerClosed,
        }
    };

    board.detach(epoch);
    match &exit {
        ChannelExit::TornDown | ChannelExit::ServerClosed => info!(epoch, "Live channel closed"),
        other => warn!(epoch, exit = ?other, "Live channel failed"),
    }
    status.transition(ChannelState::Closed, Some(exit));
}

// =============================================================================
// Connection tracker
// =============================================================================

/// True only while the channel is `Open`. Holds no state of its own.
#[derive(Clone)]
pub struct ConnectionTracker {
    rx: watch::Receiver<ChannelStatus>,
}

impl ConnectionTracker {
    pub fn is_connected(&self) -> bool {
        self.rx.borrow().state == ChannelState::Open
    }

    /// Wait for the next status change and return the new connectivity.
    /// Returns `None` once the channel is gone.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().state == ChannelState::Open)
    }
}
