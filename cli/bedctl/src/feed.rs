//! Keeps a live KPI channel mounted for as long as a view is open.
//!
//! A channel that closes for any reason other than teardown or a rejected
//! credential is replaced after an exponential backoff delay. The delay
//! resets once a channel reaches `Open`.

use std::sync::Arc;

use smartbed_reconcile::actor::BackoffPolicy;
use smartbed_reconcile::{ChannelExit, KpiBoard, LiveConnector, LiveUpdateChannel};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Why the feed stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEnd {
    Shutdown,
    /// The credential was refused; remounting would not help.
    AuthRejected(ChannelExit),
}

/// Run channels against `board` until shutdown or an auth rejection.
/// Connectivity is mirrored into `connected`.
pub async fn run_feed(
    connector: Arc<dyn LiveConnector>,
    board: KpiBoard,
    policy: BackoffPolicy,
    connected: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> FeedEnd {
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return FeedEnd::Shutdown;
        }

        let channel = LiveUpdateChannel::open(connector.clone(), board.clone());
        let mut tracker = channel.tracker();

        let exit = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    channel.teardown();
                    connected.send_replace(false);
                    return FeedEnd::Shutdown;
                }
                exit = channel.closed() => break exit,
                Some(up) = tracker.changed() => {
                    if up {
                        attempt = 0;
                    }
                    connected.send_replace(up);
                }
            }
        };
        connected.send_replace(false);

        if exit.is_auth() {
            return FeedEnd::AuthRejected(exit);
        }

        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        warn!(exit = ?exit, attempt, delay_ms = delay.as_millis() as u64, "Live feed lost, remounting");

        tokio::select! {
            biased;
            _ = shutdown.changed() => return FeedEnd::Shutdown,
            _ = tokio::time::sleep(delay) => debug!(attempt, "Remounting live feed"),
        }
    }
}
