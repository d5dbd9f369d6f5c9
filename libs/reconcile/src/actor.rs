//! Single-owner task plumbing.
//!
//! An [`Actor`] owns its state inside one spawned task and processes its
//! mailbox one message at a time. Callers hold an [`ActorHandle`] to send
//! and an [`ActorRef`] to stop the task. [`BackoffPolicy`] spaces out
//! reconnect attempts for the live feed.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Message handling for a task that owns its state.
#[async_trait]
pub trait Actor: Send + 'static {
    type Message: Send + Debug + 'static;

    /// Name used in log fields.
    fn name(&self) -> &str;

    /// Handle one message. Returning `false` stops the actor.
    async fn handle(&mut self, msg: Self::Message) -> bool;
}

/// The actor's task has exited and its mailbox is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("actor stopped")]
pub struct ActorStopped;

/// Sending side of an actor's mailbox.
pub struct ActorHandle<M> {
    tx: mpsc::Sender<M>,
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M: Send + Debug + 'static> ActorHandle<M> {
    /// Queue a message, waiting for mailbox space.
    pub async fn send(&self, msg: M) -> Result<(), ActorStopped> {
        self.tx.send(msg).await.map_err(|_| ActorStopped)
    }
}

/// Owning reference to a spawned actor task.
pub struct ActorRef {
    task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRef {
    /// Signal the actor to stop after the message in progress.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal stop and wait for the task to finish.
    pub async fn join(self) {
        self.stop();
        let _ = self.task.await;
    }
}

static NEXT_ACTOR: AtomicU64 = AtomicU64::new(0);

/// Spawn an actor onto the current runtime.
pub fn spawn<A: Actor>(actor: A, mailbox_size: usize) -> (ActorHandle<A::Message>, ActorRef) {
    let actor_id = format!("{}_{}", actor.name(), NEXT_ACTOR.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = mpsc::channel(mailbox_size);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    debug!(actor_id = %actor_id, "Spawned actor");
    let task = tokio::spawn(run(actor, rx, shutdown_rx, actor_id));

    (ActorHandle { tx }, ActorRef { task, shutdown_tx })
}

async fn run<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    actor_id: String,
) {
    let mut processed = 0u64;

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(actor_id = %actor_id, "Actor received shutdown signal");
                    break;
                }
            }

            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!(actor_id = %actor_id, "Actor mailbox closed");
                    break;
                };

                processed += 1;
                if !actor.handle(msg).await {
                    debug!(actor_id = %actor_id, "Actor requested stop");
                    break;
                }
            }
        }
    }

    info!(actor_id = %actor_id, messages_processed = processed, "Actor stopped");
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(31) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = clock_jitter(delay * self.jitter);
        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Jitter in `[-range, range]` seeded from the clock.
fn clock_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = (seed.wrapping_mul(6364136223846793005).wrapping_add(1)) as f64;
    let normalized = (random / u64::MAX as f64) * 2.0 - 1.0;
    normalized * range
}
