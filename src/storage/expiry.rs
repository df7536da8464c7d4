//! Background Expiry Scheduler
//!
//! SET with `EX`/`PX` does not put a deadline on the entry. Instead it hands
//! an expiry record to this scheduler, which deletes the key once the record
//! comes due. There is no sweep over the key space.
//!
//! ## Design
//!
//! One Tokio task owns a min-heap of records ordered by deadline:
//! 1. Sleeps until the earliest deadline, or until a new record arrives
//! 2. Pops every record that is due
//! 3. Deletes the matching keys according to the [`ExpiryPolicy`]
//!
//! Records are never cancelled. Under [`ExpiryPolicy::Generational`] a record
//! only removes the entry written by the SET that scheduled it, so overwriting
//! or deleting the key makes the record harmless.

use crate::storage::StorageEngine;
use bytes::Bytes;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// What a due expiry record is allowed to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Delete the key only if it still holds the value the record was scheduled for
    #[default]
    Generational,
    /// Delete the key whatever it holds now
    Unconditional,
}

impl FromStr for ExpiryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generational" => Ok(ExpiryPolicy::Generational),
            "unconditional" => Ok(ExpiryPolicy::Unconditional),
            other => Err(format!("unknown expiry policy '{}'", other)),
        }
    }
}

/// A pending deletion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryRecord {
    deadline: Instant,
    generation: u64,
    key: Bytes,
}

/// Cloneable handle used by command handlers to schedule deletions.
#[derive(Debug, Clone)]
pub struct ExpiryHandle {
    tx: mpsc::UnboundedSender<ExpiryRecord>,
}

impl ExpiryHandle {
    /// Schedules deletion of `key` after `ttl`.
    ///
    /// `generation` is the one returned by the store for the write being expired.
    pub fn schedule(&self, key: Bytes, generation: u64, ttl: Duration) {
        let record = ExpiryRecord {
            deadline: Instant::now() + ttl,
            generation,
            key,
        };
        if self.tx.send(record).is_err() {
            warn!("Expiry scheduler is stopped, dropping expiry record");
        }
    }
}

/// A handle to the running expiry task.
///
/// When this handle is dropped, the task stops and pending records are discarded.
#[derive(Debug)]
pub struct ExpiryScheduler {
    handle: ExpiryHandle,
    shutdown_tx: watch::Sender<bool>,
}

impl ExpiryScheduler {
    /// Starts the scheduler as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use respcache::storage::{ExpiryPolicy, ExpiryScheduler, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let scheduler = ExpiryScheduler::start(engine, ExpiryPolicy::Generational);
    /// let handle = scheduler.handle();
    /// ```
    pub fn start(engine: Arc<StorageEngine>, policy: ExpiryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(scheduler_loop(engine, policy, rx, shutdown_rx));

        info!(policy = ?policy, "Expiry scheduler started");

        Self {
            handle: ExpiryHandle { tx },
            shutdown_tx,
        }
    }

    /// Returns a handle for scheduling deletions.
    pub fn handle(&self) -> ExpiryHandle {
        self.handle.clone()
    }

    /// Stops the scheduler.
    ///
    /// This is called automatically when the scheduler is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.stop();
        debug!("Expiry scheduler stopped");
    }
}

async fn scheduler_loop(
    engine: Arc<StorageEngine>,
    policy: ExpiryPolicy,
    mut rx: mpsc::UnboundedReceiver<ExpiryRecord>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut queue: BinaryHeap<Reverse<ExpiryRecord>> = BinaryHeap::new();

    loop {
        let next_deadline = queue.peek().map(|Reverse(record)| record.deadline);

        tokio::select! {
            received = rx.recv() => match received {
                Some(record) => {
                    trace!(deadline = ?record.deadline, "Expiry record queued");
                    queue.push(Reverse(record));
                }
                None => return,
            },
            _ = sleep_until(next_deadline) => {
                fire_due(&engine, policy, &mut queue);
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!(pending = queue.len(), "Expiry scheduler received shutdown signal");
                    return;
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn fire_due(engine: &StorageEngine, policy: ExpiryPolicy, queue: &mut BinaryHeap<Reverse<ExpiryRecord>>) {
    let now = Instant::now();

    while queue.peek().is_some_and(|Reverse(record)| record.deadline <= now) {
        let Some(Reverse(record)) = queue.pop() else {
            break;
        };

        let removed = match policy {
            ExpiryPolicy::Generational => engine.delete_if_generation(&record.key, record.generation),
            ExpiryPolicy::Unconditional => engine.expire(&record.key),
        };

        if removed {
            engine.record_expired();
            debug!(key = %String::from_utf8_lossy(&record.key), "Key expired");
        } else {
            trace!(
                key = %String::from_utf8_lossy(&record.key),
                "Expiry record no longer matches a stored value"
            );
        }
    }
}
