//! Bounded visit queue and worker pool.
//!
//! The HTTP layer never records a visit itself: it hands a [`VisitEvent`] to
//! the [`VisitQueue`] and answers the visitor right away. A dispatcher task
//! drains the queue and runs at most `workers` recordings concurrently, so a
//! slow store turns into a growing queue instead of an unbounded number of
//! in-flight network calls.
//!
//! ```text
//!   handler ──submit──►  [ bounded channel ]  ──► dispatcher ──► worker 1 ─┐
//!   handler ──submit──►  [  capacity = N   ]        │            worker 2 ─┼─► VisitRecorder
//!                               │                   └─ permits ─ worker k ─┘
//!                          full? policy
//! ```
//!
//! When the queue is full the [`QueueFullPolicy`] decides: drop the new visit
//! (counted in `visits_dropped_total`) or make the submitter wait.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::recorder::VisitRecorder;
use crate::stats::PipelineStats;
use crate::visit::VisitEntry;

/// What to do with a visit when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueFullPolicy {
    /// Reject the incoming visit.
    #[default]
    DropNewest,
    /// Wait for room; the HTTP response is delayed accordingly.
    Block,
}

/// Queue sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub workers: usize,
    pub full_policy: QueueFullPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            workers: 8,
            full_policy: QueueFullPolicy::DropNewest,
        }
    }
}

/// A visit waiting to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitEvent {
    pub resource: String,
    pub entry: VisitEntry,
}

impl VisitEvent {
    pub fn new(resource: impl Into<String>, entry: VisitEntry) -> Self {
        Self {
            resource: resource.into(),
            entry,
        }
    }
}

/// Why a visit was not queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("visit queue is full")]
    Full,
    #[error("visit queue is shut down")]
    Closed,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct VisitQueue {
    tx: mpsc::Sender<VisitEvent>,
    full_policy: QueueFullPolicy,
    stats: Arc<PipelineStats>,
}

/// Consumer side; resolves once the queue is closed and drained.
pub struct QueueHandle {
    dispatcher: JoinHandle<()>,
}

impl VisitQueue {
    /// Starts the dispatcher on the current runtime.
    pub fn start(recorder: Arc<VisitRecorder>, config: QueueConfig) -> (VisitQueue, QueueHandle) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let stats = recorder.stats().clone();
        let dispatcher = tokio::spawn(dispatch(rx, recorder, config.workers.max(1)));
        let queue = VisitQueue {
            tx,
            full_policy: config.full_policy,
            stats,
        };
        (queue, QueueHandle { dispatcher })
    }

    /// Queues a visit for recording.
    ///
    /// The in-flight gauge is raised before the event becomes visible to the
    /// workers, so it never dips below zero.
    pub async fn submit(&self, event: VisitEvent) -> Result<(), SubmitError> {
        self.stats.visits_in_flight.inc();
        let result = match self.full_policy {
            QueueFullPolicy::DropNewest => self.tx.try_send(event).map_err(|e| match e {
                mpsc::error::TrySendError::Full(event) => {
                    self.stats.visits_dropped.inc();
                    tracing::warn!(resource = %event.resource, "visit queue full, dropping visit");
                    SubmitError::Full
                }
                mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
            }),
            QueueFullPolicy::Block => self.tx.send(event).await.map_err(|_| SubmitError::Closed),
        };
        if result.is_err() {
            self.stats.visits_in_flight.dec();
        }
        result
    }
}

impl QueueHandle {
    /// Waits until every producer is gone and every queued visit has been
    /// recorded.
    pub async fn drained(self) {
        if let Err(err) = self.dispatcher.await {
            tracing::error!(error = %err, "visit dispatcher terminated abnormally");
        }
    }
}

async fn dispatch(mut rx: mpsc::Receiver<VisitEvent>, recorder: Arc<VisitRecorder>, workers: usize) {
    let permits = Arc::new(Semaphore::new(workers));
    while let Some(event) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let recorder = recorder.clone();
        tokio::spawn(async move {
            recorder.record_visit(&event.resource, &event.entry).await;
            recorder.stats().visits_in_flight.dec();
            drop(permit);
        });
    }
    // wait for the last recordings to finish
    let _ = permits.acquire_many(workers as u32).await;
    tracing::debug!("visit queue drained");
}
