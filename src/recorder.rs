//! Visit dispatch: the full recording sequence for one visit.
//!
//! ```text
//!   record_visit(name, entry)
//!        │
//!        ├─ 1. ensure_record ── fails ──► log, stop (nothing to write to)
//!        │
//!        ├─ [lock name]            (serialized policy only)
//!        ├─ 2. increment ───────── fails ──► log, continue
//!        ├─ 3. append_visit ────── fails ──► log, continue
//!        ├─ [unlock name]
//!        │
//!        └─ 4. aggregate append ── fails ──► log
//! ```
//!
//! [`VisitRecorder::record_visit`] never returns an error. Every failure is
//! logged with the resource name and the failing step, counted, and reported
//! in the returned [`VisitOutcome`]; the visitor-facing response does not
//! depend on any of it.
//!
//! Holding the resource lock across steps 2 and 3 keeps the log in the same
//! order as the counter values handed out.

use std::fmt::{self, Display};
use std::sync::Arc;

use chrono_tz::Tz;

use crate::counter::{ConsistencyPolicy, CounterEngine};
use crate::error::{Error, Result};
use crate::locks::StripedLocks;
use crate::record::RecordManager;
use crate::retry::{RetryPolicy, RetryingStore};
use crate::stats::PipelineStats;
use crate::store::RecordStore;
use crate::visit::{VisitEntry, VisitLogger, DEFAULT_TIMEZONE};

/// Default name of the record that collects visits to every resource.
pub const DEFAULT_AGGREGATE_RECORD: &str = "all";

/// Settings of the recording pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    pub policy: ConsistencyPolicy,
    pub timezone: Tz,
    /// Record receiving a row for every visit; `None` disables it.
    pub aggregate_record: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            policy: ConsistencyPolicy::default(),
            timezone: DEFAULT_TIMEZONE,
            aggregate_record: Some(DEFAULT_AGGREGATE_RECORD.to_string()),
            retry: RetryPolicy::default(),
        }
    }
}

/// A step of the recording sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureRecord,
    Increment,
    AppendVisit,
    AppendAggregate,
}

impl Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::EnsureRecord => "ensure_record",
            Step::Increment => "increment",
            Step::AppendVisit => "append_visit",
            Step::AppendAggregate => "append_aggregate",
        };
        f.write_str(name)
    }
}

/// What happened while recording one visit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitOutcome {
    /// Counter value after the increment.
    pub count: Option<u64>,
    /// Row of the resource log that received the visit.
    pub row: Option<u32>,
    /// Row of the aggregate log that received the visit.
    pub aggregate_row: Option<u32>,
    /// Failed steps, in order.
    pub failures: Vec<(Step, Error)>,
}

impl VisitOutcome {
    /// `true` if no step failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, step: Step) -> bool {
        self.failures.iter().any(|(s, _)| *s == step)
    }
}

/// Records visits: provisioning, counting and logging.
pub struct VisitRecorder {
    records: RecordManager,
    counter: CounterEngine,
    logger: VisitLogger,
    locks: Arc<StripedLocks>,
    config: RecorderConfig,
    stats: Arc<PipelineStats>,
}

impl VisitRecorder {
    /// Builds the pipeline on top of `store`.
    ///
    /// The store is wrapped with the configured [`RetryPolicy`]; the same
    /// handle is shared by every component for the lifetime of the recorder.
    pub fn new(store: Arc<dyn RecordStore>, config: RecorderConfig, stats: Arc<PipelineStats>) -> Self {
        let store: Arc<dyn RecordStore> =
            Arc::new(RetryingStore::new(store, config.retry.clone(), stats.clone()));
        let locks = Arc::new(StripedLocks::new());
        Self {
            records: RecordManager::new(store.clone(), stats.clone()),
            counter: CounterEngine::new(store.clone(), config.policy, locks.clone()),
            logger: VisitLogger::new(store, config.policy, config.timezone),
            locks,
            config,
            stats,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Records one visit to resource `name`. Never fails; see the module docs.
    pub async fn record_visit(&self, name: &str, entry: &VisitEntry) -> VisitOutcome {
        let mut outcome = VisitOutcome::default();

        if let Err(err) = self.records.ensure_record(name).await {
            self.fail(&mut outcome, name, Step::EnsureRecord, err);
            tracing::warn!(resource = name, "record unavailable, visit not recorded");
            self.stats.visits_failed.inc();
            return outcome;
        }

        {
            let _guard = match self.config.policy {
                ConsistencyPolicy::Serialized => Some(self.locks.lock(name).await),
                ConsistencyPolicy::Naive => None,
            };

            match self.counter.increment_unlocked(name).await {
                Ok(count) => {
                    self.stats.counter_increments.inc();
                    outcome.count = Some(count);
                }
                Err(err) => self.fail(&mut outcome, name, Step::Increment, err),
            }

            match self.logger.append_visit(name, entry).await {
                Ok(row) => {
                    self.stats.log_appends.inc();
                    outcome.row = Some(row);
                }
                Err(err) => self.fail(&mut outcome, name, Step::AppendVisit, err),
            }
        }

        if let Some(aggregate) = &self.config.aggregate_record {
            match self.append_aggregate(aggregate, name, entry).await {
                Ok(row) => {
                    self.stats.aggregate_appends.inc();
                    outcome.aggregate_row = Some(row);
                }
                Err(err) => self.fail(&mut outcome, name, Step::AppendAggregate, err),
            }
        }

        if outcome.is_complete() {
            self.stats.visits_recorded.inc();
            tracing::debug!(resource = name, count = ?outcome.count, row = ?outcome.row, "visit recorded");
        } else {
            self.stats.visits_failed.inc();
        }
        outcome
    }

    async fn append_aggregate(&self, aggregate: &str, name: &str, entry: &VisitEntry) -> Result<u32> {
        self.records.ensure_aggregate(aggregate).await?;
        self.logger.append_aggregate(aggregate, name, entry).await
    }

    fn fail(&self, outcome: &mut VisitOutcome, name: &str, step: Step, err: Error) {
        self.stats.step_failures.inc();
        match &err {
            Error::MalformedCounter { value, .. } => {
                tracing::error!(resource = name, %step, value = %value, "counter cell is corrupted")
            }
            _ => tracing::warn!(resource = name, %step, error = %err, "visit step failed"),
        }
        outcome.failures.push((step, err));
    }
}
