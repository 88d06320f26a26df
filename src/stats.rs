//! Operational statistics for the recording pipeline.
//!
//! Every visit touches several of these counters from whichever worker thread
//! happens to run it, so they use the sharded layout: each counter is split
//! into [`NUM_SHARDS`] cache-padded atomics and every thread writes to its own
//! shard. Reads sum all shards.
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │              Tally                  │
//!                          ├─────────────────────────────────────┤
//!   worker 0 ──writes──►   │ [Shard 0] ████████ (CachePadded)    │
//!   worker 1 ──writes──►   │ [Shard 1] ████████ (CachePadded)    │
//!        ...               │    ...                              │
//!   worker 15 ─writes──►   │ [Shard 15] ███████ (CachePadded)    │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                   value() sums all
//!                                   shards on read
//! ```
//!
//! Counters are cheap to bump and only read when `/metrics` is scraped or
//! when the process logs its final snapshot.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};

/// Number of shards per counter.
///
/// The collector runs a handful of runtime worker threads, so 16 shards keep
/// writers apart without spending much memory (16 × 64 bytes per counter).
pub const NUM_SHARDS: usize = 16;

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Shard assigned to the current thread, round-robin on first use.
    static THREAD_SHARD: usize = NEXT_SHARD.fetch_add(1, Ordering::Relaxed) % NUM_SHARDS;
}

/// Whether a statistic only grows or can move both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// A monotone sharded counter.
pub struct Tally {
    name: &'static str,
    help: &'static str,
    shards: [CachePadded<AtomicU64>; NUM_SHARDS],
}

impl Tally {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        const ZERO: CachePadded<AtomicU64> = CachePadded::new(AtomicU64::new(0));
        Self {
            name,
            help,
            shards: [ZERO; NUM_SHARDS],
        }
    }

    #[inline]
    pub fn add(&self, value: u64) {
        THREAD_SHARD.with(|idx| self.shards[*idx].fetch_add(value, Ordering::Relaxed));
    }

    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn value(&self) -> u64 {
        self.shards.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Debug for Tally {
    /// Shows non-zero shards: `name{ [shard]:value ... }`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, shard) in self.shards.iter().enumerate() {
            let val = shard.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

/// A sharded signed level that goes up and down (e.g. visits in flight).
///
/// Individual shards may go negative when a visit is accepted on one thread
/// and completed on another; only the sum is meaningful.
pub struct Level {
    name: &'static str,
    help: &'static str,
    shards: [CachePadded<AtomicI64>; NUM_SHARDS],
}

impl Level {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        const ZERO: CachePadded<AtomicI64> = CachePadded::new(AtomicI64::new(0));
        Self {
            name,
            help,
            shards: [ZERO; NUM_SHARDS],
        }
    }

    #[inline]
    pub fn add(&self, value: i64) {
        THREAD_SHARD.with(|idx| self.shards[*idx].fetch_add(value, Ordering::Relaxed));
    }

    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    #[inline]
    pub fn dec(&self) {
        self.add(-1);
    }

    pub fn value(&self) -> i64 {
        self.shards.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }
}

/// All counters maintained by the collector.
pub struct PipelineStats {
    pub visits_received: Tally,
    pub visits_ignored: Tally,
    pub visits_dropped: Tally,
    pub visits_recorded: Tally,
    pub visits_failed: Tally,
    pub records_created: Tally,
    pub counter_increments: Tally,
    pub log_appends: Tally,
    pub aggregate_appends: Tally,
    pub step_failures: Tally,
    pub store_retries: Tally,
    pub visits_in_flight: Level,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub const fn new() -> Self {
        Self {
            visits_received: Tally::new("visits_received_total", "Visits accepted by the HTTP layer"),
            visits_ignored: Tally::new("visits_ignored_total", "Requests for reserved names that were not recorded"),
            visits_dropped: Tally::new("visits_dropped_total", "Visits dropped because the queue was full"),
            visits_recorded: Tally::new("visits_recorded_total", "Visits whose every step succeeded"),
            visits_failed: Tally::new("visits_failed_total", "Visits with at least one failed step"),
            records_created: Tally::new("records_created_total", "Records provisioned on first sight"),
            counter_increments: Tally::new("counter_increments_total", "Successful view counter increments"),
            log_appends: Tally::new("log_appends_total", "Rows appended to per-resource visit logs"),
            aggregate_appends: Tally::new("aggregate_appends_total", "Rows appended to the aggregate visit log"),
            step_failures: Tally::new("step_failures_total", "Failed pipeline steps"),
            store_retries: Tally::new("store_retries_total", "Store calls retried after a transient failure"),
            visits_in_flight: Level::new("visits_in_flight", "Visits queued or being recorded"),
        }
    }

    fn tallies(&self) -> [&Tally; 11] {
        [
            &self.visits_received,
            &self.visits_ignored,
            &self.visits_dropped,
            &self.visits_recorded,
            &self.visits_failed,
            &self.records_created,
            &self.counter_increments,
            &self.log_appends,
            &self.aggregate_appends,
            &self.step_failures,
            &self.store_retries,
        ]
    }

    /// Captures the current value of every statistic.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut entries: Vec<StatSnapshot> = self
            .tallies()
            .iter()
            .map(|t| StatSnapshot {
                name: t.name.to_string(),
                help: t.help.to_string(),
                kind: MetricKind::Counter,
                value: t.value() as i64,
            })
            .collect();
        entries.push(StatSnapshot {
            name: self.visits_in_flight.name.to_string(),
            help: self.visits_in_flight.help.to_string(),
            kind: MetricKind::Gauge,
            value: self.visits_in_flight.value(),
        });
        StatsSnapshot { entries }
    }
}

/// Point-in-time value of one statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub value: i64,
}

/// Point-in-time values of all statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub entries: Vec<StatSnapshot>,
}

impl StatsSnapshot {
    /// Finds a statistic by name.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_tally_add() {
        let tally = Tally::new("t", "");
        tally.inc();
        tally.add(4);
        assert_eq!(tally.value(), 5);
    }

    #[test]
    fn test_tally_multiple_threads() {
        let tally = Arc::new(Tally::new("t", ""));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tally = Arc::clone(&tally);
                thread::spawn(move || {
                    for _ in 0..250 {
                        tally.inc();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tally.value(), 1000);
    }

    #[test]
    fn test_level_across_threads() {
        let level = Arc::new(Level::new("l", ""));
        level.inc();
        level.inc();
        let remote = Arc::clone(&level);
        thread::spawn(move || remote.dec()).join().unwrap();
        assert_eq!(level.value(), 1);
    }

    #[test]
    fn test_tally_debug() {
        let tally = Tally::new("hits", "");
        tally.add(2);
        let debug = format!("{tally:?}");
        assert!(debug.starts_with("hits{"));
        assert!(debug.contains(":2"));
        assert!(debug.ends_with('}'));
    }

    #[test]
    fn test_snapshot() {
        let stats = PipelineStats::new();
        stats.visits_received.add(3);
        stats.visits_in_flight.inc();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.get("visits_received_total"), Some(3));
        assert_eq!(snapshot.get("visits_dropped_total"), Some(0));
        assert_eq!(snapshot.get("visits_in_flight"), Some(1));
        assert_eq!(snapshot.get("nope"), None);
        assert_eq!(snapshot.entries.len(), 12);
    }

    #[test]
    fn test_snapshot_serialize() {
        let stats = PipelineStats::new();
        stats.log_appends.inc();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains(r#""name":"log_appends_total""#));
        assert!(json.contains(r#""kind":"counter""#));
        assert!(json.contains(r#""kind":"gauge""#));
    }
}
