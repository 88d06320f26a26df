//! Resource record provisioning.
//!
//! A record is created the first time a resource is visited and is never
//! deleted afterwards. [`RecordManager::ensure_record`] makes sure the record
//! exists before the counter and the log are touched:
//!
//! ```text
//!   ensure_record("blog")
//!        │
//!        ├── cached as known? ─────────────────────────► done
//!        │
//!        ├── lock "blog" (provisioning)
//!        ├── record_names() contains "blog"? ──────────► check layout
//!        ├── create_record("blog", layout)
//!        │      ├── Ok ─────────────────────────────────► remember, done
//!        │      └── AlreadyExists ──────────────────────► check layout
//!        └── any other error ──────────────────────────► propagate
//!
//!   check layout: record empty? ── yes ──► write_layout ──► remember, done
//!                               └─ no ───────────────────► remember, done
//! ```
//!
//! The layout is written to a record only while it is completely empty, so a
//! record that holds anything never has its counter reset. An empty record is
//! what a creation interrupted between adding the record and writing its
//! layout leaves behind; the next visit finishes it.
//!
//! The cache of known names is bounded: once it holds
//! [`DEFAULT_KNOWN_CAPACITY`] names it is cleared, and later visits pay one
//! metadata lookup to fill it again.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::locks::StripedLocks;
use crate::stats::PipelineStats;
use crate::store::{CellRef, RecordLayout, RecordStore};

/// Cell holding the view counter of a resource record.
pub const COUNTER_CELL: CellRef = CellRef::new(1, 1);

/// Row holding the visit-log column titles of a resource record.
pub const LOG_HEADER_ROW: u32 = 3;

/// Initial content of a resource record.
///
/// Row 1 carries the counter, row 2 is blank, row 3 holds the log header.
pub fn resource_layout() -> RecordLayout {
    RecordLayout::new(vec![
        vec!["View Count:".to_string(), "0".to_string()],
        vec![],
        vec![
            "Time".to_string(),
            "IP".to_string(),
            "User Agent".to_string(),
            "Preferred Language".to_string(),
        ],
    ])
}

/// Row holding the column titles of the aggregate record.
pub const AGGREGATE_HEADER_ROW: u32 = 1;

/// Initial content of the aggregate record: a header row and no counter.
pub fn aggregate_layout() -> RecordLayout {
    RecordLayout::new(vec![vec![
        "Time".to_string(),
        "Website".to_string(),
        "IP".to_string(),
        "User Agent".to_string(),
        "Preferred Language".to_string(),
    ]])
}

/// Number of confirmed record names kept before the cache is cleared.
pub const DEFAULT_KNOWN_CAPACITY: usize = 4096;

/// Ensures records exist, provisioning them on first sight.
pub struct RecordManager {
    store: Arc<dyn RecordStore>,
    known: RwLock<HashSet<String>>,
    known_capacity: usize,
    provisioning: StripedLocks,
    stats: Arc<PipelineStats>,
}

impl RecordManager {
    pub fn new(store: Arc<dyn RecordStore>, stats: Arc<PipelineStats>) -> Self {
        Self::with_known_capacity(store, stats, DEFAULT_KNOWN_CAPACITY)
    }

    /// Like [`new`](Self::new), caching at most `capacity` names.
    pub fn with_known_capacity(
        store: Arc<dyn RecordStore>,
        stats: Arc<PipelineStats>,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            known: RwLock::new(HashSet::new()),
            known_capacity: capacity.max(1),
            provisioning: StripedLocks::new(),
            stats,
        }
    }

    /// Makes sure a resource record named `name` exists.
    ///
    /// Idempotent: calling it on an existing record never rewrites it.
    pub async fn ensure_record(&self, name: &str) -> Result<()> {
        self.ensure_with_layout(name, &resource_layout()).await
    }

    /// Like [`ensure_record`](Self::ensure_record), with the aggregate layout.
    pub async fn ensure_aggregate(&self, name: &str) -> Result<()> {
        self.ensure_with_layout(name, &aggregate_layout()).await
    }

    /// Returns `true` if `name` has already been confirmed to exist.
    pub fn is_known(&self, name: &str) -> bool {
        self.known.read().contains(name)
    }

    async fn ensure_with_layout(&self, name: &str, layout: &RecordLayout) -> Result<()> {
        if self.is_known(name) {
            return Ok(());
        }

        let _guard = self.provisioning.lock(name).await;
        // another task may have provisioned it while we waited
        if self.is_known(name) {
            return Ok(());
        }

        let names = self.store.record_names().await?;
        let created = if names.contains(name) {
            false
        } else {
            match self.store.create_record(name, layout).await {
                Ok(()) => {
                    self.stats.records_created.inc();
                    tracing::info!(resource = name, "created record");
                    true
                }
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!(resource = name, "record already exists");
                    false
                }
                Err(err) => return Err(err.into()),
            }
        };
        if !created {
            self.complete_layout(name, layout).await?;
        }

        self.remember(name);
        Ok(())
    }

    /// Writes `layout` into `name` if the record is empty.
    async fn complete_layout(&self, name: &str, layout: &RecordLayout) -> Result<()> {
        if !self.store.read_range(name).await?.is_empty() {
            return Ok(());
        }
        tracing::warn!(resource = name, "record has no layout, writing it");
        self.store.write_layout(name, layout).await?;
        Ok(())
    }

    fn remember(&self, name: &str) {
        let mut known = self.known.write();
        if known.len() >= self.known_capacity {
            known.clear();
        }
        known.insert(name.to_string());
    }
}
