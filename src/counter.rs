//! View counter increments.
//!
//! The counter of a resource lives in cell `B1` of its record. The backend
//! has no increment primitive, so an increment is a read followed by a write:
//!
//! ```text
//!   task A: read B1 ─► 41 ─────────────── write B1 ◄─ 42
//!   task B:        read B1 ─► 41 ───────────────── write B1 ◄─ 42
//!                                                     (one visit lost)
//! ```
//!
//! Two increments whose read/write pairs interleave both observe the same
//! value and one update is lost. [`ConsistencyPolicy::Naive`] accepts this:
//! under load the final count is at most the number of visits.
//! [`ConsistencyPolicy::Serialized`] holds a per-resource lock across the
//! read and the write, which makes the count exact as long as a single
//! process writes to the spreadsheet.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::locks::StripedLocks;
use crate::record::COUNTER_CELL;
use crate::store::RecordStore;

/// How read-modify-write sequences against the store are protected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsistencyPolicy {
    /// Independent read and write calls; concurrent updates may be lost.
    Naive,
    /// Per-resource mutual exclusion inside this process; the visit log uses
    /// the store-assigned append.
    #[default]
    Serialized,
}

/// Parses a stored counter value.
///
/// Only non-negative integers are accepted, surrounding whitespace aside. An
/// empty cell, a negative number, a fraction or any text is a
/// [`Error::MalformedCounter`]; the value is never coerced to zero.
pub fn parse_counter(resource: &str, raw: Option<&str>) -> Result<u64> {
    let malformed = || Error::MalformedCounter {
        resource: resource.to_string(),
        value: raw.unwrap_or_default().to_string(),
    };
    let value = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(malformed)?;
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    value.parse::<u64>().map_err(|_| malformed())
}

/// Increments per-resource view counters.
pub struct CounterEngine {
    store: Arc<dyn RecordStore>,
    policy: ConsistencyPolicy,
    locks: Arc<StripedLocks>,
}

impl CounterEngine {
    pub fn new(store: Arc<dyn RecordStore>, policy: ConsistencyPolicy, locks: Arc<StripedLocks>) -> Self {
        Self {
            store,
            policy,
            locks,
        }
    }

    pub fn policy(&self) -> ConsistencyPolicy {
        self.policy
    }

    /// Adds one to the counter of `name` and returns the new value.
    ///
    /// With [`ConsistencyPolicy::Serialized`] the per-resource lock is taken
    /// for the duration of the call.
    pub async fn increment(&self, name: &str) -> Result<u64> {
        match self.policy {
            ConsistencyPolicy::Naive => self.increment_unlocked(name).await,
            ConsistencyPolicy::Serialized => {
                let _guard = self.locks.lock(name).await;
                self.increment_unlocked(name).await
            }
        }
    }

    /// Reads, increments and writes back the counter without locking.
    ///
    /// Callers that already hold the resource lock use this directly.
    pub(crate) async fn increment_unlocked(&self, name: &str) -> Result<u64> {
        let raw = self.store.read_cell(name, COUNTER_CELL).await?;
        let current = parse_counter(name, raw.as_deref())?;
        let next = current.checked_add(1).ok_or_else(|| Error::MalformedCounter {
            resource: name.to_string(),
            value: current.to_string(),
        })?;
        self.store
            .write_cell(name, COUNTER_CELL, &next.to_string())
            .await?;
        Ok(next)
    }
}
