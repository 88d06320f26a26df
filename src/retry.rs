//! Bounded retries for transient store failures.
//!
//! [`RetryingStore`] wraps any [`RecordStore`] and re-issues a call when it
//! fails with [`StoreError::Unavailable`](crate::error::StoreError::Unavailable), sleeping with exponential backoff
//! between attempts. Every other error is returned at once.
//!
//! `append_row` is never retried: the store assigns the row, so a retry after
//! a response that got lost on the way back would log the visit twice.
//! Single-cell, fixed-row and layout writes are idempotent and are retried.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::stats::PipelineStats;
use crate::store::{CellRef, RecordLayout, RecordStore, Row, StoreResult};

/// How many times, and how patiently, to retry a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (one-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A [`RecordStore`] decorator that retries transient failures.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
    stats: Arc<PipelineStats>,
}

impl<S: RecordStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy, stats: Arc<PipelineStats>) -> Self {
        Self {
            inner,
            policy,
            stats,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, op: &'static str, name: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = StoreResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::debug!(
                        op,
                        resource = name,
                        attempt,
                        ?delay,
                        error = %err,
                        "retrying store call"
                    );
                    self.stats.store_retries.inc();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for RetryingStore<S> {
    async fn record_names(&self) -> StoreResult<HashSet<String>> {
        self.retry("record_names", "", || self.inner.record_names())
            .await
    }

    async fn create_record(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        self.retry("create_record", name, || self.inner.create_record(name, layout))
            .await
    }

    async fn write_layout(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        self.retry("write_layout", name, || self.inner.write_layout(name, layout))
            .await
    }

    async fn read_cell(&self, name: &str, cell: CellRef) -> StoreResult<Option<String>> {
        self.retry("read_cell", name, || self.inner.read_cell(name, cell))
            .await
    }

    async fn write_cell(&self, name: &str, cell: CellRef, value: &str) -> StoreResult<()> {
        self.retry("write_cell", name, || self.inner.write_cell(name, cell, value))
            .await
    }

    async fn read_range(&self, name: &str) -> StoreResult<Vec<Row>> {
        self.retry("read_range", name, || self.inner.read_range(name))
            .await
    }

    async fn write_row(&self, name: &str, row: u32, values: &[String]) -> StoreResult<()> {
        self.retry("write_row", name, || self.inner.write_row(name, row, values))
            .await
    }

    async fn append_row(&self, name: &str, header_row: u32, values: &[String]) -> StoreResult<u32> {
        self.inner.append_row(name, header_row, values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::memory::{MemoryStore, StoreOp};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let stats = Arc::new(PipelineStats::new());
        let store = RetryingStore::new(MemoryStore::new(), fast(), stats.clone());
        store
            .inner()
            .fail_next(StoreOp::RecordNames, StoreError::Unavailable("503".into()));
        store
            .inner()
            .fail_next(StoreOp::RecordNames, StoreError::Unavailable("503".into()));

        assert!(store.record_names().await.is_ok());
        assert_eq!(store.inner().calls(StoreOp::RecordNames), 3);
        assert_eq!(stats.store_retries.value(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let stats = Arc::new(PipelineStats::new());
        let store = RetryingStore::new(MemoryStore::new(), fast(), stats);
        for _ in 0..3 {
            store
                .inner()
                .fail_next(StoreOp::RecordNames, StoreError::Unavailable("503".into()));
        }

        assert_eq!(
            store.record_names().await,
            Err(StoreError::Unavailable("503".into()))
        );
        assert_eq!(store.inner().calls(StoreOp::RecordNames), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let stats = Arc::new(PipelineStats::new());
        let store = RetryingStore::new(MemoryStore::new(), fast(), stats);
        store
            .inner()
            .fail_next(StoreOp::ReadRange, StoreError::Rejected("bad".into()));

        assert!(store.read_range("x").await.is_err());
        assert_eq!(store.inner().calls(StoreOp::ReadRange), 1);
    }

    #[tokio::test]
    async fn test_layout_write_is_retried() {
        let stats = Arc::new(PipelineStats::new());
        let store = RetryingStore::new(MemoryStore::new(), fast(), stats);
        let layout = RecordLayout::new(vec![vec!["Time".to_string()]]);
        store.inner().create_record("x", &RecordLayout::new(vec![])).await.unwrap();
        store
            .inner()
            .fail_next(StoreOp::WriteLayout, StoreError::Unavailable("503".into()));

        store.write_layout("x", &layout).await.unwrap();
        assert_eq!(store.inner().calls(StoreOp::WriteLayout), 2);
        assert_eq!(store.inner().rows("x").unwrap(), layout.rows().to_vec());
    }

    #[tokio::test]
    async fn test_append_is_not_retried() {
        let stats = Arc::new(PipelineStats::new());
        let store = RetryingStore::new(MemoryStore::new(), fast(), stats);
        store
            .inner()
            .create_record("x", &RecordLayout::new(vec![]))
            .await
            .unwrap();
        store
            .inner()
            .fail_next(StoreOp::AppendRow, StoreError::Unavailable("503".into()));

        assert!(store.append_row("x", 1, &["a".to_string()]).await.is_err());
        assert_eq!(store.inner().calls(StoreOp::AppendRow), 1);
    }
}
