//! In-process record store.
//!
//! [`MemoryStore`] keeps every record as a grid of strings behind a
//! [`parking_lot::Mutex`]. Each operation is atomic on its own, but every
//! call first yields to the scheduler, so two calls issued back to back by one
//! caller can be interleaved with calls from other tasks exactly as round
//! trips to a remote store would be. This is what makes the lost-update race
//! reproducible in tests.
//!
//! Failures can be injected per operation with [`MemoryStore::fail_next`].

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CellRef, RecordLayout, RecordStore, Row, StoreResult};
use crate::error::StoreError;

/// Longest record name accepted, mirroring the spreadsheet title limit.
pub const MAX_NAME_LEN: usize = 100;

/// Identifies a [`RecordStore`] operation for fault injection and call
/// accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    RecordNames,
    CreateRecord,
    WriteLayout,
    ReadCell,
    WriteCell,
    ReadRange,
    WriteRow,
    AppendRow,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Vec<Row>>,
    failures: HashMap<StoreOp, VecDeque<StoreError>>,
    calls: HashMap<StoreOp, u64>,
}

/// A [`RecordStore`] living entirely in memory.
///
/// # Examples
///
/// ```rust
/// use visitatori::store::memory::MemoryStore;
/// use visitatori::store::{CellRef, RecordLayout, RecordStore};
///
/// # tokio_test_block_on(async {
/// let store = MemoryStore::new();
/// let layout = RecordLayout::new(vec![vec!["View Count:".into(), "0".into()]]);
/// store.create_record("home", &layout).await.unwrap();
///
/// let count = store.read_cell("home", CellRef::new(1, 1)).await.unwrap();
/// assert_eq!(count.as_deref(), Some("0"));
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to `op` fail with `err`.
    ///
    /// Multiple injected failures for the same operation are consumed in
    /// order, one per call.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.inner
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Number of times `op` has been called, including failed calls.
    pub fn calls(&self, op: StoreOp) -> u64 {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of existing records.
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns a copy of a record's rows, trimmed like [`RecordStore::read_range`].
    pub fn rows(&self, name: &str) -> Option<Vec<Row>> {
        self.inner.lock().records.get(name).map(|rows| trimmed(rows))
    }

    /// Overwrites a cell directly, bypassing fault injection.
    ///
    /// Creates the record if needed. Meant for seeding test fixtures such as
    /// a corrupted counter.
    pub fn set_cell(&self, name: &str, cell: CellRef, value: &str) {
        let mut inner = self.inner.lock();
        let rows = inner.records.entry(name.to_string()).or_default();
        put_cell(rows, cell, value);
    }

    /// Simulates one round trip: yields to the scheduler, counts the call and
    /// consumes an injected failure if there is one.
    async fn round_trip(&self, op: StoreOp) -> StoreResult<()> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock();
        *inner.calls.entry(op).or_default() += 1;
        match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::Rejected("empty record name".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(StoreError::Rejected(format!(
            "record name longer than {MAX_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(StoreError::Rejected(format!(
            "record name contains control characters: {name:?}"
        )));
    }
    Ok(())
}

fn put_cell(rows: &mut Vec<Row>, cell: CellRef, value: &str) {
    let row = cell.row.max(1) as usize - 1;
    let column = cell.column as usize;
    if rows.len() <= row {
        rows.resize_with(row + 1, Vec::new);
    }
    let cells = &mut rows[row];
    if cells.len() <= column {
        cells.resize(column + 1, String::new());
    }
    cells[column] = value.to_string();
}

fn is_blank(row: &Row) -> bool {
    row.iter().all(String::is_empty)
}

fn trimmed(rows: &[Row]) -> Vec<Row> {
    let last = rows.iter().rposition(|r| !is_blank(r)).map_or(0, |i| i + 1);
    rows[..last]
        .iter()
        .map(|row| {
            let end = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
            row[..end].to_vec()
        })
        .collect()
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn record_names(&self) -> StoreResult<HashSet<String>> {
        self.round_trip(StoreOp::RecordNames).await?;
        Ok(self.inner.lock().records.keys().cloned().collect())
    }

    async fn create_record(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        self.round_trip(StoreOp::CreateRecord).await?;
        validate_name(name)?;
        let mut inner = self.inner.lock();
        if inner.records.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        inner
            .records
            .insert(name.to_string(), layout.rows().to_vec());
        Ok(())
    }

    async fn write_layout(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        self.round_trip(StoreOp::WriteLayout).await?;
        let mut inner = self.inner.lock();
        let rows = inner
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        for (index, values) in layout.rows().iter().enumerate() {
            for (column, value) in values.iter().enumerate() {
                put_cell(rows, CellRef::new(column as u32, index as u32 + 1), value);
            }
        }
        Ok(())
    }

    async fn read_cell(&self, name: &str, cell: CellRef) -> StoreResult<Option<String>> {
        self.round_trip(StoreOp::ReadCell).await?;
        let inner = self.inner.lock();
        let rows = inner
            .records
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let value = rows
            .get(cell.row.max(1) as usize - 1)
            .and_then(|row| row.get(cell.column as usize))
            .filter(|v| !v.is_empty())
            .cloned();
        Ok(value)
    }

    async fn write_cell(&self, name: &str, cell: CellRef, value: &str) -> StoreResult<()> {
        self.round_trip(StoreOp::WriteCell).await?;
        let mut inner = self.inner.lock();
        let rows = inner
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        put_cell(rows, cell, value);
        Ok(())
    }

    async fn read_range(&self, name: &str) -> StoreResult<Vec<Row>> {
        self.round_trip(StoreOp::ReadRange).await?;
        let inner = self.inner.lock();
        inner
            .records
            .get(name)
            .map(|rows| trimmed(rows))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn write_row(&self, name: &str, row: u32, values: &[String]) -> StoreResult<()> {
        self.round_trip(StoreOp::WriteRow).await?;
        if row == 0 {
            return Err(StoreError::Rejected("row indices start at 1".into()));
        }
        let mut inner = self.inner.lock();
        let rows = inner
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        for (column, value) in values.iter().enumerate() {
            put_cell(rows, CellRef::new(column as u32, row), value);
        }
        Ok(())
    }

    async fn append_row(&self, name: &str, header_row: u32, values: &[String]) -> StoreResult<u32> {
        self.round_trip(StoreOp::AppendRow).await?;
        let mut inner = self.inner.lock();
        let rows = inner
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let last = rows.iter().rposition(|r| !is_blank(r)).map_or(0, |i| i + 1) as u32;
        let row = last.max(header_row) + 1;
        for (column, value) in values.iter().enumerate() {
            put_cell(rows, CellRef::new(column as u32, row), value);
        }
        Ok(row)
    }
}
