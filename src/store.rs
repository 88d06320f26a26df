//! Storage adapter for the tabular backend.
//!
//! Every tracked resource owns one *record*: a named sheet inside a single
//! spreadsheet. The [`RecordStore`] trait exposes the handful of operations
//! the pipeline needs. Each call is an independent round trip; nothing groups
//! two calls into a transaction, so any read-then-write sequence built on top
//! of this trait is exposed to interleaving with other requests.
//!
//! ```text
//!        ┌──────────── record "blog-post-1" ────────────┐
//!   1    │ View Count: │ 42            │                │  ◄── counter cell B1
//!   2    │             │               │                │
//!   3    │ Time        │ IP            │ User Agent │ … │  ◄── log header
//!   4    │ 10/19/2026… │ 203.0.113.5   │ TestAgent  │ … │  ◄── visit log
//!   …    │ …           │ …             │ …          │ … │
//!        └──────────────────────────────────────────────┘
//! ```
//!
//! Implementations:
//!
//! - [`memory::MemoryStore`]: in-process, used by tests, benches and
//!   `--in-memory` runs.
//! - [`sheets::SheetsStore`]: Google Sheets v4 REST API (feature `sheets`).

pub mod memory;
#[cfg(feature = "sheets")]
pub mod sheets;

use std::collections::HashSet;
use std::fmt::{self, Display};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

/// A row of cell values. Cells are kept as strings, the way the store
/// displays them.
pub type Row = Vec<String>;

/// Result type for storage adapter calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A cell address in A1 notation.
///
/// `column` is zero-based (`0` is column `A`), `row` is one-based, matching
/// the way spreadsheet users read addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub column: u32,
    pub row: u32,
}

impl CellRef {
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Converts a zero-based column index into its letter form.
    pub fn column_name(column: u32) -> String {
        let mut n = column + 1;
        let mut name = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            name.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        name.reverse();
        String::from_utf8_lossy(&name).into_owned()
    }
}

impl Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::column_name(self.column), self.row)
    }
}

/// The initial content of a freshly created record, written from row 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    rows: Vec<Row>,
}

impl RecordLayout {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of columns spanned by the widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Operations offered by the tabular backend.
///
/// The store is shared by every request and every process instance; it makes
/// no ordering promise between calls issued by different callers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the names of all existing records.
    async fn record_names(&self) -> StoreResult<HashSet<String>>;

    /// Creates a record and writes `layout` starting at row 1.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the name is taken; in that
    /// case the existing record is left untouched. A backend that needs more
    /// than one round trip may leave an empty record behind when a later
    /// round trip fails; callers finish it with
    /// [`write_layout`](Self::write_layout).
    async fn create_record(&self, name: &str, layout: &RecordLayout) -> StoreResult<()>;

    /// Writes `layout` into an existing record starting at row 1, in a single
    /// call. Cells outside the layout are left alone.
    async fn write_layout(&self, name: &str, layout: &RecordLayout) -> StoreResult<()>;

    /// Reads one cell. An empty cell reads as `None`.
    async fn read_cell(&self, name: &str, cell: CellRef) -> StoreResult<Option<String>>;

    /// Overwrites one cell.
    async fn write_cell(&self, name: &str, cell: CellRef, value: &str) -> StoreResult<()>;

    /// Reads every row of the record, up to the last non-empty one.
    async fn read_range(&self, name: &str) -> StoreResult<Vec<Row>>;

    /// Writes `values` into row `row` (one-based), starting at column A.
    async fn write_row(&self, name: &str, row: u32, values: &[String]) -> StoreResult<()>;

    /// Appends `values` to the table whose header sits in row `header_row`,
    /// after its last non-empty row.
    ///
    /// Rows above the header (the counter of a resource record) never take
    /// part in the append. The row index is chosen by the store, so
    /// concurrent appends never target the same row. Returns the index of the
    /// written row.
    async fn append_row(&self, name: &str, header_row: u32, values: &[String]) -> StoreResult<u32>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn record_names(&self) -> StoreResult<HashSet<String>> {
        (**self).record_names().await
    }

    async fn create_record(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        (**self).create_record(name, layout).await
    }

    async fn write_layout(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        (**self).write_layout(name, layout).await
    }

    async fn read_cell(&self, name: &str, cell: CellRef) -> StoreResult<Option<String>> {
        (**self).read_cell(name, cell).await
    }

    async fn write_cell(&self, name: &str, cell: CellRef, value: &str) -> StoreResult<()> {
        (**self).write_cell(name, cell, value).await
    }

    async fn read_range(&self, name: &str) -> StoreResult<Vec<Row>> {
        (**self).read_range(name).await
    }

    async fn write_row(&self, name: &str, row: u32, values: &[String]) -> StoreResult<()> {
        (**self).write_row(name, row, values).await
    }

    async fn append_row(&self, name: &str, header_row: u32, values: &[String]) -> StoreResult<u32> {
        (**self).append_row(name, header_row, values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ref_display() {
        assert_eq!(CellRef::new(0, 1).to_string(), "A1");
        assert_eq!(CellRef::new(1, 1).to_string(), "B1");
        assert_eq!(CellRef::new(25, 7).to_string(), "Z7");
        assert_eq!(CellRef::new(26, 3).to_string(), "AA3");
        assert_eq!(CellRef::new(27, 3).to_string(), "AB3");
        assert_eq!(CellRef::new(701, 1).to_string(), "ZZ1");
        assert_eq!(CellRef::new(702, 1).to_string(), "AAA1");
    }

    #[test]
    fn test_layout_width() {
        let layout = RecordLayout::new(vec![
            vec!["a".into(), "b".into()],
            vec![],
            vec!["c".into(), "d".into(), "e".into()],
        ]);
        assert_eq!(layout.width(), 3);
        assert_eq!(layout.rows().len(), 3);
        assert_eq!(RecordLayout::new(vec![]).width(), 0);
    }
}
