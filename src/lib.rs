//! # Visitatori - Web Beacon Visit Collector
//!
//! A small HTTP service that counts visits to web resources and keeps, for
//! every resource, a record in a spreadsheet: a view counter and an
//! append-only visit log. Pages embed a 1×1 image pointing at
//! `https://collector.example/<resource>`; each request for that image is a
//! visit.
//!
//! ## Record Layout
//!
//! Each resource owns one record (a sheet tab) named after it:
//!
//! ```text
//!        A                       B              C              D
//!   1  │ View Count:           │ 42           │              │                   │
//!   2  │                       │              │              │                   │
//!   3  │ Time                  │ IP           │ User Agent   │ Preferred Language│
//!   4  │ 3/14/2025, 9:26:53 AM │ 203.0.113.5  │ Mozilla/5.0  │ en-US,en;q=0.9    │
//!   …
//! ```
//!
//! An optional aggregate record (`all` by default) receives one row per visit
//! to any resource, with the resource name in the second column.
//!
//! ## Recording a Visit
//!
//! ```text
//!   GET /blog ──► handler ──► VisitQueue ──► worker ──► VisitRecorder
//!                   │                                      │
//!                   └─► 1×1 PNG                            ├─ ensure_record("blog")
//!                                                          ├─ increment counter   ┐ per-resource
//!                                                          ├─ append visit row    ┘ lock
//!                                                          └─ append aggregate row
//! ```
//!
//! The response never waits for the spreadsheet. Recording failures are
//! logged through `tracing` and counted in [`stats::PipelineStats`].
//!
//! ## Lost Updates
//!
//! The spreadsheet offers no atomic increment, so the counter is read and
//! written back. Two visits whose read/write pairs interleave lose one
//! increment. [`counter::ConsistencyPolicy::Serialized`] (the default) takes a
//! per-resource lock around the increment and the log append and uses the
//! store's own append for log rows; [`counter::ConsistencyPolicy::Naive`]
//! does neither, for comparison.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use visitatori::recorder::{RecorderConfig, VisitRecorder};
//! use visitatori::stats::PipelineStats;
//! use visitatori::store::memory::MemoryStore;
//! use visitatori::visit::VisitEntry;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let recorder = VisitRecorder::new(store.clone(), RecorderConfig::default(), Arc::new(PipelineStats::new()));
//!
//! let outcome = recorder
//!     .record_visit("blog", &VisitEntry::new("203.0.113.5").with_user_agent("curl/8.5"))
//!     .await;
//! assert_eq!(outcome.count, Some(1));
//! assert_eq!(store.rows("blog").unwrap()[0][1], "1");
//! # });
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`store`] | [`store::RecordStore`] trait, in-memory and Google Sheets backends |
//! | [`retry`] | Retry decorator for transient store failures |
//! | [`record`] | Record layouts and first-visit provisioning |
//! | [`counter`] | View counter increments and consistency policies |
//! | [`visit`] | Visit entries, origin policy and log appends |
//! | [`recorder`] | The per-visit recording sequence |
//! | [`queue`] | Bounded queue and worker pool between HTTP and recording |
//! | [`server`] | axum routes, pixel response, graceful shutdown |
//! | [`stats`] | Sharded pipeline statistics |
//! | [`observers`] | JSON and Prometheus rendering of statistics |
//! | [`config`] | Command-line configuration |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `sheets` | yes | [`store::sheets`] backend over the Sheets v4 REST API |
//! | `prometheus` | yes | [`observers::prometheus`] and the `/metrics` route |

pub mod config;
pub mod counter;
pub mod error;
pub mod locks;
pub mod observers;
pub mod queue;
pub mod record;
pub mod recorder;
pub mod retry;
pub mod server;
pub mod stats;
pub mod store;
pub mod visit;

pub use error::{Error, Result, StoreError};
