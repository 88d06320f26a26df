//! Exporters for the collector's pipeline statistics.
//!
//! Every observer renders a [`StatsSnapshot`](crate::stats::StatsSnapshot)
//! taken from [`PipelineStats`](crate::stats::PipelineStats):
//!
//! - [`json`] - serialize a snapshot, used for the shutdown report
//! - [`prometheus`] - Prometheus exposition format, served on `/metrics`
//!
//! # Unified Error Handling
//!
//! All observers share the [`ObserverError`] type.
//!
//! # Feature Flags
//!
//! - `prometheus` - Enables the [`prometheus`] module (on by default)
//!
//! # Example
//!
//! ```rust
//! use visitatori::observers::json::JsonObserver;
//! use visitatori::stats::PipelineStats;
//!
//! let stats = PipelineStats::new();
//! stats.visits_received.add(3);
//!
//! let json = JsonObserver::new().to_json(&stats.snapshot()).unwrap();
//! assert!(json.contains("\"visits_received_total\""));
//! ```

mod error;

pub use error::{ObserverError, Result};

#[cfg(feature = "prometheus")]
pub use error::PrometheusError;

pub mod json;

#[cfg(feature = "prometheus")]
pub mod prometheus;
