//! JSON rendering of pipeline statistics.
//!
//! The collector logs one JSON document when it shuts down so the totals of
//! a run survive in the log even without a metrics scraper:
//!
//! ```text
//! {"timestamp_ms":1760000000000,"stats":{"visits_received_total":12,...}}
//! ```
//!
//! Statistics are emitted as a flat `name -> value` object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stats::StatsSnapshot;

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    pub pretty: bool,
    /// Wrap the values in a [`Report`] carrying the capture time.
    pub include_timestamp: bool,
}

/// A timestamped capture of all statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub timestamp_ms: u64,
    pub stats: Map<String, Value>,
}

/// Serializes statistics snapshots.
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Flattens a snapshot into a `name -> value` object.
    pub fn collect(&self, snapshot: &StatsSnapshot) -> Map<String, Value> {
        snapshot
            .entries
            .iter()
            .map(|e| (e.name.clone(), Value::from(e.value)))
            .collect()
    }

    /// Serializes a snapshot to a JSON string.
    pub fn to_json(&self, snapshot: &StatsSnapshot) -> Result<String, serde_json::Error> {
        let stats = self.collect(snapshot);
        if self.config.include_timestamp {
            let report = Report {
                timestamp_ms: current_timestamp_ms(),
                stats,
            };
            self.encode(&report)
        } else {
            self.encode(&stats)
        }
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        if self.config.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }
}

fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
