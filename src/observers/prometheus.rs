//! Prometheus exposition of pipeline statistics.
//!
//! [`PrometheusObserver`] turns a [`StatsSnapshot`] into the Prometheus text
//! format using the official `prometheus` crate: each statistic becomes an
//! `IntCounter` or an `IntGauge` according to its [`MetricKind`], is
//! registered in a fresh [`Registry`] and encoded with the [`TextEncoder`].
//!
//! ```text
//! # HELP visitatori_visits_received_total Visits accepted by the HTTP layer
//! # TYPE visitatori_visits_received_total counter
//! visitatori_visits_received_total{instance="collector-1"} 42
//! ```
//!
//! The server renders on every scrape of `/metrics`; statistics are never
//! reset by rendering.
//!
//! # Feature Flag
//!
//! Requires the `prometheus` feature (enabled by default).

use std::collections::HashMap;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::observers::PrometheusError;
use crate::stats::{MetricKind, StatsSnapshot};

/// Result type for Prometheus observer operations.
pub type Result<T> = std::result::Result<T, PrometheusError>;

/// Renders statistics snapshots in the Prometheus text format.
#[derive(Debug, Clone, Default)]
pub struct PrometheusObserver {
    namespace: Option<String>,
    subsystem: Option<String>,
    const_labels: HashMap<String, String>,
}

impl PrometheusObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace (prefix) for all metrics.
    ///
    /// Namespace "visitatori" + metric "visits_received_total" =
    /// "visitatori_visits_received_total".
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Sets the subsystem, placed between namespace and metric name.
    pub fn with_subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = Some(subsystem.to_string());
        self
    }

    /// Adds a constant label to all metrics.
    pub fn with_const_label(mut self, name: &str, value: &str) -> Self {
        self.const_labels.insert(name.to_string(), value.to_string());
        self
    }

    /// Sanitizes a metric name to be Prometheus-compatible.
    ///
    /// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    fn sanitize_name(name: &str) -> String {
        let mut result: String = name
            .chars()
            .filter_map(|c| match c {
                c if c.is_ascii_alphanumeric() || c == '_' || c == ':' => Some(c),
                '-' | '.' | ' ' => Some('_'),
                _ => None,
            })
            .collect();
        if result.is_empty() {
            result.push_str("unnamed");
        }
        if result.starts_with(|c: char| c.is_ascii_digit()) {
            result.insert(0, '_');
        }
        result
    }

    fn build_full_name(&self, name: &str) -> String {
        let sanitized = Self::sanitize_name(name);
        match (&self.namespace, &self.subsystem) {
            (Some(ns), Some(ss)) => format!("{ns}_{ss}_{sanitized}"),
            (Some(ns), None) => format!("{ns}_{sanitized}"),
            (None, Some(ss)) => format!("{ss}_{sanitized}"),
            (None, None) => sanitized,
        }
    }

    /// Renders a snapshot to the exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if two statistics map to the same metric name or if
    /// encoding fails.
    pub fn render(&self, snapshot: &StatsSnapshot) -> Result<String> {
        let registry = Registry::new();

        for entry in &snapshot.entries {
            let name = self.build_full_name(&entry.name);
            let help = if entry.help.is_empty() {
                format!("{} metric", entry.name)
            } else {
                entry.help.clone()
            };
            match entry.kind {
                MetricKind::Counter => self.register_counter(&registry, &name, &help, entry.value)?,
                MetricKind::Gauge => self.register_gauge(&registry, &name, &help, entry.value)?,
            }
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(|e| PrometheusError::EncodeError(e.to_string()))?;
        Ok(String::from_utf8(buffer)?)
    }

    fn register_counter(&self, registry: &Registry, name: &str, help: &str, value: i64) -> Result<()> {
        // counters cannot go below zero
        let value = value.max(0) as u64;
        if self.const_labels.is_empty() {
            let counter = IntCounter::new(name, help)?;
            counter.inc_by(value);
            registry.register(Box::new(counter))?;
        } else {
            let (names, values) = self.label_pairs();
            let counter = IntCounterVec::new(Opts::new(name, help), &names)?;
            counter.with_label_values(&values).inc_by(value);
            registry.register(Box::new(counter))?;
        }
        Ok(())
    }

    fn register_gauge(&self, registry: &Registry, name: &str, help: &str, value: i64) -> Result<()> {
        if self.const_labels.is_empty() {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(value);
            registry.register(Box::new(gauge))?;
        } else {
            let (names, values) = self.label_pairs();
            let gauge = IntGaugeVec::new(Opts::new(name, help), &names)?;
            gauge.with_label_values(&values).set(value);
            registry.register(Box::new(gauge))?;
        }
        Ok(())
    }

    fn label_pairs(&self) -> (Vec<&str>, Vec<&str>) {
        self.const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .unzip()
    }
}
