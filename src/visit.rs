//! Visit entries and the visit log.
//!
//! A [`VisitEntry`] is captured by the HTTP layer when a tracking request
//! arrives and is turned into one log row by the [`VisitLogger`]:
//!
//! | Time | IP | User Agent | Preferred Language |
//! |------|----|------------|--------------------|
//! | `10/19/2026, 3:04:05 PM` | `203.0.113.5` | `TestAgent/1.0` | `en-US` |
//!
//! Timestamps are stored in UTC and rendered in the reporting timezone only
//! when the row is written.
//!
//! # Choosing the next row
//!
//! With [`ConsistencyPolicy::Naive`] the logger reads the whole record to find
//! the first free row and writes there. That read grows with the log, and two
//! concurrent appends can pick the same row and overwrite each other. With
//! [`ConsistencyPolicy::Serialized`] the logger uses the store's append
//! operation, where the row is picked by the store itself.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::counter::ConsistencyPolicy;
use crate::error::Result;
use crate::record::{AGGREGATE_HEADER_ROW, LOG_HEADER_ROW};
use crate::store::{RecordStore, Row};

/// Default reporting timezone.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

/// How the visitor's network origin is derived from a request.
///
/// Forwarding headers are set by whoever sits in front of the collector and
/// can be forged by clients, so they are only honoured when the deployment
/// says a trusted proxy writes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Use the address of the TCP peer.
    #[default]
    Peer,
    /// Use the leftmost `X-Forwarded-For` entry, falling back to the peer.
    ForwardedFor,
}

impl OriginPolicy {
    /// Derives the origin string for a request.
    pub fn origin(&self, peer: Option<SocketAddr>, headers: &HeaderMap) -> String {
        let peer_ip = || peer.map(|p| p.ip().to_string()).unwrap_or_default();
        match self {
            OriginPolicy::Peer => peer_ip(),
            OriginPolicy::ForwardedFor => headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(peer_ip),
        }
    }
}

/// One recorded visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitEntry {
    pub timestamp: DateTime<Utc>,
    pub origin: String,
    pub user_agent: Option<String>,
    pub preferred_language: Option<String>,
}

impl VisitEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(origin: impl Into<String>) -> Self {
        Self::at(Utc::now(), origin)
    }

    /// Creates an entry with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, origin: impl Into<String>) -> Self {
        Self {
            timestamp,
            origin: origin.into(),
            user_agent: None,
            preferred_language: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_preferred_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_language = Some(language.into());
        self
    }

    /// Builds an entry from request metadata. Header values are kept
    /// verbatim; values that are not valid UTF-8 are decoded lossily.
    pub fn from_request(policy: OriginPolicy, peer: Option<SocketAddr>, headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        };
        Self {
            timestamp: Utc::now(),
            origin: policy.origin(peer, headers),
            user_agent: header("user-agent"),
            preferred_language: header("accept-language"),
        }
    }

    /// Log row for a resource record.
    pub fn row(&self, tz: Tz) -> Row {
        vec![
            format_timestamp(self.timestamp, tz),
            self.origin.clone(),
            self.user_agent.clone().unwrap_or_default(),
            self.preferred_language.clone().unwrap_or_default(),
        ]
    }

    /// Log row for the aggregate record, with the resource in the second
    /// column.
    pub fn aggregate_row(&self, website: &str, tz: Tz) -> Row {
        let mut row = self.row(tz);
        row.insert(1, website.to_string());
        row
    }
}

/// Renders a timestamp in `tz` the way US-English locales print it, e.g.
/// `10/19/2026, 3:04:05 PM`.
pub fn format_timestamp(timestamp: DateTime<Utc>, tz: Tz) -> String {
    timestamp
        .with_timezone(&tz)
        .format("%-m/%-d/%Y, %-I:%M:%S %p")
        .to_string()
}

/// Appends visit rows to records.
pub struct VisitLogger {
    store: Arc<dyn RecordStore>,
    policy: ConsistencyPolicy,
    tz: Tz,
}

impl VisitLogger {
    pub fn new(store: Arc<dyn RecordStore>, policy: ConsistencyPolicy, tz: Tz) -> Self {
        Self { store, policy, tz }
    }

    /// Appends `entry` to the log of resource `name` and returns the row it
    /// was written to.
    pub async fn append_visit(&self, name: &str, entry: &VisitEntry) -> Result<u32> {
        self.append(name, entry.row(self.tz), LOG_HEADER_ROW).await
    }

    /// Appends `entry` to the aggregate record `aggregate`, tagging it with
    /// the resource it belongs to.
    pub async fn append_aggregate(&self, aggregate: &str, website: &str, entry: &VisitEntry) -> Result<u32> {
        self.append(aggregate, entry.aggregate_row(website, self.tz), AGGREGATE_HEADER_ROW)
            .await
    }

    async fn append(&self, name: &str, row: Row, header_row: u32) -> Result<u32> {
        match self.policy {
            ConsistencyPolicy::Serialized => {
                Ok(self.store.append_row(name, header_row, &row).await?)
            }
            ConsistencyPolicy::Naive => {
                let existing = self.store.read_range(name).await?;
                let next = existing.len().max(header_row as usize) as u32 + 1;
                self.store.write_row(name, next, &row).await?;
                Ok(next)
            }
        }
    }
}
