//! Command-line configuration of the collector.

use clap::Parser;
use chrono_tz::Tz;
use thiserror::Error;

use crate::counter::ConsistencyPolicy;
use crate::queue::{QueueConfig, QueueFullPolicy};
use crate::recorder::{RecorderConfig, DEFAULT_AGGREGATE_RECORD};
use crate::retry::RetryPolicy;
#[cfg(feature = "sheets")]
use crate::store::sheets::SheetsConfig;
use crate::visit::OriginPolicy;

/// Invalid combination of command-line settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a spreadsheet id is required unless --in-memory is set")]
    MissingSheetId,
    #[error("an access token is required to reach the spreadsheet")]
    MissingAccessToken,
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("spreadsheet storage is not compiled in; rebuild with the `sheets` feature or pass --in-memory")]
    SheetsDisabled,
    #[error("metric label must be NAME=VALUE: {0}")]
    InvalidLabel(String),
}

/// CLI arguments for the collector.
#[derive(Debug, Parser)]
#[command(name = "visitatori")]
#[command(about = "Web beacon collector writing visits to a spreadsheet")]
pub struct CliArgs {
    /// HTTP server port.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Spreadsheet identifier.
    #[arg(long, env = "SHEET_ID")]
    pub sheet_id: Option<String>,

    /// OAuth2 bearer token for the Sheets API.
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Keep records in memory instead of a spreadsheet (for testing).
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,

    /// IANA timezone used to format visit timestamps.
    #[arg(long, default_value = "America/Los_Angeles")]
    pub timezone: String,

    /// Record collecting a row for every visit.
    #[arg(long, default_value = DEFAULT_AGGREGATE_RECORD)]
    pub aggregate_record: String,

    /// Disable the aggregate record.
    #[arg(long, default_value_t = false)]
    pub no_aggregate: bool,

    /// Take the visitor address from X-Forwarded-For (behind a trusted proxy).
    #[arg(long, default_value_t = false)]
    pub trust_forwarded_for: bool,

    /// Skip per-resource serialization; concurrent visits may be lost.
    #[arg(long, default_value_t = false)]
    pub naive: bool,

    /// Maximum number of visits waiting to be recorded.
    #[arg(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Maximum number of visits recorded concurrently.
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Delay the response instead of dropping visits when the queue is full.
    #[arg(long, default_value_t = false)]
    pub block_when_full: bool,

    /// Attempts per store call on transient failures (1 disables retries).
    #[arg(long, default_value_t = 3)]
    pub retry_attempts: u32,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    pub log_json: bool,

    /// Prefix of every exported metric name.
    #[arg(long, default_value = DEFAULT_METRICS_NAMESPACE)]
    pub metrics_namespace: String,

    /// Optional name part between the namespace and the metric name.
    #[arg(long)]
    pub metrics_subsystem: Option<String>,

    /// Constant label added to every metric, as NAME=VALUE (repeatable).
    #[arg(long = "metrics-label", value_name = "NAME=VALUE")]
    pub metrics_labels: Vec<String>,
}

/// Default prefix of exported metric names.
pub const DEFAULT_METRICS_NAMESPACE: &str = "visitatori";

/// Naming of the exported metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub namespace: String,
    pub subsystem: Option<String>,
    /// Constant labels, in command-line order.
    pub labels: Vec<(String, String)>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
            subsystem: None,
            labels: Vec::new(),
        }
    }
}

/// Where records are kept.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    InMemory,
    #[cfg(feature = "sheets")]
    Sheets(SheetsConfig),
}

/// Fully validated collector settings.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub port: u16,
    pub store: StoreConfig,
    pub origin: OriginPolicy,
    pub recorder: RecorderConfig,
    pub queue: QueueConfig,
    pub metrics: MetricsConfig,
    pub log_json: bool,
}

impl CliArgs {
    /// Validates the arguments and converts them to collector settings.
    pub fn to_config(&self) -> Result<CollectorConfig, ConfigError> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("--queue-capacity"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Zero("--workers"));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Zero("--retry-attempts"));
        }

        let recorder = RecorderConfig {
            policy: if self.naive {
                ConsistencyPolicy::Naive
            } else {
                ConsistencyPolicy::Serialized
            },
            timezone,
            aggregate_record: (!self.no_aggregate).then(|| self.aggregate_record.clone()),
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                ..RetryPolicy::default()
            },
        };
        let queue = QueueConfig {
            capacity: self.queue_capacity,
            workers: self.workers,
            full_policy: if self.block_when_full {
                QueueFullPolicy::Block
            } else {
                QueueFullPolicy::DropNewest
            },
        };
        let origin = if self.trust_forwarded_for {
            OriginPolicy::ForwardedFor
        } else {
            OriginPolicy::Peer
        };

        Ok(CollectorConfig {
            port: self.port,
            store: self.store_config()?,
            origin,
            recorder,
            queue,
            metrics: self.metrics_config()?,
            log_json: self.log_json,
        })
    }

    fn metrics_config(&self) -> Result<MetricsConfig, ConfigError> {
        let labels = self
            .metrics_labels
            .iter()
            .map(|label| {
                label
                    .split_once('=')
                    .filter(|(name, _)| !name.trim().is_empty())
                    .map(|(name, value)| (name.trim().to_string(), value.to_string()))
                    .ok_or_else(|| ConfigError::InvalidLabel(label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MetricsConfig {
            namespace: self.metrics_namespace.clone(),
            subsystem: self.metrics_subsystem.clone().filter(|s| !s.is_empty()),
            labels,
        })
    }

    fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        if self.in_memory {
            return Ok(StoreConfig::InMemory);
        }
        let sheet_id = self
            .sheet_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingSheetId)?;
        let token = self
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingAccessToken)?;

        #[cfg(feature = "sheets")]
        {
            Ok(StoreConfig::Sheets(SheetsConfig::new(sheet_id, token)))
        }
        #[cfg(not(feature = "sheets"))]
        {
            let _ = (sheet_id, token);
            Err(ConfigError::SheetsDisabled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CliArgs {
        CliArgs {
            port: 3000,
            sheet_id: None,
            access_token: None,
            in_memory: true,
            timezone: "America/Los_Angeles".to_string(),
            aggregate_record: "all".to_string(),
            no_aggregate: false,
            trust_forwarded_for: false,
            naive: false,
            queue_capacity: 1024,
            workers: 8,
            block_when_full: false,
            retry_attempts: 3,
            log_json: false,
            metrics_namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
            metrics_subsystem: None,
            metrics_labels: Vec::new(),
        }
    }

    #[test]
    fn test_in_memory_defaults() {
        let config = args().to_config().unwrap();

        assert!(matches!(config.store, StoreConfig::InMemory));
        assert_eq!(config.port, 3000);
        assert_eq!(config.origin, OriginPolicy::Peer);
        assert_eq!(config.recorder, RecorderConfig::default());
        assert_eq!(config.queue, QueueConfig::default());
        assert_eq!(config.metrics, MetricsConfig::default());
    }

    #[cfg(feature = "sheets")]
    #[test]
    fn test_sheets_store() {
        let sheets_args = CliArgs {
            in_memory: false,
            sheet_id: Some("1AbC".to_string()),
            access_token: Some("ya29.token".to_string()),
            ..args()
        };

        match sheets_args.to_config().unwrap().store {
            StoreConfig::Sheets(sheets) => {
                assert_eq!(sheets.spreadsheet_id, "1AbC");
                assert_eq!(sheets.access_token, "ya29.token");
            }
            other => panic!("expected sheets store, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_sheet_id() {
        let no_id = CliArgs {
            in_memory: false,
            access_token: Some("token".to_string()),
            ..args()
        };
        assert_eq!(no_id.to_config().unwrap_err(), ConfigError::MissingSheetId);

        let blank_id = CliArgs {
            in_memory: false,
            sheet_id: Some("  ".to_string()),
            access_token: Some("token".to_string()),
            ..args()
        };
        assert_eq!(blank_id.to_config().unwrap_err(), ConfigError::MissingSheetId);
    }

    #[test]
    fn test_missing_token() {
        let no_token = CliArgs {
            in_memory: false,
            sheet_id: Some("1AbC".to_string()),
            ..args()
        };
        assert_eq!(no_token.to_config().unwrap_err(), ConfigError::MissingAccessToken);
    }

    #[test]
    fn test_unknown_timezone() {
        let mars = CliArgs {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..args()
        };
        assert_eq!(
            mars.to_config().unwrap_err(),
            ConfigError::UnknownTimezone("Mars/Olympus_Mons".to_string())
        );
    }

    #[test]
    fn test_zero_sizes() {
        let no_workers = CliArgs { workers: 0, ..args() };
        assert_eq!(no_workers.to_config().unwrap_err(), ConfigError::Zero("--workers"));

        let no_room = CliArgs { queue_capacity: 0, ..args() };
        assert_eq!(no_room.to_config().unwrap_err(), ConfigError::Zero("--queue-capacity"));

        let no_attempts = CliArgs { retry_attempts: 0, ..args() };
        assert_eq!(no_attempts.to_config().unwrap_err(), ConfigError::Zero("--retry-attempts"));
    }

    #[test]
    fn test_flags_map_to_policies() {
        let flagged = CliArgs {
            timezone: "Europe/Rome".to_string(),
            no_aggregate: true,
            trust_forwarded_for: true,
            naive: true,
            block_when_full: true,
            retry_attempts: 1,
            ..args()
        };

        let config = flagged.to_config().unwrap();
        assert_eq!(config.recorder.policy, ConsistencyPolicy::Naive);
        assert_eq!(config.recorder.timezone, chrono_tz::Europe::Rome);
        assert_eq!(config.recorder.aggregate_record, None);
        assert_eq!(config.recorder.retry.max_attempts, 1);
        assert_eq!(config.queue.full_policy, QueueFullPolicy::Block);
        assert_eq!(config.origin, OriginPolicy::ForwardedFor);
    }

    #[test]
    fn test_metric_labels() {
        let labelled = CliArgs {
            metrics_subsystem: Some("edge".to_string()),
            metrics_labels: vec!["instance=collector-1".to_string(), "zone=a=b".to_string()],
            ..args()
        };
        let metrics = labelled.to_config().unwrap().metrics;
        assert_eq!(metrics.subsystem.as_deref(), Some("edge"));
        assert_eq!(
            metrics.labels,
            vec![
                ("instance".to_string(), "collector-1".to_string()),
                ("zone".to_string(), "a=b".to_string()),
            ]
        );

        let broken = CliArgs {
            metrics_labels: vec!["instance".to_string()],
            ..args()
        };
        assert_eq!(
            broken.to_config().unwrap_err(),
            ConfigError::InvalidLabel("instance".to_string())
        );
    }

    #[test]
    fn test_parse_command_line() {
        let parsed = CliArgs::try_parse_from([
            "visitatori",
            "--in-memory",
            "--port",
            "8081",
            "--aggregate-record",
            "everything",
            "--workers",
            "2",
            "--metrics-label",
            "instance=a",
            "--metrics-label",
            "region=eu",
        ])
        .unwrap();

        let config = parsed.to_config().unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.recorder.aggregate_record.as_deref(), Some("everything"));
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.metrics.labels.len(), 2);
    }
}
