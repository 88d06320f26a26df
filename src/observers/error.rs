//! Error type shared by the observers.

use thiserror::Error;

/// Unified error type for all observer operations.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "prometheus")]
    #[error("prometheus error: {0}")]
    Prometheus(#[from] PrometheusError),

    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;

/// Failure while building or encoding a Prometheus registry.
#[cfg(feature = "prometheus")]
#[derive(Debug, Error)]
pub enum PrometheusError {
    /// A metric could not be created or registered.
    #[error("metric error: {0}")]
    MetricError(String),

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error(transparent)]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

#[cfg(feature = "prometheus")]
impl From<prometheus::Error> for PrometheusError {
    fn from(err: prometheus::Error) -> Self {
        PrometheusError::MetricError(err.to_string())
    }
}

#[cfg(feature = "prometheus")]
impl From<prometheus::Error> for ObserverError {
    fn from(err: prometheus::Error) -> Self {
        ObserverError::Prometheus(PrometheusError::from(err))
    }
}
