//! HTTP front end of the collector.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /{resource}` | 1×1 transparent PNG; the visit is queued for recording |
//! | `GET /metrics` | Prometheus text rendering of the pipeline statistics |
//! | `GET /-/healthy` | `200 OK` |
//!
//! The pixel is served whatever happens to the visit afterwards: recording
//! runs on the [`VisitQueue`] workers and its failures are only logged.
//! Names that browsers and crawlers request on their own (`favicon.ico`,
//! `robots.txt`), the aggregate record and names starting with `-` are
//! answered without being recorded.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;

#[cfg(feature = "prometheus")]
use crate::config::{MetricsConfig, DEFAULT_METRICS_NAMESPACE};
#[cfg(feature = "prometheus")]
use crate::observers::prometheus::PrometheusObserver;
use crate::queue::{SubmitError, VisitEvent, VisitQueue};
use crate::stats::PipelineStats;
use crate::visit::{OriginPolicy, VisitEntry};

/// A 1×1 fully transparent PNG.
pub const PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x60, 0x00, 0x02, 0x00,
    0x00, 0x05, 0x00, 0x01, 0xe9, 0xfa, 0xdc, 0xd8, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44,
    0xae, 0x42, 0x60, 0x82,
];

/// Names that are never recorded, whatever the configuration.
const RESERVED_NAMES: &[&str] = &["favicon.ico", "robots.txt", "metrics"];

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    queue: VisitQueue,
    stats: Arc<PipelineStats>,
    origin: OriginPolicy,
    aggregate_record: Option<Arc<str>>,
    #[cfg(feature = "prometheus")]
    observer: Arc<PrometheusObserver>,
}

impl AppState {
    pub fn new(
        queue: VisitQueue,
        stats: Arc<PipelineStats>,
        origin: OriginPolicy,
        aggregate_record: Option<String>,
    ) -> Self {
        Self {
            queue,
            stats,
            origin,
            aggregate_record: aggregate_record.map(Arc::from),
            #[cfg(feature = "prometheus")]
            observer: Arc::new(PrometheusObserver::new().with_namespace(DEFAULT_METRICS_NAMESPACE)),
        }
    }

    /// Names the metrics served on `/metrics` after `metrics`.
    #[cfg(feature = "prometheus")]
    pub fn with_metrics(mut self, metrics: &MetricsConfig) -> Self {
        let mut observer = PrometheusObserver::new().with_namespace(&metrics.namespace);
        if let Some(subsystem) = &metrics.subsystem {
            observer = observer.with_subsystem(subsystem);
        }
        for (name, value) in &metrics.labels {
            observer = observer.with_const_label(name, value);
        }
        self.observer = Arc::new(observer);
        self
    }

    /// Returns `true` if requests for `name` must not be recorded.
    pub fn is_reserved(&self, name: &str) -> bool {
        name.is_empty()
            || name.starts_with('-')
            || RESERVED_NAMES.contains(&name)
            || self.aggregate_record.as_deref() == Some(name)
    }
}

/// Builds the collector's router.
pub fn router(state: AppState) -> Router {
    let app = Router::new()
        .route("/", get(handle_root))
        .route("/{resource}", get(handle_visit))
        .route("/-/healthy", get(handle_healthy));

    #[cfg(feature = "prometheus")]
    let app = app.route("/metrics", get(handle_metrics));

    app.with_state(state)
}

/// Serves the router until `shutdown` resolves.
///
/// In-flight requests are completed before this returns; queued visits are
/// drained by the caller through the queue handle.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

fn pixel() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        PIXEL_PNG,
    )
        .into_response()
}

async fn handle_root() -> Response {
    pixel()
}

/// Handle `GET /{resource}`.
async fn handle_visit(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    request: Request,
) -> Response {
    if state.is_reserved(&resource) {
        state.stats.visits_ignored.inc();
        tracing::trace!(resource = %resource, "ignoring reserved name");
        return pixel();
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let entry = VisitEntry::from_request(state.origin, peer, request.headers());
    state.stats.visits_received.inc();

    match state.queue.submit(VisitEvent::new(resource, entry)).await {
        Ok(()) | Err(SubmitError::Full) => {}
        Err(SubmitError::Closed) => {
            tracing::debug!("visit queue closed, visit not recorded");
        }
    }
    pixel()
}

/// Handle `GET /metrics`.
#[cfg(feature = "prometheus")]
async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.observer.render(&state.stats.snapshot()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Handle `GET /-/healthy`.
async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
