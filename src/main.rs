use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use visitatori::config::{CliArgs, CollectorConfig, StoreConfig};
use visitatori::observers::json::JsonObserver;
use visitatori::queue::VisitQueue;
use visitatori::recorder::VisitRecorder;
use visitatori::server::{self, AppState};
use visitatori::stats::PipelineStats;
use visitatori::store::memory::MemoryStore;
#[cfg(feature = "sheets")]
use visitatori::store::sheets::SheetsStore;
use visitatori::store::RecordStore;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, Box<dyn std::error::Error>> {
    Ok(match config {
        StoreConfig::InMemory => {
            tracing::warn!("using in-memory storage, records are lost on exit");
            Arc::new(MemoryStore::new())
        }
        #[cfg(feature = "sheets")]
        StoreConfig::Sheets(sheets) => {
            tracing::info!(spreadsheet = %sheets.spreadsheet_id, "using Google Sheets storage");
            Arc::new(SheetsStore::new(sheets.clone())?)
        }
    })
}

async fn run(config: CollectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let stats = Arc::new(PipelineStats::new());
    let store = build_store(&config.store)?;
    let aggregate = config.recorder.aggregate_record.clone();
    tracing::info!(
        policy = ?config.recorder.policy,
        timezone = %config.recorder.timezone,
        aggregate = ?aggregate,
        workers = config.queue.workers,
        capacity = config.queue.capacity,
        "starting collector"
    );

    let recorder = Arc::new(VisitRecorder::new(store, config.recorder, stats.clone()));
    let (queue, handle) = VisitQueue::start(recorder, config.queue);
    let state = AppState::new(queue, stats.clone(), config.origin, aggregate);
    #[cfg(feature = "prometheus")]
    let state = state.with_metrics(&config.metrics);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    server::serve(listener, state, server::shutdown_signal()).await?;

    tracing::info!("waiting for queued visits");
    handle.drained().await;

    match JsonObserver::new().include_timestamp(true).to_json(&stats.snapshot()) {
        Ok(report) => tracing::info!(stats = %report, "collector stopped"),
        Err(err) => tracing::error!(error = %err, "failed to serialize final stats"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = match args.to_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "collector failed");
            ExitCode::FAILURE
        }
    }
}
