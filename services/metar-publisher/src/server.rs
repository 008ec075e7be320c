//! HTTP status API for the publisher.
//!
//! - `GET /health`: liveness
//! - `GET /status`: scheduler state, last cycle report and per-airport tallies
//! - `GET /airports`: the configured airport set

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use metar_common::AirportRecord;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::scheduler::{AirportTally, CycleReport, PublishScheduler, SchedulerState};

const SERVICE_NAME: &str = "metar-publisher";

pub struct ServerState {
    pub scheduler: Arc<PublishScheduler>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub state: SchedulerState,
    pub airports: usize,
    pub last_cycle: Option<CycleSummary>,
    pub tallies: BTreeMap<String, AirportTally>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub summary: String,
    pub published: usize,
    pub total: usize,
    #[serde(flatten)]
    pub report: CycleReport,
}

impl From<CycleReport> for CycleSummary {
    fn from(report: CycleReport) -> Self {
        Self {
            summary: report.to_string(),
            published: report.published(),
            total: report.total(),
            report,
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/airports", get(airports_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let scheduler = &state.scheduler;
    Json(StatusResponse {
        service: SERVICE_NAME,
        state: scheduler.state(),
        airports: scheduler.catalog().len(),
        last_cycle: scheduler.last_report().await.map(CycleSummary::from),
        tallies: scheduler.tallies().await,
    })
}

async fn airports_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let airports: Vec<AirportRecord> = state.scheduler.catalog().iter().cloned().collect();
    Json(airports)
}

/// Serve on an already-bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

/// Bind `0.0.0.0:port` and serve until `cancel` fires.
pub async fn run_server(state: Arc<ServerState>, port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = port, "Starting status server");
    serve(listener, state, cancel).await
}
