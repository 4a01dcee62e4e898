use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use oem_trajectory_core::{
    load_sources, parse_report, FetchError, LoadProgress, ParseReport, ProgressCallback,
    SourceFetcher, SourceLoadOutcome,
};
use oem_trajectory_source_fs::{OemDirectory, DEFAULT_OEM_DIR};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const DEFAULT_PREVIEW: usize = 3;

#[derive(Debug, Clone)]
struct ServiceState {
    directory: OemDirectory,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct FileListResponse {
    directory: String,
    files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct TrajectoryResponse {
    sources_processed: usize,
    total_records: usize,
    outcomes: Vec<SourceLoadOutcome>,
    preview: Vec<[f64; 3]>,
    positions: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, Serialize)]
struct SourceParseResponse {
    source_id: String,
    #[serde(flatten)]
    report: ParseReport,
}

#[derive(Debug, Clone, Deserialize)]
struct TrajectoryQuery {
    #[serde(default = "default_preview")]
    preview: usize,
}

fn default_preview() -> usize {
    DEFAULT_PREVIEW
}

#[derive(Debug, Parser)]
#[command(name = "oem-trajectory-service")]
#[command(about = "Local HTTP service serving assembled OEM trajectories")]
struct Args {
    #[arg(long, default_value = DEFAULT_OEM_DIR)]
    dir: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4010")]
    bind: SocketAddr,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl ServiceState {
    fn error(status: StatusCode, message: impl Into<String>) -> ServiceError {
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope { service_contract_version: SERVICE_CONTRACT_VERSION, data }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/oem-files", get(oem_files))
        .route("/v1/oem-files/:name", get(oem_file_show))
        .route("/v1/trajectory", get(trajectory))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let state = ServiceState { directory: OemDirectory::new(args.dir) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, root = %state.directory.root().display(), "serving trajectories");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn oem_files(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<FileListResponse>>, ServiceError> {
    let files = list_files(&state.directory).await?;
    Ok(Json(envelope(FileListResponse {
        directory: state.directory.root().display().to_string(),
        files,
    })))
}

async fn oem_file_show(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceEnvelope<SourceParseResponse>>, ServiceError> {
    let raw_text = state.directory.fetch(&name).await.map_err(|err| match err {
        FetchError::Unregistered(_) => ServiceState::error(StatusCode::BAD_REQUEST, err.to_string()),
        FetchError::Unavailable { .. } => {
            ServiceState::error(StatusCode::NOT_FOUND, format!("failed to load {name}: {err}"))
        }
    })?;
    Ok(Json(envelope(SourceParseResponse { source_id: name, report: parse_report(&raw_text) })))
}

async fn trajectory(
    State(state): State<ServiceState>,
    Query(query): Query<TrajectoryQuery>,
) -> Result<Json<ServiceEnvelope<TrajectoryResponse>>, ServiceError> {
    let source_ids = list_files(&state.directory).await?;
    let progress: ProgressCallback = Box::new(log_progress);
    let report = load_sources(&state.directory, &source_ids, Some(&progress))
        .await
        .map_err(|err| ServiceState::error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    tracing::info!("{}", report.summary());

    Ok(Json(envelope(TrajectoryResponse {
        sources_processed: report.sources_processed(),
        total_records: report.total_records(),
        preview: report.trajectory.last_positions(query.preview),
        positions: report.trajectory.positions(),
        outcomes: report.outcomes,
    })))
}

async fn list_files(directory: &OemDirectory) -> Result<Vec<String>, ServiceError> {
    directory
        .list()
        .await
        .map_err(|err| ServiceState::error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

fn log_progress(update: LoadProgress) {
    tracing::debug!(
        source = %update.source_id,
        fraction = update.fraction(),
        "{}",
        update.message
    );
}
