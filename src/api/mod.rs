//! Read-only HTTP query surface over the registries and the report store.
//!
//! | Route                  | Body                              |
//! |------------------------|-----------------------------------|
//! | `GET /nodes`           | all nodes with status and load    |
//! | `GET /nodes?role=db`   | nodes carrying every given role   |
//! | `GET /nodes/:node`     | one node                          |
//! | `GET /jobs`            | all jobs                          |
//! | `GET /jobs/:job`       | one job                           |
//! | `GET /jobs/:job/reports` | run reports for a job, oldest first |
//!
//! Unknown names answer `404` with `{"error": "..."}`. No handler mutates node state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::DistrunError;
use crate::job::{Job, JobRegistry};
use crate::node::{NodeRegistry, NodeSnapshot};
use crate::report::{ReportStore, RunReportItem};

#[derive(Clone)]
pub struct ApiState {
    pub nodes: Arc<NodeRegistry>,
    pub jobs: Arc<JobRegistry>,
    pub reports: Arc<dyn ReportStore>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Maps lookup and storage failures onto HTTP statuses.
struct ApiError(DistrunError);

impl From<DistrunError> for ApiError {
    fn from(err: DistrunError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            DistrunError::NodeNotFound(_) | DistrunError::JobNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/nodes", get(list_nodes_handler))
        .route("/nodes/:node", get(node_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/:job", get(job_handler))
        .route("/jobs/:job/reports", get(reports_handler))
        .layer(middleware::from_fn(log_request))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `addr` until `token` is cancelled.
pub async fn run_api(
    addr: SocketAddr,
    state: ApiState,
    token: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Starting REST API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

#[derive(Debug, Default, Deserialize)]
struct NodeFilter {
    /// Comma-separated roles a node must all carry.
    role: Option<String>,
}

impl NodeFilter {
    fn roles(&self) -> Vec<String> {
        self.role
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect()
    }
}

async fn list_nodes_handler(
    State(state): State<ApiState>,
    Query(filter): Query<NodeFilter>,
) -> Json<Vec<NodeSnapshot>> {
    let nodes = state.nodes.nodes_with_roles(&filter.roles());
    let mut snapshots = Vec::with_capacity(nodes.len());
    for node in nodes {
        snapshots.push(node.snapshot().await);
    }
    Json(snapshots)
}

async fn node_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<NodeSnapshot>, ApiError> {
    let node = state.nodes.require(&name)?;
    Ok(Json(node.snapshot().await))
}

async fn list_jobs_handler(State(state): State<ApiState>) -> Json<Vec<Job>> {
    Json(state.jobs.all_jobs().into_iter().cloned().collect())
}

async fn job_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .jobs
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| DistrunError::JobNotFound(name).into())
}

async fn reports_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<RunReportItem>>, ApiError> {
    if state.jobs.get(&name).is_none() {
        return Err(DistrunError::JobNotFound(name).into());
    }
    Ok(Json(state.reports.list_for_job(&name).await?))
}
