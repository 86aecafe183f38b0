use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;

use crate::web::types::{AppState, HealthResponse};

/// 健康检查
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let jobs = state.orchestrator.jobs().list();
    let running_jobs = jobs
        .iter()
        .filter(|job| state.orchestrator.is_running(&job.job_id))
        .count();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs: jobs.len(),
        running_jobs,
        primary_backend: state
            .orchestrator
            .translator()
            .engine()
            .primary()
            .to_string(),
    })
}
