//! 任务相关 API：上传、查询、取消、恢复

use std::sync::Arc;

use axum::extract::{Multipart, Path as AxumPath, State};
use axum::response::Json;
use futures::StreamExt;

use super::upload::Upload;
use crate::task::{JobOptions, JobRun, JobStatus, OutputFormat};
use crate::translation::TranslationError;
use crate::web::types::{
    download_url, ActionResponse, ApiError, AppState, ChapterInfo, ChaptersResponse,
    RestoredTask, RestoredTasksResponse, StatusResponse, TaskCreatedResponse,
};

/// 上传 EPUB 并开始转换
///
/// 表单字段：`file`（必填），`translate`、`bilingual`、`format`（pdf | html | text，默认 pdf）
pub async fn convert(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<TaskCreatedResponse>, ApiError> {
    let mut upload = Upload::read(multipart, &state.upload_dir, &["file"]).await?;
    let source = upload.take_file("epub", "EPUB").await?;

    let output = match upload.fields.get("format") {
        Some(value) if !value.trim().is_empty() => value
            .parse::<OutputFormat>()
            .map_err(ApiError::bad_request)?,
        _ => OutputFormat::Pdf,
    };

    let options = JobOptions {
        translate: upload.flag("translate").unwrap_or(false),
        bilingual: upload.flag("bilingual").unwrap_or(false),
        output,
        title: upload.fields.get("title").filter(|t| !t.trim().is_empty()).cloned(),
        ..JobOptions::default()
    };

    let run = state.orchestrator.run_job(source, options);
    Ok(Json(started(run, "EPUB 已上传，开始转换")))
}

/// 上传 PDF 并开始翻译，产物为文本
pub async fn translate_pdf(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<TaskCreatedResponse>, ApiError> {
    let mut upload = Upload::read(multipart, &state.upload_dir, &["file"]).await?;
    let source = upload.take_file("pdf", "PDF").await?;

    let options = JobOptions {
        translate: true,
        output: OutputFormat::Text,
        title: upload.fields.get("title").filter(|t| !t.trim().is_empty()).cloned(),
        ..JobOptions::default()
    };

    let run = state.orchestrator.run_job(source, options);
    Ok(Json(started(run, "PDF 已上传，开始翻译")))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .orchestrator
        .jobs()
        .get(&task_id)
        .map(|job| Json(StatusResponse::from(&job)))
        .ok_or_else(|| ApiError::not_found(format!("任务不存在: {}", task_id)))
}

/// 已完成的段，可逐段下载
pub async fn chapters(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<String>,
) -> Result<Json<ChaptersResponse>, ApiError> {
    let job = state
        .orchestrator
        .jobs()
        .get(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("任务不存在: {}", task_id)))?;

    let checkpoint = state
        .orchestrator
        .store()
        .load_checkpoint(&task_id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ChaptersResponse {
        task_id: task_id.clone(),
        title: job.title,
        chapters: checkpoint
            .units
            .iter()
            .map(|unit| ChapterInfo::from_unit(&task_id, unit))
            .collect(),
    }))
}

/// 服务启动时从磁盘恢复的任务
pub async fn restored(State(state): State<Arc<AppState>>) -> Json<RestoredTasksResponse> {
    let jobs = state.orchestrator.jobs();
    let mut tasks: Vec<RestoredTask> = state
        .restored
        .iter()
        .filter_map(|id| jobs.get(id.key()))
        .map(|job| RestoredTask {
            has_chapters: job.last_completed_segment_id > 0,
            download_url: job.outputs.primary().and_then(download_url),
            id: job.job_id,
            title: job.title,
            status: job.status,
            progress: job.progress_percent,
            message: job.message,
            error: job.error_detail,
            created_at: job.created_at,
        })
        .collect();
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(RestoredTasksResponse {
        success: true,
        tasks,
    })
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let job = state
        .orchestrator
        .jobs()
        .get(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("任务不存在: {}", task_id)))?;

    if job.is_terminal() || !state.orchestrator.cancel(&task_id) {
        return Err(ApiError::conflict(format!(
            "任务已结束（{}），无法取消",
            job.status
        )));
    }

    tracing::info!("收到取消请求: {}", task_id);
    Ok(Json(ActionResponse {
        success: true,
        message: "已请求取消，当前段完成后停止".to_string(),
    }))
}

/// 恢复任务，可重新上传源文件（字段 `pdf` 或 `file`）
pub async fn resume(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<String>,
    multipart: Option<Multipart>,
) -> Result<Json<TaskCreatedResponse>, ApiError> {
    let source = match multipart {
        Some(multipart) => {
            Upload::read(multipart, &state.upload_dir, &["pdf", "file"])
                .await?
                .file
                .map(|(_, saved)| saved)
        }
        None => None,
    };

    let run = state
        .orchestrator
        .resume_job(&task_id, source)
        .await
        .map_err(resume_error)?;

    Ok(Json(started(run, "任务已恢复")))
}

fn resume_error(error: TranslationError) -> ApiError {
    match error {
        TranslationError::JobNotFound(_) => ApiError::not_found(error.to_string()),
        TranslationError::SourceMismatch(_) | TranslationError::InvalidInput(_) => {
            ApiError::conflict(error.to_string())
        }
        other => {
            tracing::error!("恢复任务失败: {}", other);
            ApiError::internal(other.to_string())
        }
    }
}

/// 在后台消费进度流，立即返回任务编号
fn started(run: JobRun, message: &str) -> TaskCreatedResponse {
    let JobRun {
        job_id, mut events, ..
    } = run;

    let log_id = job_id.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            tracing::debug!(
                "任务 {} [{}] {}% {}",
                log_id,
                event.status,
                event.percent,
                event.message
            );
        }
    });

    TaskCreatedResponse {
        task_id: job_id,
        status: JobStatus::Pending,
        message: message.to_string(),
    }
}
