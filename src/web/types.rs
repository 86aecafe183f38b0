//! Web 模块的数据类型定义

use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::Serialize;

use crate::task::{JobStatus, Orchestrator, TranslationJob};
use crate::translation::TranslatedUnit;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub upload_dir: PathBuf,
    /// 启动时从磁盘恢复的任务
    pub restored: std::sync::Arc<DashSet<String>>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            upload_dir: upload_dir.into(),
            restored: Default::default(),
        }
    }
}

/// 任务创建响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedResponse {
    pub task_id: String,
    pub status: JobStatus,
    pub message: String,
}

/// 任务状态响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub task_id: String,
    pub title: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub last_completed_segment_id: u64,
    pub total_segments: u64,
    pub degraded_segments: u64,
    pub download_url: Option<String>,
    pub text_url: Option<String>,
    pub html_url: Option<String>,
}

impl From<&TranslationJob> for StatusResponse {
    fn from(job: &TranslationJob) -> Self {
        Self {
            task_id: job.job_id.clone(),
            title: job.title.clone(),
            status: job.status,
            progress: job.progress_percent,
            message: job.message.clone(),
            error: job.error_detail.clone(),
            last_completed_segment_id: job.last_completed_segment_id,
            total_segments: job.total_segments,
            degraded_segments: job.degraded_segments,
            download_url: job.outputs.primary().and_then(download_url),
            text_url: job.outputs.text.as_deref().and_then(download_url),
            html_url: job.outputs.html.as_deref().and_then(download_url),
        }
    }
}

/// 单段信息
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInfo {
    pub segment_id: u64,
    pub title: String,
    pub degraded: bool,
    pub download_url: String,
}

impl ChapterInfo {
    pub fn from_unit(task_id: &str, unit: &TranslatedUnit) -> Self {
        Self {
            segment_id: unit.segment_id,
            title: unit.title.clone(),
            degraded: unit.degraded,
            download_url: format!("/download-chapter/{}/{}", task_id, unit.segment_id),
        }
    }
}

/// 段列表响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaptersResponse {
    pub task_id: String,
    pub title: String,
    pub chapters: Vec<ChapterInfo>,
}

/// 恢复的任务
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredTask {
    pub id: String,
    pub title: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub has_chapters: bool,
    pub download_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoredTasksResponse {
    pub success: bool,
    pub tasks: Vec<RestoredTask>,
}

/// 简单的成功/失败响应
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub jobs: usize,
    pub running_jobs: usize,
    pub primary_backend: String,
}

/// 接口错误
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "success": false,
                "error": self.message,
            })),
        )
            .into_response()
    }
}

/// 输出目录下文件的下载链接
pub fn download_url(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| format!("/download/{}", utf8_percent_encode(name)))
}

fn utf8_percent_encode(name: &str) -> String {
    percent_encoding::utf8_percent_encode(name, percent_encoding::NON_ALPHANUMERIC).to_string()
}
