//! 产物下载

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::translation::storage::progress::render_unit_text;
use crate::web::types::{ApiError, AppState};

/// 下载输出目录中的文件
pub async fn download(
    State(state): State<Arc<AppState>>,
    AxumPath(filename): AxumPath<String>,
) -> Result<Response, ApiError> {
    if !is_plain_file_name(&filename) {
        return Err(ApiError::bad_request("非法的文件名"));
    }

    let path = state.orchestrator.store().output_dir().join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!("文件不存在: {}", filename)));
        }
        Err(e) => return Err(ApiError::internal(format!("读取文件失败: {}", e))),
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&path).to_string()),
            (header::CONTENT_DISPOSITION, attachment(&filename)),
        ],
        bytes,
    )
        .into_response())
}

/// 下载单个已完成段的文本
pub async fn download_chapter(
    State(state): State<Arc<AppState>>,
    AxumPath((task_id, segment_id)): AxumPath<(String, u64)>,
) -> Result<Response, ApiError> {
    if !is_plain_file_name(&task_id) {
        return Err(ApiError::bad_request("非法的任务编号"));
    }

    let checkpoint = state
        .orchestrator
        .store()
        .load_checkpoint(&task_id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let unit = checkpoint
        .units
        .iter()
        .find(|unit| unit.segment_id == segment_id)
        .ok_or_else(|| {
            ApiError::not_found(format!("任务 {} 没有第 {} 段", task_id, segment_id))
        })?;

    let filename = format!("{}_segment_{:04}.txt", task_id, segment_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&filename)),
        ],
        render_unit_text(unit),
    )
        .into_response())
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn attachment(filename: &str) -> String {
    let encoded =
        percent_encoding::utf8_percent_encode(filename, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename*=UTF-8''{}", encoded)
}
