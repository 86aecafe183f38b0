//! Web 路由定义

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::web::{handlers::*, types::AppState};

/// 创建 API 与下载路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        // 任务入口
        .route("/api/convert", post(convert))
        .route("/api/translate-pdf", post(translate_pdf))
        // 任务查询与控制
        .route("/api/status/:task_id", get(status))
        .route("/api/chapters/:task_id", get(chapters))
        .route("/api/restored-tasks", get(restored))
        .route("/api/cancel/:task_id", post(cancel))
        .route("/api/resume-translation/:task_id", post(resume))
        .route("/api/health", get(health))
        // 产物下载
        .route("/download/:filename", get(download))
        .route("/download-chapter/:task_id/:segment_id", get(download_chapter))
}
