//! Web 服务器模块
//!
//! 上传 EPUB / PDF、查询进度、取消与恢复任务、下载产物

pub mod config;
pub mod handlers;
pub mod routes;
pub mod types;

pub use config::*;
pub use routes::*;
pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::task::{JobStatus, JobStore, Orchestrator};
use crate::translation::{TranslationConfig, TranslationError, TranslationResult};

/// Web 服务器
pub struct WebServer {
    config: WebConfig,
    translation_config: TranslationConfig,
}

impl WebServer {
    /// 创建新的 Web 服务器
    pub fn new(config: WebConfig, translation_config: TranslationConfig) -> Self {
        Self {
            config,
            translation_config,
        }
    }

    /// 启动 Web 服务器
    pub async fn start(&self) -> TranslationResult<()> {
        let orchestrator = Orchestrator::from_config(&self.translation_config, JobStore::new())?;
        let state = Arc::new(AppState::new(orchestrator, self.config.upload_dir.clone()));

        restore_unfinished(&state).await;
        spawn_cleanup(
            state.orchestrator.clone(),
            self.config.cleanup_interval,
            self.config.retention,
        );

        let app = create_router(state, &self.config);

        let listener = tokio::net::TcpListener::bind(self.config.listen_address())
            .await
            .map_err(|e| TranslationError::IoError(format!("无法绑定地址: {}", e)))?;

        tracing::info!("Web 服务器启动于 http://{}", self.config.listen_address());

        axum::serve(listener, app)
            .await
            .map_err(|e| TranslationError::IoError(format!("服务器错误: {}", e)))?;

        Ok(())
    }
}

/// 创建路由器
pub fn create_router(state: Arc<AppState>, config: &WebConfig) -> Router {
    let mut app = create_routes().with_state(state).layer(
        ServiceBuilder::new()
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(config.body_limit_bytes())),
    );

    // 静态前端作为兜底
    if let Some(static_dir) = &config.static_dir {
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    app
}

/// 载入磁盘上的任务记录，并在后台继续未完成的任务
pub async fn restore_unfinished(state: &Arc<AppState>) {
    let unfinished = match state.orchestrator.restore_jobs() {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::warn!("读取已保存的任务失败: {}", e);
            return;
        }
    };

    for job in unfinished {
        match state.orchestrator.resume_job(&job.job_id, None).await {
            Ok(run) => {
                tracing::info!("已恢复任务 {}《{}》", run.job_id, job.title);
                state.restored.insert(run.job_id);
            }
            Err(e) => {
                tracing::warn!("任务 {} 无法恢复: {}", job.job_id, e);
                if let Some(failed) = state.orchestrator.jobs().update(&job.job_id, |record| {
                    record.status = JobStatus::Error;
                    record.error_detail = Some(e.to_string());
                    record.message = "重启后无法恢复".to_string();
                    record.touch();
                }) {
                    if let Err(e) = state.orchestrator.store().save_job(&failed) {
                        tracing::warn!("保存任务记录失败: {}", e);
                    }
                }
                state.restored.insert(job.job_id);
            }
        }
    }
}

/// 定期清理过期任务
pub fn spawn_cleanup(
    orchestrator: Orchestrator,
    interval: Duration,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 第一次 tick 立即返回
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = orchestrator.cleanup_expired(retention);
            tracing::debug!("定期清理完成，移除 {} 个任务", removed);
        }
    })
}
