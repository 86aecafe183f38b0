//! 任务记录与进程内任务表

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::extract::SourceKind;
use crate::translation::config::constants;

/// 任务状态
///
/// `pending → extracting → translating → completed`，
/// `error` / `cancelled` 可以从任何非终止状态进入。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Extracting,
    Translating,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Extracting => "extracting",
            JobStatus::Translating => "translating",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Html,
    Pdf,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "html" => Ok(OutputFormat::Html),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!("未知的输出格式: {}", other)),
        }
    }
}

/// 任务选项，随任务记录持久化，恢复时沿用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// 为 false 时原文直通，只做格式转换
    pub translate: bool,
    pub output: OutputFormat,
    /// 译文后附原文
    pub bilingual: bool,
    pub max_segment_chars: usize,
    /// 覆盖抽取出的书名
    pub title: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            translate: true,
            output: OutputFormat::Text,
            bilingual: false,
            max_segment_chars: constants::DEFAULT_SEGMENT_MAX_CHARS,
            title: None,
        }
    }
}

/// 任务产物
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOutputs {
    pub text: Option<PathBuf>,
    pub html: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
}

impl JobOutputs {
    pub fn all(&self) -> Vec<PathBuf> {
        [&self.text, &self.html, &self.pdf]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// 用户最关心的那个产物：PDF > HTML > 文本
    pub fn primary(&self) -> Option<&Path> {
        self.pdf
            .as_deref()
            .or(self.html.as_deref())
            .or(self.text.as_deref())
    }
}

/// 一次转换/翻译任务
///
/// 只由编排器修改。`last_completed_segment_id` 是检查点文件的缓存，
/// 恢复时总以磁盘上的检查点为准。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub job_id: String,
    pub source_path: PathBuf,
    #[serde(default)]
    pub source_kind: Option<SourceKind>,
    pub title: String,
    pub status: JobStatus,
    pub progress_percent: u8,
    #[serde(default)]
    pub message: String,
    pub last_completed_segment_id: u64,
    #[serde(default)]
    pub total_segments: u64,
    /// 源文件 SHA-256，恢复时校验
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub options: JobOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error_detail: Option<String>,
    /// 落到离线模拟器的段数
    #[serde(default)]
    pub degraded_segments: u64,
    #[serde(default)]
    pub outputs: JobOutputs,
}

impl TranslationJob {
    pub fn new(source_path: impl Into<PathBuf>, options: JobOptions) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), source_path, options)
    }

    pub fn with_id(
        job_id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        options: JobOptions,
    ) -> Self {
        let source_path = source_path.into();
        let now = Utc::now();
        let title = options.title.clone().unwrap_or_else(|| {
            source_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });

        Self {
            job_id: job_id.into(),
            source_path,
            source_kind: None,
            title,
            status: JobStatus::Pending,
            progress_percent: 0,
            message: "等待处理".to_string(),
            last_completed_segment_id: 0,
            total_segments: 0,
            fingerprint: None,
            options,
            created_at: now,
            updated_at: now,
            error_detail: None,
            degraded_segments: 0,
            outputs: JobOutputs::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 距上次更新的时间
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.updated_at).to_std().unwrap_or_default()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// 进程内任务表
///
/// 进程启动时创建，显式传给编排器和 HTTP 层；条目由保留策略清理。
/// 克隆共享同一张表。
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<DashMap<String, TranslationJob>>,
    cancel_flags: Arc<DashMap<String, Arc<AtomicBool>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: TranslationJob) {
        self.jobs.insert(job.job_id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<TranslationJob> {
        self.jobs.get(job_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// 原地修改，返回修改后的副本
    pub fn update<F>(&self, job_id: &str, f: F) -> Option<TranslationJob>
    where
        F: FnOnce(&mut TranslationJob),
    {
        self.jobs.get_mut(job_id).map(|mut entry| {
            f(entry.value_mut());
            entry.value().clone()
        })
    }

    pub fn remove(&self, job_id: &str) -> Option<TranslationJob> {
        self.cancel_flags.remove(job_id);
        self.jobs.remove(job_id).map(|(_, job)| job)
    }

    /// 按创建时间排序
    pub fn list(&self) -> Vec<TranslationJob> {
        let mut jobs: Vec<TranslationJob> =
            self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 任务的取消标志，不存在时创建
    pub fn cancel_flag(&self, job_id: &str) -> Arc<AtomicBool> {
        self.cancel_flags
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// 请求取消，任务不存在或已结束时返回 false
    pub fn request_cancel(&self, job_id: &str) -> bool {
        match self.get(job_id) {
            Some(job) if !job.is_terminal() => {
                self.cancel_flag(job_id).store(true, Ordering::SeqCst);
                tracing::info!("已请求取消任务 {}", job_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_cancel_requested(&self, job_id: &str) -> bool {
        self.cancel_flags
            .get(job_id)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// 清除取消标志，恢复任务前调用
    pub fn clear_cancel(&self, job_id: &str) {
        if let Some(flag) = self.cancel_flags.get(job_id) {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// 已结束且超过保留时间的任务
    pub fn expired(&self, retention: Duration, now: DateTime<Utc>) -> Vec<TranslationJob> {
        self.jobs
            .iter()
            .filter(|entry| entry.is_terminal() && entry.idle_for(now) > retention)
            .map(|entry| entry.value().clone())
            .collect()
    }
}
