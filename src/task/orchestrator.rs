//! 任务编排器
//!
//! 一个任务就是一条严格顺序的管道：
//!
//! ```text
//! pending → extracting → translating(逐段) → completed
//!              ↘            ↘
//!               error / cancelled
//! ```
//!
//! - 第 N 段的检查点写入先于第 N+1 段开始翻译，任务内没有并行翻译
//! - 取消是协作式的，只在段与段之间检查
//! - 后端错误在批量翻译器内部被吸收（重试、换后端、离线模拟），不会让任务失败
//! - 源文件不可读、没有可读内容、检查点写不进去，都会终止任务
//!
//! 每次状态或进度变化都会更新 [`JobStore`]、落盘任务记录，并推送一个 [`ProgressEvent`]。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use super::job::{JobOptions, JobStatus, JobStore, OutputFormat, TranslationJob};
use crate::extract::{ExtractedDocument, ExtractionError, Extractor};
use crate::render::{ChromeRenderer, HtmlBuilder, HtmlBuilderConfig, PdfRenderer, RenderError};
use crate::translation::config::constants;
use crate::translation::error::helpers;
use crate::translation::pipeline::{plan_segments, BatchMode, BatchOutcome, Segment, TranslatedBlock};
use crate::translation::{
    BatchTranslator, ProgressStore, TranslatedUnit, TranslationConfig, TranslationEngine,
    TranslationError, TranslationResult,
};

/// 抽取阶段占用的进度
const EXTRACTION_PERCENT: u64 = 5;
/// 翻译阶段结束时的进度，剩余部分留给合并与渲染
const TRANSLATION_END_PERCENT: u64 = 95;

/// 进度事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub percent: u8,
    pub message: String,
    /// 刚完成的段
    pub segment_id: Option<u64>,
    /// 这一步用了离线模拟结果
    pub degraded: bool,
}

/// 任务结束时关闭的进度流
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

type EventSender = mpsc::UnboundedSender<ProgressEvent>;

/// 一次运行中的任务
pub struct JobRun {
    pub job_id: String,
    pub events: ProgressStream,
    /// 返回任务的最终记录
    pub handle: JoinHandle<TranslationJob>,
}

enum PipelineEnd {
    Completed,
    Cancelled,
}

/// 任务编排器，克隆共享同一组资源
#[derive(Clone)]
pub struct Orchestrator {
    extractor: Extractor,
    translator: Arc<BatchTranslator>,
    store: ProgressStore,
    jobs: JobStore,
    renderer: Option<Arc<dyn PdfRenderer>>,
    running: Arc<DashSet<String>>,
    segment_delay: Duration,
    degraded_warning_threshold: u64,
}

impl Orchestrator {
    pub fn new(translator: BatchTranslator, store: ProgressStore, jobs: JobStore) -> Self {
        Self {
            extractor: Extractor::new(),
            translator: Arc::new(translator),
            store,
            jobs,
            renderer: None,
            running: Arc::new(DashSet::new()),
            segment_delay: Duration::ZERO,
            degraded_warning_threshold: constants::DEGRADED_WARNING_THRESHOLD as u64,
        }
    }

    /// 按配置构建翻译引擎、检查点存储和浏览器渲染器
    pub fn from_config(config: &TranslationConfig, jobs: JobStore) -> TranslationResult<Self> {
        let engine = Arc::new(TranslationEngine::from_config(config)?);
        let translator = BatchTranslator::new(engine, config.individual_delay());
        let store = ProgressStore::new(&config.work_dir, &config.output_dir);
        let renderer = ChromeRenderer::new(config.chrome_path.clone(), config.render_timeout());

        Ok(Self::new(translator, store, jobs)
            .with_renderer(Arc::new(renderer))
            .with_segment_delay(config.translate_delay())
            .with_degraded_warning_threshold(config.degraded_warning_threshold))
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PdfRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// 相邻两次翻译调用之间的等待
    pub fn with_segment_delay(mut self, delay: Duration) -> Self {
        self.segment_delay = delay;
        self
    }

    pub fn with_degraded_warning_threshold(mut self, threshold: usize) -> Self {
        self.degraded_warning_threshold = threshold.max(1) as u64;
        self
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn translator(&self) -> &BatchTranslator {
        &self.translator
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.running.contains(job_id)
    }

    /// 新建任务并在后台运行
    pub fn run_job(&self, source_path: impl Into<PathBuf>, options: JobOptions) -> JobRun {
        let job = TranslationJob::new(source_path, options);
        tracing::info!("创建任务 {}: {}", job.job_id, job.source_path.display());
        let slot = RunningSlot::hold(&self.running, &job.job_id);
        self.jobs.insert(job.clone());
        self.persist(&job);
        self.spawn(job, slot)
    }

    /// 恢复已有任务
    ///
    /// 已完成的段不会重新翻译；源文件指纹与记录不符时拒绝恢复。
    /// 对已完成的任务调用会重新合并产物。
    pub async fn resume_job(
        &self,
        job_id: &str,
        source_path: Option<PathBuf>,
    ) -> TranslationResult<JobRun> {
        // 先同步占位，同一任务同时只允许一条流水线
        let Some(slot) = RunningSlot::try_claim(&self.running, job_id) else {
            return Err(TranslationError::InvalidInput(format!("任务正在运行: {}", job_id)));
        };

        let job = self.prepare_resume(job_id, source_path).await?;
        Ok(self.spawn(job, slot))
    }

    async fn prepare_resume(
        &self,
        job_id: &str,
        source_path: Option<PathBuf>,
    ) -> TranslationResult<TranslationJob> {
        let mut job = match self.jobs.get(job_id) {
            Some(job) => job,
            None => self
                .store
                .load_job(job_id)?
                .ok_or_else(|| TranslationError::JobNotFound(job_id.to_string()))?,
        };

        if let Some(path) = source_path {
            job.source_path = path;
        }

        if let Some(expected) = &job.fingerprint {
            let actual = fingerprint_file(&job.source_path).await?;
            if &actual != expected {
                return Err(TranslationError::SourceMismatch(format!(
                    "{} 的内容与任务 {} 记录的源文件不同",
                    job.source_path.display(),
                    job_id
                )));
            }
        }

        tracing::info!(
            "恢复任务 {}（已完成 {} 段）",
            job_id,
            job.last_completed_segment_id
        );
        job.status = JobStatus::Pending;
        job.error_detail = None;
        job.message = "准备恢复翻译".to_string();
        job.touch();
        self.jobs.insert(job.clone());
        self.jobs.clear_cancel(job_id);
        self.persist(&job);
        Ok(job)
    }

    /// 请求取消，在下一个段边界生效
    pub fn cancel(&self, job_id: &str) -> bool {
        self.jobs.request_cancel(job_id)
    }

    /// 把磁盘上的任务记录载入任务表，返回需要继续运行的任务
    pub fn restore_jobs(&self) -> TranslationResult<Vec<TranslationJob>> {
        let persisted = self.store.list_jobs()?;
        let mut unfinished = Vec::new();
        for job in persisted {
            if !job.is_terminal() {
                unfinished.push(job.clone());
            }
            self.jobs.insert(job);
        }
        tracing::info!(
            "已载入 {} 个任务记录，其中 {} 个未完成",
            self.jobs.len(),
            unfinished.len()
        );
        Ok(unfinished)
    }

    /// 清理已结束且超过保留时间的任务，返回清理数量
    pub fn cleanup_expired(&self, retention: Duration) -> usize {
        let mut removed = 0;
        for job in self.jobs.expired(retention, chrono::Utc::now()) {
            if let Err(e) = self.store.remove_job(&job.job_id, &job.outputs.all()) {
                tracing::warn!("清理任务 {} 失败: {}", job.job_id, e);
                continue;
            }
            self.jobs.remove(&job.job_id);
            removed += 1;
        }
        if removed > 0 {
            tracing::info!("已清理 {} 个过期任务", removed);
        }
        removed
    }

    fn spawn(&self, job: TranslationJob, slot: RunningSlot) -> JobRun {
        let (tx, rx) = mpsc::unbounded();
        let job_id = job.job_id.clone();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let job = this.execute(job, tx).await;
            drop(slot);
            job
        });

        JobRun {
            job_id,
            events: rx.boxed(),
            handle,
        }
    }

    async fn execute(&self, mut job: TranslationJob, tx: EventSender) -> TranslationJob {
        match self.pipeline(&mut job, &tx).await {
            Ok(PipelineEnd::Completed) => {
                tracing::info!("任务 {} 完成", job.job_id);
            }
            Ok(PipelineEnd::Cancelled) => {
                tracing::info!(
                    "任务 {} 已取消，保留 {} 段检查点",
                    job.job_id,
                    job.last_completed_segment_id
                );
            }
            Err(error) => self.fail(&mut job, &tx, error),
        }

        job
    }

    async fn pipeline(
        &self,
        job: &mut TranslationJob,
        tx: &EventSender,
    ) -> TranslationResult<PipelineEnd> {
        self.publish(job, tx, JobStatus::Extracting, 0, "正在读取源文件".to_string(), None, false);

        let actual = fingerprint_file(&job.source_path).await?;
        match &job.fingerprint {
            Some(expected) if expected != &actual => {
                return Err(TranslationError::SourceMismatch(format!(
                    "{} 在任务创建后被修改",
                    job.source_path.display()
                )));
            }
            _ => job.fingerprint = Some(actual),
        }

        let document = self.extractor.extract(&job.source_path).await?;
        job.source_kind = Some(document.source_kind);
        job.title = job
            .options
            .title
            .clone()
            .unwrap_or_else(|| document.title.clone());

        let plan = plan_segments(&document.blocks, job.options.max_segment_chars);
        let total = plan.len() as u64;
        if job.total_segments != 0 && job.total_segments != total {
            return Err(TranslationError::SourceMismatch(format!(
                "分段数从 {} 变为 {}",
                job.total_segments, total
            )));
        }
        job.total_segments = total;

        let checkpoint = self.store.load_checkpoint(&job.job_id)?;
        if checkpoint.last_completed_segment_id > total {
            return Err(TranslationError::SourceMismatch(format!(
                "检查点段号 {} 超出分段总数 {}",
                checkpoint.last_completed_segment_id, total
            )));
        }
        let completed = checkpoint.completed_ids();
        job.last_completed_segment_id = checkpoint.last_completed_segment_id;
        job.degraded_segments = checkpoint.units.iter().filter(|unit| unit.degraded).count() as u64;

        let mut done = completed.len() as u64;
        let message = if done > 0 {
            format!("已恢复 {} 段，继续翻译（共 {} 段）", done, total)
        } else {
            format!("开始处理，共 {} 段", total)
        };
        self.publish(job, tx, JobStatus::Translating, translating_percent(done, total), message, None, false);

        let mut first_call = true;
        for segment in &plan {
            if completed.contains(&segment.segment_id) {
                continue;
            }

            if self.jobs.is_cancel_requested(&job.job_id) {
                let percent = job.progress_percent;
                self.publish(job, tx, JobStatus::Cancelled, percent, "任务已取消".to_string(), None, false);
                return Ok(PipelineEnd::Cancelled);
            }

            if job.options.translate {
                if !first_call && !self.segment_delay.is_zero() {
                    tokio::time::sleep(self.segment_delay).await;
                }
                first_call = false;
            }

            let outcome = if job.options.translate {
                self.translator.translate_blocks(&segment.blocks).await
            } else {
                passthrough(segment)
            };

            let label = segment_label(&document, segment);
            let unit = TranslatedUnit {
                segment_id: segment.segment_id,
                title: label.clone(),
                translated_text: outcome.joined(),
                source_document_title: job.title.clone(),
                blocks: outcome.translations,
                degraded: outcome.degraded,
            };
            self.store.append_unit(&job.job_id, &unit)?;

            done += 1;
            job.last_completed_segment_id = job.last_completed_segment_id.max(segment.segment_id);

            let mut message = format!("已完成第 {}/{} 段: {}", segment.segment_id, total, label);
            if outcome.degraded {
                job.degraded_segments += 1;
                if job.degraded_segments == self.degraded_warning_threshold {
                    tracing::warn!(
                        "任务 {} 已有 {} 段使用离线模拟结果",
                        job.job_id,
                        job.degraded_segments
                    );
                    message = format!(
                        "翻译质量下降：已有 {} 段使用离线模拟结果，请检查翻译服务配置",
                        job.degraded_segments
                    );
                }
            }
            self.publish(
                job,
                tx,
                JobStatus::Translating,
                translating_percent(done, total),
                message,
                Some(segment.segment_id),
                outcome.degraded,
            );
        }

        let artifact = self.store.finalize(&job.job_id, &job.title)?;
        job.outputs.text = Some(artifact.path);

        if matches!(job.options.output, OutputFormat::Html | OutputFormat::Pdf) {
            self.publish(
                job,
                tx,
                JobStatus::Translating,
                TRANSLATION_END_PERCENT as u8,
                "正在生成排版文件".to_string(),
                None,
                false,
            );
            self.render_outputs(job, &document).await?;
        }

        let message = if job.degraded_segments > 0 {
            format!("完成（{} 段使用了离线模拟结果）", job.degraded_segments)
        } else {
            "完成".to_string()
        };
        let degraded = job.degraded_segments > 0;
        self.publish(job, tx, JobStatus::Completed, 100, message, None, degraded);
        Ok(PipelineEnd::Completed)
    }

    /// 由全部检查点重建合并 HTML，按需打印成 PDF
    async fn render_outputs(
        &self,
        job: &mut TranslationJob,
        document: &ExtractedDocument,
    ) -> TranslationResult<()> {
        let checkpoint = self.store.load_checkpoint(&job.job_id)?;
        let mut translations: BTreeMap<u64, String> = BTreeMap::new();
        for block in checkpoint.units.iter().flat_map(|unit| unit.blocks.iter()) {
            translations
                .entry(block.sequence)
                .or_default()
                .push_str(&block.text);
        }

        let builder = HtmlBuilder::new(HtmlBuilderConfig {
            bilingual: job.options.bilingual,
            ..Default::default()
        });
        let html = builder.build(document, &translations);

        tokio::fs::create_dir_all(self.store.output_dir()).await?;
        let html_path = self.store.artifact_path(&job.job_id, &job.title, "html");
        tokio::fs::write(&html_path, html).await?;
        tracing::info!("已生成合并 HTML: {}", html_path.display());
        job.outputs.html = Some(html_path.clone());

        if job.options.output == OutputFormat::Pdf {
            let renderer = self.renderer.as_ref().ok_or_else(|| {
                RenderError::BrowserNotFound("没有配置 PDF 渲染器".to_string())
            })?;
            let pdf_path = self.store.artifact_path(&job.job_id, &job.title, "pdf");
            renderer.render(&html_path, &pdf_path).await?;
            tracing::info!("已通过 {} 生成 PDF: {}", renderer.name(), pdf_path.display());
            job.outputs.pdf = Some(pdf_path);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn publish(
        &self,
        job: &mut TranslationJob,
        tx: &EventSender,
        status: JobStatus,
        percent: u8,
        message: String,
        segment_id: Option<u64>,
        degraded: bool,
    ) {
        job.status = status;
        job.progress_percent = percent.min(100);
        job.message = message;
        job.touch();

        self.jobs.insert(job.clone());
        self.persist(job);

        // 接收方已丢弃时忽略
        let _ = tx.unbounded_send(ProgressEvent {
            job_id: job.job_id.clone(),
            status,
            percent: job.progress_percent,
            message: job.message.clone(),
            segment_id,
            degraded,
        });
    }

    fn fail(&self, job: &mut TranslationJob, tx: &EventSender, error: TranslationError) {
        helpers::log_error(&error);
        job.error_detail = Some(error.to_string());
        let percent = job.progress_percent;
        self.publish(job, tx, JobStatus::Error, percent, format!("任务失败: {}", error), None, false);
    }

    /// 任务记录只是缓存，写失败不影响任务
    fn persist(&self, job: &TranslationJob) {
        if let Err(e) = self.store.save_job(job) {
            tracing::warn!("任务记录保存失败 {}: {}", job.job_id, e);
        }
    }
}

/// 源文件 SHA-256，十六进制
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// 按源文件计算指纹
pub async fn fingerprint_file(path: &Path) -> TranslationResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractionError::Io(format!("{}: {}", path.display(), e)))?;
    Ok(fingerprint(&bytes))
}

/// 任务的运行槽位，释放时移出运行集合
struct RunningSlot {
    running: Arc<DashSet<String>>,
    job_id: String,
}

impl RunningSlot {
    /// 新任务的编号不会冲突，直接占用
    fn hold(running: &Arc<DashSet<String>>, job_id: &str) -> Self {
        running.insert(job_id.to_string());
        Self {
            running: running.clone(),
            job_id: job_id.to_string(),
        }
    }

    /// 已被占用时返回 `None`
    fn try_claim(running: &Arc<DashSet<String>>, job_id: &str) -> Option<Self> {
        running.insert(job_id.to_string()).then(|| Self {
            running: running.clone(),
            job_id: job_id.to_string(),
        })
    }
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.running.remove(&self.job_id);
    }
}

fn translating_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return TRANSLATION_END_PERCENT as u8;
    }
    let span = TRANSLATION_END_PERCENT - EXTRACTION_PERCENT;
    (EXTRACTION_PERCENT + done.min(total) * span / total) as u8
}

/// 段首块所在章节的标题，没有目录时用“第 N 段”
fn segment_label(document: &ExtractedDocument, segment: &Segment) -> String {
    segment
        .first_sequence()
        .and_then(|sequence| document.toc_entry_for(sequence))
        .map(|entry| entry.title.clone())
        .unwrap_or_else(|| format!("第 {} 段", segment.segment_id))
}

/// 不翻译时原文直通
fn passthrough(segment: &Segment) -> BatchOutcome {
    BatchOutcome {
        translations: segment
            .blocks
            .iter()
            .map(|block| TranslatedBlock {
                sequence: block.sequence,
                text: block.text.clone(),
            })
            .collect(),
        degraded: false,
        mode: BatchMode::Passthrough,
    }
}
