//! 翻译引擎核心实现
//!
//! 引擎持有一条有序的后端回退链 `[主后端, 备用后端..., 离线模拟器]`，逐个尝试，
//! 第一个成功的结果即为最终译文。
//!
//! ## 单个后端内的策略
//! - `rateLimited` / `network`：指数退避后在同一后端上重试，直到用完次数
//! - 其他错误（凭据缺失、余额耗尽、响应异常）：立即换下一个后端
//!
//! 模拟器永远成功，所以 [`TranslationEngine::translate`] 不会返回错误；
//! 落到模拟器上时结果被标记为降级。
//!
//! ## 使用示例
//! ```rust,ignore
//! let engine = TranslationEngine::from_config(&config)?;
//! let outcome = engine.translate("Hello world").await;
//! if outcome.degraded {
//!     tracing::warn!("翻译质量已降级");
//! }
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::sleep;

use crate::translation::backend::{BackendKind, Backends, Simulator};
use crate::translation::config::TranslationConfig;
use crate::translation::error::{BackendError, TranslationResult};

/// 一次翻译的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOutcome {
    pub text: String,
    /// 实际产出译文的后端
    pub backend: BackendKind,
    /// 主后端不是模拟器，却由模拟器产出
    pub degraded: bool,
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 每个后端的最大尝试次数
    pub max_attempts: usize,
    /// 退避基础延迟，实际延迟 = base * 2^attempt
    pub retry_delay_base: Duration,
    /// 退避延迟上限
    pub retry_delay_max: Duration,
}

impl EngineConfig {
    pub fn from_translation_config(config: &TranslationConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts.max(1),
            retry_delay_base: Duration::from_millis(config.retry_delay_base_ms),
            retry_delay_max: Duration::from_millis(config.retry_delay_max_ms),
        }
    }

    /// 第 `attempt` 次失败（从 0 开始）后的等待时间
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_delay_base
            .saturating_mul(factor)
            .min(self.retry_delay_max)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_translation_config(&TranslationConfig::default())
    }
}

/// 翻译引擎
pub struct TranslationEngine {
    backends: Backends,
    chain: Vec<BackendKind>,
    config: EngineConfig,
    stats: Arc<EngineStats>,
}

impl TranslationEngine {
    /// 创建引擎；回退链末尾总会补上离线模拟器
    pub fn new(mut backends: Backends, mut chain: Vec<BackendKind>, config: EngineConfig) -> Self {
        chain.dedup();
        if chain.last() != Some(&BackendKind::Simulator) {
            chain.retain(|kind| *kind != BackendKind::Simulator);
            chain.push(BackendKind::Simulator);
        }
        if !backends.contains(BackendKind::Simulator) {
            backends = backends.with_backend(Arc::new(Simulator::new()));
        }

        Self {
            backends,
            chain,
            config,
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// 按配置构建后端与回退链
    pub fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
        let backends = Backends::from_config(config)?;
        Ok(Self::with_backends(config, backends))
    }

    /// 使用外部提供的后端集合（测试或自定义接入）
    pub fn with_backends(config: &TranslationConfig, backends: Backends) -> Self {
        Self::new(
            backends,
            config.backend_chain(),
            EngineConfig::from_translation_config(config),
        )
    }

    pub fn chain(&self) -> &[BackendKind] {
        &self.chain
    }

    pub fn primary(&self) -> BackendKind {
        self.chain.first().copied().unwrap_or(BackendKind::Simulator)
    }

    /// 沿回退链翻译，第一个成功的后端胜出
    pub async fn translate(&self, text: &str) -> TranslationOutcome {
        let start = Instant::now();
        let primary = self.primary();
        self.stats.add_characters_sent(text.chars().count());

        for (position, &kind) in self.chain.iter().enumerate() {
            if position > 0 {
                self.stats.inc_fallbacks();
                tracing::info!("切换到备用翻译后端: {}", kind);
            }

            match self.translate_with_retry(text, kind).await {
                Ok(translated) => {
                    self.stats.add_characters_received(translated.chars().count());
                    self.stats.add_processing_time(start.elapsed());

                    let degraded = kind == BackendKind::Simulator && primary != BackendKind::Simulator;
                    if degraded {
                        self.stats.inc_degraded();
                    }
                    return TranslationOutcome {
                        text: translated,
                        backend: kind,
                        degraded,
                    };
                }
                Err(e) => {
                    tracing::warn!("后端 {} 放弃: {}", kind, e);
                }
            }
        }

        // 模拟器不会失败，这里只在后端集合被替换成异常实现时才会走到
        self.stats.inc_degraded();
        TranslationOutcome {
            text: Simulator::new().simulate(text),
            backend: BackendKind::Simulator,
            degraded: primary != BackendKind::Simulator,
        }
    }

    /// 直接使用离线模拟器，不经过回退链
    pub async fn simulate(&self, text: &str) -> TranslationOutcome {
        let primary = self.primary();
        let degraded = primary != BackendKind::Simulator;
        let translated = match self.backends.translate(text, BackendKind::Simulator).await {
            Ok(translated) => translated,
            Err(_) => Simulator::new().simulate(text),
        };
        if degraded {
            self.stats.inc_degraded();
        }
        TranslationOutcome {
            text: translated,
            backend: BackendKind::Simulator,
            degraded,
        }
    }

    /// 在单个后端上按退避策略重试
    async fn translate_with_retry(&self, text: &str, kind: BackendKind) -> Result<String, BackendError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            self.stats.inc_calls();
            match self.backends.translate(text, kind).await {
                Ok(translated) => return Ok(translated),
                Err(e) => {
                    self.stats.inc_backend_errors();
                    attempt += 1;

                    if !e.is_retryable() || attempt >= max_attempts {
                        return Err(e);
                    }

                    let delay = self.config.backoff(attempt as u32 - 1);
                    tracing::warn!(
                        "翻译失败，{}ms后重试 (尝试 {}/{}): {}",
                        delay.as_millis(),
                        attempt + 1,
                        max_attempts,
                        e
                    );
                    self.stats.inc_retries();
                    sleep(delay).await;
                }
            }
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

/// 引擎统计信息（原子计数）
#[derive(Debug, Default)]
pub struct EngineStats {
    pub backend_calls: AtomicUsize,
    pub backend_errors: AtomicUsize,
    pub retries: AtomicUsize,
    pub fallbacks: AtomicUsize,
    pub degraded_results: AtomicUsize,
    pub characters_sent: AtomicUsize,
    pub characters_received: AtomicUsize,
    /// 微秒
    pub total_processing_time: AtomicU64,
}

impl EngineStats {
    pub fn inc_calls(&self) {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_backend_errors(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallbacks(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_degraded(&self) {
        self.degraded_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_characters_sent(&self, count: usize) {
        self.characters_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_characters_received(&self, count: usize) {
        self.characters_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_processing_time(&self, duration: Duration) {
        self.total_processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// 可序列化的快照
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            backend_calls: self.backend_calls.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            degraded_results: self.degraded_results.load(Ordering::Relaxed),
            characters_sent: self.characters_sent.load(Ordering::Relaxed),
            characters_received: self.characters_received.load(Ordering::Relaxed),
            total_processing_ms: self.total_processing_time.load(Ordering::Relaxed) / 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    pub backend_calls: usize,
    pub backend_errors: usize,
    pub retries: usize,
    pub fallbacks: usize,
    pub degraded_results: usize,
    pub characters_sent: usize,
    pub characters_received: usize,
    pub total_processing_ms: u64,
}
