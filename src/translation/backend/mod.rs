//! 翻译后端适配层
//!
//! 所有翻译提供方通过统一的 [`TranslationBackend`] 接口接入：
//!
//! - **SiliconFlow** / **DeepSeek**：对话补全接口（[`chat::ChatBackend`]）
//! - **Google**：通用翻译接口（[`google::GoogleBackend`]）
//! - **Simulator**：离线词典替换（[`simulator::Simulator`]），不依赖网络，作为最终兜底
//!
//! 错误在适配层边界一次性归类为 [`BackendErrorKind`]，下游只看类型，不再解析消息文本。

pub mod chat;
pub mod google;
pub mod simulator;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::translation::config::TranslationConfig;
use crate::translation::error::{BackendError, BackendErrorKind, TranslationError, TranslationResult};
use crate::translation::segmenter;

pub use chat::ChatBackend;
pub use google::GoogleBackend;
pub use simulator::Simulator;

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    SiliconFlow,
    DeepSeek,
    Google,
    #[serde(rename = "simulate")]
    Simulator,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::SiliconFlow,
        BackendKind::DeepSeek,
        BackendKind::Google,
        BackendKind::Simulator,
    ];

    /// 配置与环境变量中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::SiliconFlow => "siliconflow",
            BackendKind::DeepSeek => "deepseek",
            BackendKind::Google => "google",
            BackendKind::Simulator => "simulate",
        }
    }

    /// 是否需要网络
    pub fn is_remote(&self) -> bool {
        !matches!(self, BackendKind::Simulator)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "siliconflow" => Ok(BackendKind::SiliconFlow),
            "deepseek" => Ok(BackendKind::DeepSeek),
            "google" => Ok(BackendKind::Google),
            "simulate" | "simulator" => Ok(BackendKind::Simulator),
            other => Err(format!(
                "未知的翻译后端: {} (可选: siliconflow, deepseek, google, simulate)",
                other
            )),
        }
    }
}

/// 翻译后端接口
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// 单次请求允许的最大字符数，`None` 表示不限制
    fn max_input_chars(&self) -> Option<usize>;

    /// 翻译一段不超过 `max_input_chars` 的文本
    async fn translate(&self, text: &str) -> Result<String, BackendError>;
}

/// 按 HTTP 状态码与错误消息归类
///
/// 余额耗尽类消息优先于状态码判断，部分服务用 400/403/429 返回余额不足。
/// 只说限额（如每分钟配额）的 429 仍按限流处理。
pub fn classify_status(backend: BackendKind, status: u16, message: &str) -> BackendError {
    let kind = if is_balance_exhausted(message) || status == 402 {
        BackendErrorKind::QuotaExhausted
    } else {
        match status {
            401 | 403 => BackendErrorKind::AuthMissing,
            429 => BackendErrorKind::RateLimited,
            500..=599 => BackendErrorKind::Network,
            _ => BackendErrorKind::MalformedResponse,
        }
    };

    BackendError::new(backend, kind, format!("HTTP {}: {}", status, message)).with_status(status)
}

/// 按传输层错误归类
pub fn classify_transport(backend: BackendKind, error: &reqwest::Error) -> BackendError {
    let kind = if error.is_decode() || error.is_body() {
        BackendErrorKind::MalformedResponse
    } else {
        // 超时、连接失败、连接重置都按网络错误处理
        BackendErrorKind::Network
    };

    let mut err = BackendError::new(backend, kind, error.to_string());
    if let Some(status) = error.status() {
        err = err.with_status(status.as_u16());
    }
    err
}

const BALANCE_EXHAUSTED: &[&str] = &[
    "insufficient balance",
    "insufficient_balance",
    "insufficient_quota",
    "balance is insufficient",
    "exceeded your current quota",
];

fn is_balance_exhausted(message: &str) -> bool {
    let lower = message.to_lowercase();
    BALANCE_EXHAUSTED.iter().any(|needle| lower.contains(needle)) || message.contains("余额不足")
}

/// 从错误响应体中提取可读消息：`error.message`、`message`，否则原文截断
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let nested = value
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(|m| m.as_str());
        if let Some(message) = nested.or_else(|| value.get("message").and_then(|m| m.as_str())) {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "空响应".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

/// 已注册的后端集合
///
/// 负责按后端上限预先切分长文本，逐段调用后原样拼接。
#[derive(Clone)]
pub struct Backends {
    backends: HashMap<BackendKind, Arc<dyn TranslationBackend>>,
}

impl Backends {
    /// 仅含离线模拟器的集合
    pub fn offline() -> Self {
        let mut backends: HashMap<BackendKind, Arc<dyn TranslationBackend>> = HashMap::new();
        backends.insert(BackendKind::Simulator, Arc::new(Simulator::new()));
        Self { backends }
    }

    /// 根据配置构建全部后端，网络后端共用一个 HTTP 客户端
    pub fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("epub2pdf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        let limit = config.max_translate_length;

        Ok(Self::offline()
            .with_backend(Arc::new(ChatBackend::new(
                BackendKind::SiliconFlow,
                client.clone(),
                config.siliconflow.clone(),
                config.temperature,
                config.max_tokens,
                limit,
            )))
            .with_backend(Arc::new(ChatBackend::new(
                BackendKind::DeepSeek,
                client.clone(),
                config.deepseek.clone(),
                config.temperature,
                config.max_tokens,
                limit,
            )))
            .with_backend(Arc::new(GoogleBackend::new(
                client,
                config.google_api_url.clone(),
                limit,
            ))))
    }

    /// 注册或替换一个后端
    pub fn with_backend(mut self, backend: Arc<dyn TranslationBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn TranslationBackend>> {
        self.backends.get(&kind).cloned()
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// 使用指定后端翻译任意长度的文本
    pub async fn translate(&self, text: &str, kind: BackendKind) -> Result<String, BackendError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let backend = self.backends.get(&kind).ok_or_else(|| {
            BackendError::new(kind, BackendErrorKind::AuthMissing, "后端未配置")
        })?;

        let pieces = match backend.max_input_chars() {
            Some(max) if segmenter::char_len(text) > max => segmenter::split(text, max),
            _ => vec![text.to_string()],
        };

        if pieces.len() > 1 {
            tracing::info!("文本长度超过 {} 后端上限，分 {} 段翻译", kind, pieces.len());
        }

        let mut output = String::with_capacity(text.len());
        for piece in &pieces {
            if piece.trim().is_empty() {
                output.push_str(piece);
                continue;
            }

            let translated = backend.translate(piece).await?;
            if translated.trim().is_empty() {
                return Err(BackendError::new(
                    kind,
                    BackendErrorKind::MalformedResponse,
                    "非空请求得到空译文",
                ));
            }
            output.push_str(&translated);
        }

        Ok(output)
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self::offline()
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.backends.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Backends").field("kinds", &kinds).finish()
    }
}
