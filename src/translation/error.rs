//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。
//!
//! 错误分为两层：
//! - [`BackendError`]：单个翻译后端的调用失败，在适配器边界一次性分类为 [`BackendErrorKind`]，
//!   下游只看类型，不再解析消息文本。此类错误总是在段落级别被吸收（重试、换后端、离线模拟）。
//! - [`TranslationError`]：任务级错误。抽取失败、检查点写入失败等会终止任务并带出明确原因。

use std::fmt;

use thiserror::Error;

use crate::extract::ExtractionError;
use crate::translation::backend::BackendKind;
use crate::translation::storage::progress::StoreError;

/// 后端错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendErrorKind {
    /// 缺少或无效的凭据 (HTTP 401/403)
    AuthMissing,
    /// 请求过快 (HTTP 429)
    RateLimited,
    /// 余额或配额耗尽
    QuotaExhausted,
    /// 响应格式不符合预期
    MalformedResponse,
    /// 连接重置、超时、服务端临时故障
    Network,
}

impl BackendErrorKind {
    /// 同一后端上是否值得退避重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendErrorKind::RateLimited | BackendErrorKind::Network)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::AuthMissing => "authMissing",
            BackendErrorKind::RateLimited => "rateLimited",
            BackendErrorKind::QuotaExhausted => "quotaExhausted",
            BackendErrorKind::MalformedResponse => "malformedResponse",
            BackendErrorKind::Network => "network",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个后端调用失败
#[derive(Error, Debug, Clone)]
#[error("{backend} 后端错误 [{kind}]: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub backend: BackendKind,
    pub message: String,
    /// HTTP 状态码（如果有）
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(backend: BackendKind, kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            backend,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 内容抽取错误
    #[error("内容抽取失败: {0}")]
    Extraction(#[from] ExtractionError),

    /// 后端错误（通常在段落级被吸收，只有直接调用适配器时才会看到）
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// 检查点存储错误
    #[error("检查点存储失败: {0}")]
    Store(#[from] StoreError),

    /// PDF 渲染错误
    #[error("渲染失败: {0}")]
    RenderError(String),

    /// 恢复任务时源文件与记录不一致
    #[error("源文件与任务记录不一致: {0}")]
    SourceMismatch(String),

    /// 任务不存在
    #[error("任务不存在: {0}")]
    JobNotFound(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// IO 错误
    #[error("IO错误: {0}")]
    IoError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::Backend(e) => e.is_retryable(),
            TranslationError::IoError(_) => true,
            TranslationError::ConfigError(_) => false,
            TranslationError::Extraction(_) => false,
            TranslationError::Store(_) => false,
            TranslationError::RenderError(_) => false,
            TranslationError::SourceMismatch(_) => false,
            TranslationError::JobNotFound(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::Extraction(_) => ErrorSeverity::Error,
            TranslationError::Backend(_) => ErrorSeverity::Warning,
            TranslationError::Store(_) => ErrorSeverity::Critical,
            TranslationError::RenderError(_) => ErrorSeverity::Error,
            TranslationError::SourceMismatch(_) => ErrorSeverity::Error,
            TranslationError::JobNotFound(_) => ErrorSeverity::Info,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::IoError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::Extraction(_) => ErrorCategory::Extraction,
            TranslationError::Backend(e) => match e.kind {
                BackendErrorKind::RateLimited => ErrorCategory::RateLimit,
                BackendErrorKind::Network => ErrorCategory::Network,
                _ => ErrorCategory::Service,
            },
            TranslationError::Store(_) => ErrorCategory::Storage,
            TranslationError::RenderError(_) => ErrorCategory::Rendering,
            TranslationError::SourceMismatch(_) => ErrorCategory::Input,
            TranslationError::JobNotFound(_) => ErrorCategory::Input,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::IoError(_) => ErrorCategory::Storage,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Extraction,
    Network,
    RateLimit,
    Service,
    Storage,
    Rendering,
    Input,
    Serialization,
    Internal,
}

/// 标准错误转换
impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

impl From<tokio::task::JoinError> for TranslationError {
    fn from(error: tokio::task::JoinError) -> Self {
        TranslationError::InternalError(format!("后台任务异常退出: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录日志
    pub fn log_error(error: &TranslationError) {
        let category = error.category();
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息 [{:?}]: {}", category, error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告 [{:?}]: {}", category, error),
            ErrorSeverity::Error => tracing::error!("翻译错误 [{:?}]: {}", category, error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误 [{:?}]: {}", category, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kinds_retry_only_on_transient_failures() {
        assert!(BackendErrorKind::RateLimited.is_retryable());
        assert!(BackendErrorKind::Network.is_retryable());
        assert!(!BackendErrorKind::AuthMissing.is_retryable());
        assert!(!BackendErrorKind::QuotaExhausted.is_retryable());
        assert!(!BackendErrorKind::MalformedResponse.is_retryable());
    }

    #[test]
    fn backend_error_maps_to_category() {
        let err: TranslationError =
            BackendError::new(BackendKind::DeepSeek, BackendErrorKind::RateLimited, "429").into();
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert!(err.is_retryable());
    }
}
