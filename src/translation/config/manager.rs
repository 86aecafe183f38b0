//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值。
//! 优先级：环境变量 > 配置文件 > 内置默认值。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::backend::BackendKind;
use crate::translation::error::{TranslationError, TranslationResult};

/// 对话式翻译服务的连接参数
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProviderConfig {
    pub api_url: String,
    pub model: String,
    /// 为空时调用直接返回 authMissing
    pub api_key: Option<String>,
}

/// 翻译配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 后端选择
    pub primary_backend: String,
    pub fallback_backends: Vec<String>,

    // 服务提供商
    pub siliconflow: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub google_api_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,

    // 分段与节奏
    pub max_translate_length: usize,
    pub segment_max_chars: usize,
    pub translate_delay_ms: u64,
    pub individual_delay_ms: u64,

    // 重试策略
    pub max_retry_attempts: usize,
    pub retry_delay_base_ms: u64,
    pub retry_delay_max_ms: u64,

    // 目录与渲染
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub render_timeout_secs: u64,

    // 任务生命周期
    pub retention_hours: f64,
    pub degraded_warning_threshold: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            primary_backend: "simulate".to_string(),
            fallback_backends: Vec::new(),

            siliconflow: ProviderConfig {
                api_url: constants::SILICONFLOW_API_URL.to_string(),
                model: constants::SILICONFLOW_MODEL.to_string(),
                api_key: None,
            },
            deepseek: ProviderConfig {
                api_url: constants::DEEPSEEK_API_URL.to_string(),
                model: constants::DEEPSEEK_MODEL.to_string(),
                api_key: None,
            },
            google_api_url: constants::GOOGLE_API_URL.to_string(),
            temperature: constants::DEFAULT_TEMPERATURE,
            max_tokens: constants::DEFAULT_MAX_TOKENS,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),

            max_translate_length: constants::DEFAULT_MAX_TRANSLATE_LENGTH,
            segment_max_chars: constants::DEFAULT_SEGMENT_MAX_CHARS,
            translate_delay_ms: constants::DEFAULT_TRANSLATE_DELAY_MS,
            individual_delay_ms: constants::DEFAULT_INDIVIDUAL_DELAY_MS,

            max_retry_attempts: constants::DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_delay_base_ms: constants::DEFAULT_RETRY_DELAY_BASE_MS,
            retry_delay_max_ms: constants::DEFAULT_RETRY_DELAY_MAX_MS,

            work_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("outputs"),
            chrome_path: None,
            render_timeout_secs: constants::DEFAULT_RENDER_TIMEOUT.as_secs(),

            retention_hours: constants::DEFAULT_RETENTION.as_secs_f64() / 3600.0,
            degraded_warning_threshold: constants::DEGRADED_WARNING_THRESHOLD,
        }
    }
}

impl TranslationConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        self.primary_backend
            .parse::<BackendKind>()
            .map_err(TranslationError::ConfigError)?;

        for name in &self.fallback_backends {
            name.parse::<BackendKind>().map_err(TranslationError::ConfigError)?;
        }

        if self.max_translate_length == 0 {
            return Err(TranslationError::ConfigError("单次翻译长度不能为0".to_string()));
        }

        if self.segment_max_chars == 0 {
            return Err(TranslationError::ConfigError("分段字符上限不能为0".to_string()));
        }

        if self.max_retry_attempts == 0 {
            return Err(TranslationError::ConfigError("重试次数至少为1".to_string()));
        }

        if self.retry_delay_max_ms < self.retry_delay_base_ms {
            return Err(TranslationError::ConfigError(
                "最大退避延迟不能小于基础延迟".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TranslationError::ConfigError(format!(
                "temperature 超出范围: {}",
                self.temperature
            )));
        }

        if self.retention_hours <= 0.0 {
            return Err(TranslationError::ConfigError("保留时长必须大于0".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{providers, render, storage, translation, EnvVar};

        fn take<T>(name: &str, value: Option<crate::env::EnvResult<T>>) -> Option<T> {
            match value {
                Some(Ok(v)) => Some(v),
                Some(Err(e)) => {
                    tracing::warn!("忽略无效的环境变量 {}: {}", name, e);
                    None
                }
                None => None,
            }
        }

        if let Some(backend) = take(translation::Backend::NAME, translation::Backend::get_explicit()) {
            tracing::info!("环境变量覆盖主翻译后端: {}", backend);
            self.primary_backend = backend;
        }
        if let Some(v) = take(
            translation::MaxTranslateLength::NAME,
            translation::MaxTranslateLength::get_explicit(),
        ) {
            self.max_translate_length = v;
        }
        if let Some(v) = take(
            translation::TranslateDelay::NAME,
            translation::TranslateDelay::get_explicit(),
        ) {
            self.translate_delay_ms = v.as_millis() as u64;
        }
        if let Some(v) = take(
            translation::MaxRetryAttempts::NAME,
            translation::MaxRetryAttempts::get_explicit(),
        ) {
            self.max_retry_attempts = v;
        }
        if let Some(v) = take(
            translation::RetryDelayBase::NAME,
            translation::RetryDelayBase::get_explicit(),
        ) {
            self.retry_delay_base_ms = v.as_millis() as u64;
            self.retry_delay_max_ms = self.retry_delay_max_ms.max(self.retry_delay_base_ms);
        }
        if let Some(v) = take(
            translation::SegmentMaxChars::NAME,
            translation::SegmentMaxChars::get_explicit(),
        ) {
            self.segment_max_chars = v;
        }

        if let Some(key) = take(
            providers::SiliconFlowApiKey::NAME,
            providers::SiliconFlowApiKey::get_explicit(),
        ) {
            self.siliconflow.api_key = Some(key);
        }
        if let Some(url) = take(
            providers::SiliconFlowApiUrl::NAME,
            providers::SiliconFlowApiUrl::get_explicit(),
        ) {
            self.siliconflow.api_url = url;
        }
        if let Some(model) = take(
            providers::SiliconFlowModel::NAME,
            providers::SiliconFlowModel::get_explicit(),
        ) {
            self.siliconflow.model = model;
        }
        if let Some(key) = take(
            providers::DeepSeekApiKey::NAME,
            providers::DeepSeekApiKey::get_explicit(),
        ) {
            self.deepseek.api_key = Some(key);
        }
        if let Some(url) = take(
            providers::DeepSeekApiUrl::NAME,
            providers::DeepSeekApiUrl::get_explicit(),
        ) {
            self.deepseek.api_url = url;
        }
        if let Some(model) = take(
            providers::DeepSeekModel::NAME,
            providers::DeepSeekModel::get_explicit(),
        ) {
            self.deepseek.model = model;
        }
        if let Some(url) = take(
            providers::GoogleTranslateUrl::NAME,
            providers::GoogleTranslateUrl::get_explicit(),
        ) {
            self.google_api_url = url;
        }

        if let Some(dir) = take(storage::WorkDir::NAME, storage::WorkDir::get_explicit()) {
            self.work_dir = dir;
        }
        if let Some(dir) = take(storage::OutputDir::NAME, storage::OutputDir::get_explicit()) {
            self.output_dir = dir;
        }
        if let Some(retention) = take(
            storage::RetentionHours::NAME,
            storage::RetentionHours::get_explicit(),
        ) {
            self.retention_hours = retention.as_secs_f64() / 3600.0;
        }
        if let Some(path) = take(render::ChromePath::NAME, render::ChromePath::get_explicit()) {
            self.chrome_path = Some(path);
        }
    }

    /// 后端回退链：主后端、配置的备用后端，最后总是离线模拟器
    pub fn backend_chain(&self) -> Vec<BackendKind> {
        let mut chain = Vec::new();
        let names = std::iter::once(&self.primary_backend).chain(self.fallback_backends.iter());

        for name in names {
            match name.parse::<BackendKind>() {
                Ok(kind) if !chain.contains(&kind) => chain.push(kind),
                Ok(_) => {}
                Err(e) => tracing::warn!("跳过未知后端: {}", e),
            }
        }

        if !chain.contains(&BackendKind::Simulator) {
            chain.push(BackendKind::Simulator);
        }

        chain
    }

    pub fn translate_delay(&self) -> Duration {
        Duration::from_millis(self.translate_delay_ms)
    }

    pub fn individual_delay(&self) -> Duration {
        Duration::from_millis(self.individual_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs_f64(self.retention_hours * 3600.0)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 创建新的配置管理器：.env → 配置文件 → 环境变量覆盖 → 校验
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();

        let source = Self::find_config_file();
        let config = match &source {
            Some(path) => {
                tracing::info!("加载配置文件: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                tracing::info!("未找到配置文件，使用默认配置");
                TranslationConfig::default()
            }
        };

        Self::finish(config, source)
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(path: &Path) -> TranslationResult<Self> {
        Self::load_dotenv();
        let config = Self::load_from_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(mut config: TranslationConfig, source: Option<PathBuf>) -> TranslationResult<Self> {
        config.apply_env_overrides();
        config.validate()?;
        Ok(Self { config, source })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    /// 实际使用的配置文件路径
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn find_config_file() -> Option<PathBuf> {
        constants::CONFIG_PATHS.iter().find_map(|path| {
            let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
            expanded.exists().then_some(expanded)
        })
    }

    /// 从指定文件加载配置（按扩展名识别 TOML / JSON）
    fn load_from_file(path: &Path) -> TranslationResult<TranslationConfig> {
        if !path.exists() {
            return Err(TranslationError::ConfigError(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        settings
            .try_deserialize::<TranslationConfig>()
            .map_err(|e| TranslationError::ConfigError(format!("解析配置失败: {}", e)))
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &Path) -> TranslationResult<()> {
        let config = TranslationConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
