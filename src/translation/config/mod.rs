//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, ProviderConfig, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 分段相关
    pub const DEFAULT_MAX_TRANSLATE_LENGTH: usize = 3000;
    pub const DEFAULT_SEGMENT_MAX_CHARS: usize = 3000;
    pub const MIN_TRANSLATABLE_CHARS: usize = 2;

    // 请求节奏
    pub const DEFAULT_TRANSLATE_DELAY_MS: u64 = 3000;
    pub const DEFAULT_INDIVIDUAL_DELAY_MS: u64 = 500;
    pub const DEFAULT_MAX_RETRY_ATTEMPTS: usize = 5;
    pub const DEFAULT_RETRY_DELAY_BASE_MS: u64 = 5000;
    pub const DEFAULT_RETRY_DELAY_MAX_MS: u64 = 60_000;
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    // 对话式翻译接口
    pub const SYSTEM_PROMPT: &str = "你是一个专业的翻译助手，请将提供的英文内容翻译成流畅自然的中文。只返回翻译结果，不要添加任何解释或额外内容。";
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;
    pub const DEFAULT_MAX_TOKENS: u32 = 4000;

    pub const SILICONFLOW_API_URL: &str = "https://api.siliconflow.cn/v1/chat/completions";
    pub const SILICONFLOW_MODEL: &str = "deepseek-ai/DeepSeek-V3";
    pub const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";
    pub const DEEPSEEK_MODEL: &str = "deepseek-chat";
    pub const GOOGLE_API_URL: &str = "https://translate.googleapis.com/translate_a/single";

    // 任务生命周期
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);
    pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
    pub const DEGRADED_WARNING_THRESHOLD: usize = 5;
    pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "epub2pdf.toml",
        "config.toml",
        ".epub2pdf.toml",
        "~/.config/epub2pdf/config.toml",
        "/etc/epub2pdf/config.toml",
    ];
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时退回默认值
pub fn load_translation_config() -> TranslationConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            let mut config = TranslationConfig::default();
            config.apply_env_overrides();
            config
        }
    }
}
