//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问。每个变量都是一个实现了 [`EnvVar`] 的单元结构体，
//! 按用途分组到子模块中：`core`、`translation`、`providers`、`storage`、`render`、`web`。

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }

    /// 只在变量被显式设置时返回值，用于配置覆盖
    fn get_explicit() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 应用运行模式
    pub struct Mode;
    impl EnvVar<String> for Mode {
        const NAME: &'static str = "EPUB2PDF_MODE";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Application mode: development, production";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("production".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "development" | "dev" => Ok("development".to_string()),
                "production" | "prod" => Ok("production".to_string()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid mode '{}'. Use: development, production", value),
                }),
            }
        }
    }

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "EPUB2PDF_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 翻译流程相关环境变量
pub mod translation {
    use super::*;

    /// 主翻译后端
    pub struct Backend;
    impl EnvVar<String> for Backend {
        const NAME: &'static str = "TRANSLATOR_API";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str =
            "Primary translation backend: siliconflow, deepseek, google, simulate";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("simulate".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            let backend = value.trim().to_lowercase();
            match backend.as_str() {
                "siliconflow" | "deepseek" | "google" | "simulate" => Ok(backend),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Unknown backend '{}'. Use: siliconflow, deepseek, google, simulate",
                        value
                    ),
                }),
            }
        }
    }

    /// 单次请求最大字符数
    pub struct MaxTranslateLength;
    impl EnvVar<usize> for MaxTranslateLength {
        const NAME: &'static str = "MAX_TRANSLATE_LENGTH";
        const DEFAULT: Option<usize> = Some(3000);
        const DESCRIPTION: &'static str = "Maximum characters sent to a backend in one request";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 100, 50000)
        }
    }

    /// 请求间隔
    pub struct TranslateDelay;
    impl EnvVar<Duration> for TranslateDelay {
        const NAME: &'static str = "TRANSLATE_DELAY";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(3000));
        const DESCRIPTION: &'static str = "Delay between consecutive translation calls in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 600_000)
        }
    }

    /// 最大重试次数
    pub struct MaxRetryAttempts;
    impl EnvVar<usize> for MaxRetryAttempts {
        const NAME: &'static str = "MAX_RETRY_ATTEMPTS";
        const DEFAULT: Option<usize> = Some(5);
        const DESCRIPTION: &'static str = "Attempts per backend before moving down the fallback chain";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 20)
        }
    }

    /// 重试基础延迟
    pub struct RetryDelayBase;
    impl EnvVar<Duration> for RetryDelayBase {
        const NAME: &'static str = "RETRY_DELAY_BASE";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(5000));
        const DESCRIPTION: &'static str = "Base delay of the exponential retry backoff in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 600_000)
        }
    }

    /// 分段字符上限
    pub struct SegmentMaxChars;
    impl EnvVar<usize> for SegmentMaxChars {
        const NAME: &'static str = "EPUB2PDF_SEGMENT_MAX_CHARS";
        const DEFAULT: Option<usize> = Some(3000);
        const DESCRIPTION: &'static str = "Maximum characters per checkpointed segment";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 100, 50000)
        }
    }
}

/// 翻译服务提供商相关环境变量
pub mod providers {
    use super::*;

    pub struct SiliconFlowApiKey;
    impl EnvVar<String> for SiliconFlowApiKey {
        const NAME: &'static str = "SILICONFLOW_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "SiliconFlow API key";

        fn parse(value: &str) -> EnvResult<String> {
            parse_api_key(value, Self::NAME)
        }
    }

    pub struct SiliconFlowApiUrl;
    impl EnvVar<String> for SiliconFlowApiUrl {
        const NAME: &'static str = "SILICONFLOW_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "SiliconFlow chat completion endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            parse_http_url(value, Self::NAME)
        }
    }

    pub struct SiliconFlowModel;
    impl EnvVar<String> for SiliconFlowModel {
        const NAME: &'static str = "SILICONFLOW_MODEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "SiliconFlow model name";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    pub struct DeepSeekApiKey;
    impl EnvVar<String> for DeepSeekApiKey {
        const NAME: &'static str = "DEEPSEEK_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "DeepSeek API key";

        fn parse(value: &str) -> EnvResult<String> {
            parse_api_key(value, Self::NAME)
        }
    }

    pub struct DeepSeekApiUrl;
    impl EnvVar<String> for DeepSeekApiUrl {
        const NAME: &'static str = "DEEPSEEK_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "DeepSeek chat completion endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            parse_http_url(value, Self::NAME)
        }
    }

    pub struct DeepSeekModel;
    impl EnvVar<String> for DeepSeekModel {
        const NAME: &'static str = "DEEPSEEK_MODEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "DeepSeek model name";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    pub struct GoogleTranslateUrl;
    impl EnvVar<String> for GoogleTranslateUrl {
        const NAME: &'static str = "GOOGLE_TRANSLATE_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "General-purpose translation endpoint (gtx query form)";

        fn parse(value: &str) -> EnvResult<String> {
            parse_http_url(value, Self::NAME)
        }
    }
}

/// 存储与清理相关环境变量
pub mod storage {
    use super::*;

    /// 工作目录（检查点、解包目录）
    pub struct WorkDir;
    impl EnvVar<PathBuf> for WorkDir {
        const NAME: &'static str = "EPUB2PDF_WORK_DIR";
        const DEFAULT: Option<PathBuf> = None;
        const DESCRIPTION: &'static str = "Directory for checkpoints and unpacked archives";

        fn get() -> EnvResult<PathBuf> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok(PathBuf::from("temp")),
            }
        }

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_dir(value, Self::NAME)
        }
    }

    /// 输出目录
    pub struct OutputDir;
    impl EnvVar<PathBuf> for OutputDir {
        const NAME: &'static str = "EPUB2PDF_OUTPUT_DIR";
        const DEFAULT: Option<PathBuf> = None;
        const DESCRIPTION: &'static str = "Directory for finished artifacts";

        fn get() -> EnvResult<PathBuf> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok(PathBuf::from("outputs")),
            }
        }

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_dir(value, Self::NAME)
        }
    }

    /// 任务保留时长
    pub struct RetentionHours;
    impl EnvVar<Duration> for RetentionHours {
        const NAME: &'static str = "EPUB2PDF_RETENTION_HOURS";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(24 * 3600));
        const DESCRIPTION: &'static str = "Hours a finished job and its files are kept";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_hours(value, Self::NAME)
        }
    }

    /// 清理间隔
    pub struct CleanupIntervalHours;
    impl EnvVar<Duration> for CleanupIntervalHours {
        const NAME: &'static str = "CLEANUP_INTERVAL_HOURS";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(3600));
        const DESCRIPTION: &'static str = "Hours between cleanup sweeps";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_hours(value, Self::NAME)
        }
    }
}

/// PDF 渲染相关环境变量
pub mod render {
    use super::*;

    pub struct ChromePath;
    impl EnvVar<PathBuf> for ChromePath {
        const NAME: &'static str = "EPUB2PDF_CHROME_PATH";
        const DEFAULT: Option<PathBuf> = None;
        const DESCRIPTION: &'static str = "Path of the headless Chromium/Chrome executable";

        fn parse(value: &str) -> EnvResult<PathBuf> {
            parse_dir(value, Self::NAME)
        }
    }
}

/// Web服务器相关环境变量
pub mod web {
    use super::*;

    /// 绑定地址
    pub struct BindAddress;
    impl EnvVar<String> for BindAddress {
        const NAME: &'static str = "EPUB2PDF_BIND_ADDRESS";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Web server bind address";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("127.0.0.1".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// 端口
    pub struct Port;
    impl EnvVar<u16> for Port {
        const NAME: &'static str = "PORT";
        const DEFAULT: Option<u16> = Some(3030);
        const DESCRIPTION: &'static str = "Web server port";

        fn parse(value: &str) -> EnvResult<u16> {
            let port: u16 = value.trim().parse().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: "Must be a valid port number (1-65535)".to_string(),
            })?;

            if port == 0 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Port must be greater than 0".to_string(),
                });
            }

            Ok(port)
        }
    }

    /// 静态文件目录
    pub struct StaticDir;
    impl EnvVar<String> for StaticDir {
        const NAME: &'static str = "EPUB2PDF_STATIC_DIR";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Static front-end directory (empty disables it)";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("public".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            Ok(value.trim().to_string())
        }
    }

    /// 上传文件大小上限
    pub struct FileSizeLimitMb;
    impl EnvVar<usize> for FileSizeLimitMb {
        const NAME: &'static str = "FILE_SIZE_LIMIT_MB";
        const DEFAULT: Option<usize> = Some(50);
        const DESCRIPTION: &'static str = "Maximum upload size in megabytes";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1024)
        }
    }
}

/// 辅助函数
fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_millis(value: &str, var_name: &str, max: u64) -> EnvResult<Duration> {
    let millis: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of milliseconds".to_string(),
    })?;

    if millis > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Delay too long (max {} ms)", max),
        });
    }

    Ok(Duration::from_millis(millis))
}

fn parse_hours(value: &str, var_name: &str) -> EnvResult<Duration> {
    let hours: f64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of hours".to_string(),
    })?;

    if hours <= 0.0 || hours > 24.0 * 365.0 {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Hours must be within (0, 8760]".to_string(),
        });
    }

    Ok(Duration::from_secs_f64(hours * 3600.0))
}

fn parse_http_url(value: &str, var_name: &str) -> EnvResult<String> {
    let url = value.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(EnvError {
            variable: var_name.to_string(),
            message: "URL must start with http:// or https://".to_string(),
        })
    }
}

fn parse_api_key(value: &str, var_name: &str) -> EnvResult<String> {
    let key = value.trim();
    if key.len() < 8 {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "API key must be at least 8 characters".to_string(),
        });
    }
    Ok(key.to_string())
}

fn parse_non_empty(value: &str, var_name: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Value cannot be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn parse_dir(value: &str, var_name: &str) -> EnvResult<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Path cannot be empty".to_string(),
        });
    }
    Ok(PathBuf::from(shellexpand::tilde(trimmed).as_ref()))
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    fn line(name: &str, description: &str) -> String {
        format!("- `{}`: {}\n", name, description)
    }

    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");

    docs.push_str("## Core Configuration\n\n");
    docs.push_str(&line(core::Mode::NAME, core::Mode::DESCRIPTION));
    docs.push_str(&line(core::LogLevel::NAME, core::LogLevel::DESCRIPTION));

    docs.push_str("\n## Translation Configuration\n\n");
    docs.push_str(&line(translation::Backend::NAME, translation::Backend::DESCRIPTION));
    docs.push_str(&line(
        translation::MaxTranslateLength::NAME,
        translation::MaxTranslateLength::DESCRIPTION,
    ));
    docs.push_str(&line(translation::TranslateDelay::NAME, translation::TranslateDelay::DESCRIPTION));
    docs.push_str(&line(
        translation::MaxRetryAttempts::NAME,
        translation::MaxRetryAttempts::DESCRIPTION,
    ));
    docs.push_str(&line(translation::RetryDelayBase::NAME, translation::RetryDelayBase::DESCRIPTION));
    docs.push_str(&line(
        translation::SegmentMaxChars::NAME,
        translation::SegmentMaxChars::DESCRIPTION,
    ));

    docs.push_str("\n## Providers\n\n");
    docs.push_str(&line(providers::SiliconFlowApiKey::NAME, providers::SiliconFlowApiKey::DESCRIPTION));
    docs.push_str(&line(providers::SiliconFlowApiUrl::NAME, providers::SiliconFlowApiUrl::DESCRIPTION));
    docs.push_str(&line(providers::SiliconFlowModel::NAME, providers::SiliconFlowModel::DESCRIPTION));
    docs.push_str(&line(providers::DeepSeekApiKey::NAME, providers::DeepSeekApiKey::DESCRIPTION));
    docs.push_str(&line(providers::DeepSeekApiUrl::NAME, providers::DeepSeekApiUrl::DESCRIPTION));
    docs.push_str(&line(providers::DeepSeekModel::NAME, providers::DeepSeekModel::DESCRIPTION));
    docs.push_str(&line(
        providers::GoogleTranslateUrl::NAME,
        providers::GoogleTranslateUrl::DESCRIPTION,
    ));

    docs.push_str("\n## Storage\n\n");
    docs.push_str(&line(storage::WorkDir::NAME, storage::WorkDir::DESCRIPTION));
    docs.push_str(&line(storage::OutputDir::NAME, storage::OutputDir::DESCRIPTION));
    docs.push_str(&line(storage::RetentionHours::NAME, storage::RetentionHours::DESCRIPTION));
    docs.push_str(&line(
        storage::CleanupIntervalHours::NAME,
        storage::CleanupIntervalHours::DESCRIPTION,
    ));
    docs.push_str(&line(render::ChromePath::NAME, render::ChromePath::DESCRIPTION));

    docs.push_str("\n## Web Server Configuration\n\n");
    docs.push_str(&line(web::BindAddress::NAME, web::BindAddress::DESCRIPTION));
    docs.push_str(&line(web::Port::NAME, web::Port::DESCRIPTION));
    docs.push_str(&line(web::StaticDir::NAME, web::StaticDir::DESCRIPTION));
    docs.push_str(&line(web::FileSizeLimitMb::NAME, web::FileSizeLimitMb::DESCRIPTION));

    docs
}
