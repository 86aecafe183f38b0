//! Web 服务器配置
//!
//! 使用类型安全的环境变量系统进行配置管理

use std::path::PathBuf;
use std::time::Duration;

use crate::env::{EnvError, EnvResult, EnvVar};

/// Web 服务器配置
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// 绑定地址
    pub bind_addr: String,
    /// 端口
    pub port: u16,
    /// 静态前端目录，为空时不挂载
    pub static_dir: Option<String>,
    /// 上传文件保存目录
    pub upload_dir: PathBuf,
    /// 上传大小上限（MB）
    pub file_size_limit_mb: usize,
    /// 已结束任务的保留时间
    pub retention: Duration,
    /// 清理间隔
    pub cleanup_interval: Duration,
}

impl WebConfig {
    /// 从环境变量创建配置
    pub fn from_env() -> EnvResult<Self> {
        use crate::env::{storage, web};

        let static_dir_str = web::StaticDir::get()?;
        let static_dir = if static_dir_str.is_empty() {
            None
        } else {
            Some(static_dir_str)
        };

        Ok(Self {
            bind_addr: web::BindAddress::get()?,
            port: web::Port::get()?,
            static_dir,
            upload_dir: storage::WorkDir::get()?.join("uploads"),
            file_size_limit_mb: web::FileSizeLimitMb::get()?,
            retention: storage::RetentionHours::get()?,
            cleanup_interval: storage::CleanupIntervalHours::get()?,
        })
    }

    /// 验证配置
    pub fn validate(&self) -> EnvResult<()> {
        if self.bind_addr.is_empty() {
            return Err(EnvError {
                variable: "EPUB2PDF_BIND_ADDRESS".to_string(),
                message: "Bind address cannot be empty".to_string(),
            });
        }

        if self.port == 0 {
            return Err(EnvError {
                variable: "PORT".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.cleanup_interval.is_zero() {
            return Err(EnvError {
                variable: "CLEANUP_INTERVAL_HOURS".to_string(),
                message: "Cleanup interval must be greater than 0".to_string(),
            });
        }

        if let Some(ref static_dir) = self.static_dir {
            let path = std::path::Path::new(static_dir);
            if !path.exists() {
                tracing::warn!("静态文件目录 '{}' 不存在", static_dir);
            }
        }

        Ok(())
    }

    /// 获取完整的监听地址
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// 请求体上限（字节），给 multipart 表单字段留 1MB 余量
    pub fn body_limit_bytes(&self) -> usize {
        (self.file_size_limit_mb + 1) * 1024 * 1024
    }

    /// 检查是否为本地开发模式
    pub fn is_development(&self) -> bool {
        use crate::env::core;
        core::Mode::get()
            .map(|mode| mode == "development")
            .unwrap_or(false)
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::from_env().unwrap_or_else(|e| {
            tracing::warn!("从环境变量读取 Web 配置失败: {}，使用默认值", e);
            Self {
                bind_addr: "127.0.0.1".to_string(),
                port: 3030,
                static_dir: Some("public".to_string()),
                upload_dir: PathBuf::from("temp/uploads"),
                file_size_limit_mb: 50,
                retention: Duration::from_secs(24 * 3600),
                cleanup_interval: Duration::from_secs(3600),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_address_and_body_limit() {
        let config = WebConfig {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            static_dir: None,
            upload_dir: PathBuf::from("u"),
            file_size_limit_mb: 50,
            retention: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
        };
        assert_eq!(config.listen_address(), "0.0.0.0:8080");
        assert_eq!(config.body_limit_bytes(), 51 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }
}
