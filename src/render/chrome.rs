//! 无头 Chrome/Chromium 打印

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{PdfRenderer, RenderError};
use crate::translation::config::constants;

/// 按顺序在 PATH 中查找
const BROWSER_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "msedge",
];

/// 常见安装位置
const BROWSER_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
    "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
];

#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl Default for ChromeRenderer {
    fn default() -> Self {
        Self::new(None, constants::DEFAULT_RENDER_TIMEOUT)
    }
}

impl ChromeRenderer {
    /// `binary` 为空时在运行时查找
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// 找到的浏览器可执行文件
    pub fn locate(&self) -> Result<PathBuf, RenderError> {
        if let Some(binary) = &self.binary {
            return if binary.is_file() {
                Ok(binary.clone())
            } else {
                Err(RenderError::BrowserNotFound(binary.display().to_string()))
            };
        }

        let path_dirs: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        for name in BROWSER_NAMES {
            for dir in &path_dirs {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        BROWSER_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file())
            .ok_or_else(|| {
                RenderError::BrowserNotFound(
                    "请安装 Chrome/Chromium 或设置 EPUB2PDF_CHROME_PATH".to_string(),
                )
            })
    }

    fn print_args(html: &Path, pdf: &Path) -> Result<Vec<String>, RenderError> {
        let absolute = if html.is_absolute() {
            html.to_path_buf()
        } else {
            std::env::current_dir()?.join(html)
        };
        let url = url::Url::from_file_path(&absolute)
            .map_err(|_| RenderError::Io(format!("无法转换为文件 URL: {}", absolute.display())))?;

        Ok(vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--no-pdf-header-footer".to_string(),
            format!("--print-to-pdf={}", pdf.display()),
            url.to_string(),
        ])
    }
}

#[async_trait]
impl PdfRenderer for ChromeRenderer {
    fn name(&self) -> &str {
        "chrome"
    }

    async fn render(&self, html: &Path, pdf: &Path) -> Result<(), RenderError> {
        let binary = self.locate()?;
        let args = Self::print_args(html, pdf)?;
        tracing::info!("调用浏览器打印 PDF: {} -> {}", binary.display(), pdf.display());

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Failed(format!(
                "{} 退出码 {:?}: {}",
                binary.display(),
                output.status.code(),
                stderr.trim()
            )));
        }

        if !pdf.is_file() {
            return Err(RenderError::Failed("浏览器没有生成 PDF 文件".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_binary_is_reported() {
        let renderer = ChromeRenderer::new(Some(PathBuf::from("/nonexistent/chrome")), Duration::from_secs(1));
        assert!(matches!(renderer.locate(), Err(RenderError::BrowserNotFound(_))));
    }

    #[test]
    fn print_args_use_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("book.html");
        let args = ChromeRenderer::print_args(&html, Path::new("/tmp/out.pdf")).unwrap();
        assert!(args.iter().any(|a| a == "--headless"));
        assert!(args.iter().any(|a| a == "--print-to-pdf=/tmp/out.pdf"));
        assert!(args.last().unwrap().starts_with("file://"));
    }
}
