//! 输出渲染
//!
//! - [`html`]: 把抽取结果与译文合并成一个 HTML 文件
//! - [`chrome`]: 交给外部无头浏览器打印成 PDF
//!
//! PDF 的排版效果完全取决于浏览器，这里只负责生成输入和调用进程。

pub mod chrome;
pub mod html;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use chrome::ChromeRenderer;
pub use html::{HtmlBuilder, HtmlBuilderConfig};

/// 渲染错误
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    #[error("未找到可用的浏览器: {0}")]
    BrowserNotFound(String),

    #[error("浏览器打印失败: {0}")]
    Failed(String),

    #[error("浏览器打印超时 ({0:?})")]
    Timeout(Duration),

    #[error("渲染文件读写失败: {0}")]
    Io(String),
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err.to_string())
    }
}

impl From<RenderError> for crate::translation::TranslationError {
    fn from(err: RenderError) -> Self {
        crate::translation::TranslationError::RenderError(err.to_string())
    }
}

/// HTML → PDF 渲染器
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    fn name(&self) -> &str;

    /// 把 `html` 打印到 `pdf`，成功时目标文件必须存在
    async fn render(&self, html: &Path, pdf: &Path) -> Result<(), RenderError>;
}
