//! # epub2pdf
//!
//! 把 EPUB 电子书转换成 PDF，并可在转换过程中把正文翻译成中文；
//! 同样支持翻译 PDF 的文本层。翻译以段为单位写入检查点，中断后可从断点恢复。
//!
//! ## 模块组织
//!
//! - `env` - 类型安全的环境变量访问
//! - `extract` - 内容抽取（EPUB 归档、包描述、启发式扫描、PDF 文本）
//! - `translation` - 分段、翻译后端、批量翻译与检查点存储
//! - `task` - 任务记录与编排状态机
//! - `render` - 合并 HTML 与无头浏览器 PDF 渲染
//! - `web` - Web 服务器功能（可选）

pub mod env;
pub mod extract;
pub mod render;
pub mod task;
pub mod translation;
#[cfg(feature = "web")]
pub mod web;

pub use extract::{ExtractedDocument, Extractor};
pub use task::{JobOptions, JobStatus, Orchestrator, OutputFormat, TranslationJob};
pub use translation::{TranslationConfig, TranslationError, TranslationResult};
