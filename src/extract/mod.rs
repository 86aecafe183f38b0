//! 内容抽取
//!
//! 把 EPUB 或 PDF 转换为有序的内容块序列和目录。
//!
//! ## EPUB 抽取流程
//! 1. 解压到临时目录（每次抽取都重新解压，保证相同输入得到相同结果）
//! 2. 定位包描述文件（常见路径 → `META-INF/container.xml` → 递归搜索 `*.opf`）
//! 3. 按 spine 顺序读取清单中的 HTML 条目，逐个做标签遍历生成内容块
//! 4. 清单缺失或没有产出任何内容块时，依次运行命名的启发式扫描
//!    （见 [`heuristics::PASSES`]），第一个有结果的胜出
//! 5. 目录来自 NCX 或 EPUB 3 导航文档；都没有时每个文件合成一条
//!
//! PDF 走 [`pdf`] 子模块：读取文本层、按空行分段、合并跨行跨页的段落。

pub mod archive;
pub mod chapters;
pub mod dom;
pub mod heuristics;
pub mod package;
pub mod pdf;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chapters::ChapterDetector;

/// 内容块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    Heading,
    Paragraph,
    ListItem,
}

/// 一个内容块，抽取后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// 文档内从 1 开始单调递增
    pub sequence: u64,
    pub kind: BlockKind,
    pub text: String,
    /// `文件#序号`，仅用于诊断
    pub source_ref: String,
}

/// 目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub target_ref: String,
    /// 嵌套深度，顶层为 0
    pub level: u32,
    /// 条目指向的第一个内容块
    pub block_sequence: u64,
}

/// 源文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Epub,
    Pdf,
}

impl SourceKind {
    /// 先看扩展名，再看文件头
    pub fn sniff(path: &Path, head: &[u8]) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("epub") => return Some(SourceKind::Epub),
            Some("pdf") => return Some(SourceKind::Pdf),
            _ => {}
        }

        if head.starts_with(b"%PDF") {
            Some(SourceKind::Pdf)
        } else if head.starts_with(b"PK\x03\x04") {
            Some(SourceKind::Epub)
        } else {
            None
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Epub => f.write_str("epub"),
            SourceKind::Pdf => f.write_str("pdf"),
        }
    }
}

/// 内容来自哪一层抽取
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionMethod {
    Manifest,
    Heuristic(&'static str),
    PdfText,
}

/// 抽取结果
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub title: String,
    pub source_kind: SourceKind,
    pub blocks: Vec<ContentBlock>,
    pub toc: Vec<TocEntry>,
    /// 清单中声明的样式表内容，供渲染使用
    pub stylesheets: Vec<String>,
    pub method: ExtractionMethod,
}

impl ExtractedDocument {
    /// 覆盖某个内容块的目录条目（序号不大于该块的最后一条）
    pub fn toc_entry_for(&self, sequence: u64) -> Option<&TocEntry> {
        self.toc
            .iter()
            .take_while(|entry| entry.block_sequence <= sequence)
            .last()
    }
}

/// 抽取错误，对任务而言是致命的
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("未找到可读内容: {0}")]
    NoContent(String),

    #[error("压缩包损坏: {0}")]
    CorruptArchive(String),

    #[error("读取失败: {0}")]
    Io(String),
}

impl ExtractionError {
    /// 错误原因标签
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionError::NoContent(_) => "noContent",
            ExtractionError::CorruptArchive(_) => "corruptArchive",
            ExtractionError::Io(_) => "ioError",
        }
    }
}

impl From<std::io::Error> for ExtractionError {
    fn from(err: std::io::Error) -> Self {
        ExtractionError::Io(err.to_string())
    }
}

/// 单个内容文件读出的结果
#[derive(Debug, Clone)]
pub struct LoadedFile {
    /// 相对解压根目录的路径，`/` 分隔
    pub rel_path: String,
    pub title: Option<String>,
    pub blocks: Vec<dom::RawBlock>,
}

/// 内容抽取器
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    detector: ChapterDetector,
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            detector: ChapterDetector::new(),
        }
    }

    /// 异步抽取，实际工作在阻塞线程池上完成
    pub async fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let this = self.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || this.extract_blocking(&path))
            .await
            .map_err(|e| ExtractionError::Io(format!("抽取任务异常退出: {}", e)))?
    }

    /// 同步抽取
    pub fn extract_blocking(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ExtractionError::Io(format!("{}: {}", path.display(), e)))?;
        let head = &bytes[..bytes.len().min(8)];
        let kind = SourceKind::sniff(path, head).ok_or_else(|| {
            ExtractionError::CorruptArchive(format!("无法识别的文件类型: {}", path.display()))
        })?;

        let fallback_title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        tracing::info!("开始抽取 {} 文件: {}", kind, path.display());
        let document = match kind {
            SourceKind::Epub => self.extract_epub(&bytes, fallback_title)?,
            SourceKind::Pdf => pdf::extract_pdf(&bytes, fallback_title, &self.detector)?,
        };

        tracing::info!(
            "抽取完成: {} 个内容块, {} 个目录条目 ({:?})",
            document.blocks.len(),
            document.toc.len(),
            document.method
        );
        Ok(document)
    }

    fn extract_epub(
        &self,
        bytes: &[u8],
        fallback_title: String,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let unpacked = archive::unpack_to_temp(bytes)?;
        let root = unpacked.path();

        let mut title = None;
        let mut stylesheets = Vec::new();
        let mut declared_toc = Vec::new();
        let mut files = Vec::new();
        let mut method = ExtractionMethod::Manifest;

        if let Some(opf_path) = package::locate_package(root) {
            match package::load_package(root, &opf_path) {
                Ok(pkg) => {
                    title = pkg.title.clone();
                    stylesheets = pkg.read_stylesheets();
                    declared_toc = pkg.read_toc(root);
                    files = pkg
                        .content_paths()
                        .iter()
                        .filter_map(|path| load_markup_file(root, path))
                        .collect();
                }
                Err(e) => tracing::warn!("包描述文件解析失败，改用启发式扫描: {}", e),
            }
        } else {
            tracing::warn!("未找到包描述文件，改用启发式扫描");
        }

        if files.iter().all(|file: &LoadedFile| file.blocks.is_empty()) {
            files.clear();
            for pass in heuristics::PASSES.iter() {
                let found = heuristics::run(pass, root);
                if found.iter().any(|file| !file.blocks.is_empty()) {
                    tracing::info!("启发式扫描 {} 找到 {} 个文件", pass.name, found.len());
                    method = ExtractionMethod::Heuristic(pass.name);
                    files = found;
                    break;
                }
                tracing::debug!("启发式扫描 {} 没有结果", pass.name);
            }
        }

        let (blocks, first_sequence) = number_blocks(&files);
        if blocks.is_empty() {
            return Err(ExtractionError::NoContent(
                "清单与全部启发式扫描都没有找到可读文本".to_string(),
            ));
        }

        let mut toc = resolve_toc(declared_toc, &first_sequence);
        if toc.is_empty() {
            toc = synthesize_toc(&files, &first_sequence);
        }

        Ok(ExtractedDocument {
            title: title.unwrap_or(fallback_title),
            source_kind: SourceKind::Epub,
            blocks,
            toc,
            stylesheets,
            method,
        })
    }
}

/// 读取并遍历一个 HTML 文件，路径必须在根目录内
pub(crate) fn load_markup_file(root: &Path, path: &Path) -> Option<LoadedFile> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("跳过无法读取的内容文件 {}: {}", path.display(), e);
            return None;
        }
    };

    let document = match dom::html_to_dom(&data, dom::detect_charset(&data)) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!("跳过无法解析的内容文件 {}: {}", path.display(), e);
            return None;
        }
    };

    Some(LoadedFile {
        rel_path: relative_ref(root, path),
        title: dom::document_title(&document),
        blocks: dom::collect_blocks(&document),
    })
}

/// 相对根目录的 `/` 分隔路径
pub(crate) fn relative_ref(root: &Path, path: &Path) -> String {
    let normalized = package::normalize_path(path);
    let rel = normalized.strip_prefix(root).unwrap_or(&normalized);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// 为全部文件的块编号，返回每个文件第一个块的序号
fn number_blocks(files: &[LoadedFile]) -> (Vec<ContentBlock>, HashMap<String, u64>) {
    let mut blocks = Vec::new();
    let mut first_sequence = HashMap::new();

    for file in files {
        if file.blocks.is_empty() {
            continue;
        }
        first_sequence.insert(file.rel_path.clone(), blocks.len() as u64 + 1);
        for (index, raw) in file.blocks.iter().enumerate() {
            blocks.push(ContentBlock {
                sequence: blocks.len() as u64 + 1,
                kind: raw.kind,
                text: raw.text.clone(),
                source_ref: format!("{}#{}", file.rel_path, index),
            });
        }
    }

    (blocks, first_sequence)
}

/// 声明的目录条目映射到内容块，找不到目标的条目丢弃
fn resolve_toc(declared: Vec<package::NavPoint>, first_sequence: &HashMap<String, u64>) -> Vec<TocEntry> {
    let mut toc: Vec<TocEntry> = declared
        .into_iter()
        .filter_map(|point| {
            let file = point.target_file();
            let sequence = first_sequence.get(file).copied();
            if sequence.is_none() {
                tracing::debug!("目录条目指向无内容的文件: {}", point.target);
            }
            sequence.map(|block_sequence| TocEntry {
                title: point.title,
                target_ref: point.target,
                level: point.level,
                block_sequence,
            })
        })
        .collect();

    toc.sort_by_key(|entry| entry.block_sequence);
    toc
}

/// 每个有内容的文件合成一条目录：`<title>`、首个 h1、首个 h2，否则 `Chapter N`
fn synthesize_toc(files: &[LoadedFile], first_sequence: &HashMap<String, u64>) -> Vec<TocEntry> {
    files
        .iter()
        .filter(|file| !file.blocks.is_empty())
        .enumerate()
        .filter_map(|(index, file)| {
            let block_sequence = *first_sequence.get(&file.rel_path)?;
            let title = file
                .title
                .clone()
                .or_else(|| dom::first_heading(&file.blocks, 1))
                .or_else(|| dom::first_heading(&file.blocks, 2))
                .unwrap_or_else(|| format!("Chapter {}", index + 1));
            Some(TocEntry {
                title,
                target_ref: file.rel_path.clone(),
                level: 0,
                block_sequence,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_by_extension_then_magic() {
        assert_eq!(SourceKind::sniff(Path::new("a.EPUB"), b""), Some(SourceKind::Epub));
        assert_eq!(SourceKind::sniff(Path::new("a.pdf"), b""), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::sniff(Path::new("upload"), b"%PDF-1.7"), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::sniff(Path::new("upload"), b"PK\x03\x04"), Some(SourceKind::Epub));
        assert_eq!(SourceKind::sniff(Path::new("upload"), b"hello"), None);
    }

    #[test]
    fn reason_tags() {
        assert_eq!(ExtractionError::NoContent(String::new()).reason(), "noContent");
        assert_eq!(ExtractionError::CorruptArchive(String::new()).reason(), "corruptArchive");
        assert_eq!(ExtractionError::Io(String::new()).reason(), "ioError");
    }

    #[test]
    fn toc_entry_lookup() {
        let doc = ExtractedDocument {
            title: "t".into(),
            source_kind: SourceKind::Epub,
            blocks: vec![],
            toc: vec![
                TocEntry { title: "一".into(), target_ref: "a".into(), level: 0, block_sequence: 1 },
                TocEntry { title: "二".into(), target_ref: "b".into(), level: 0, block_sequence: 5 },
            ],
            stylesheets: vec![],
            method: ExtractionMethod::Manifest,
        };
        assert_eq!(doc.toc_entry_for(4).map(|e| e.title.as_str()), Some("一"));
        assert_eq!(doc.toc_entry_for(5).map(|e| e.title.as_str()), Some("二"));
    }
}
