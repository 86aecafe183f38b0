// 集成测试公共模块
//
// 运行时生成 EPUB 夹具，提供可编排的翻译后端和编排器构建工具

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use epub2pdf::task::{JobRun, JobStore, Orchestrator, ProgressEvent, TranslationJob};
use epub2pdf::translation::backend::{BackendKind, Backends, Simulator, TranslationBackend};
use epub2pdf::translation::{
    BackendError, BatchTranslator, EngineConfig, ProgressStore, TranslationEngine,
};

/// EPUB 夹具构建器
pub struct EpubBuilder {
    files: Vec<(String, String)>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    pub fn file(mut self, name: &str, content: impl Into<String>) -> Self {
        self.files.push((name.to_string(), content.into()));
        self
    }

    /// 写成 `dir/name`，mimetype 放在第一项且不压缩
    pub fn write(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);

        let stored = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        for (name, content) in &self.files {
            zip.start_file(name.as_str(), zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/book.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// 单个章节文档
pub fn chapter_html(title: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("    <p>{}</p>\n", p))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head><title>{title}</title></head>\n<body>\n    <h1>{title}</h1>\n{body}</body>\n</html>"
    )
}

/// 只有段落、没有标题元素的章节
pub fn plain_chapter_html(title: &str, paragraph: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><p>{}</p></body></html>",
        title, paragraph
    )
}

/// 带清单、spine 与 NCX 的 EPUB
///
/// `chapters` 为 (文件名, 标题, 文档内容)，spine 按给定顺序，
/// 清单故意倒序以检验读取顺序来自 spine。
pub fn manifest_epub(dir: &Path, name: &str, book_title: &str, chapters: &[(String, String, String)]) -> PathBuf {
    let manifest: String = chapters
        .iter()
        .enumerate()
        .rev()
        .map(|(i, (file, _, _))| {
            format!(
                "    <item id=\"c{}\" href=\"text/{}\" media-type=\"application/xhtml+xml\"/>\n",
                i + 1,
                file
            )
        })
        .collect();
    let spine: String = (1..=chapters.len())
        .map(|i| format!("    <itemref idref=\"c{}\"/>\n", i))
        .collect();
    let nav_points: String = chapters
        .iter()
        .enumerate()
        .map(|(i, (file, title, _))| {
            format!(
                "    <navPoint id=\"n{i}\" playOrder=\"{i}\"><navLabel><text>{title}</text></navLabel><content src=\"text/{file}\"/></navPoint>\n",
                i = i + 1,
                title = title,
                file = file
            )
        })
        .collect();

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{book_title}</dc:title>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>"#
    );
    let ncx = format!(
        "<?xml version=\"1.0\"?>\n<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\"><navMap>\n{}</navMap></ncx>",
        nav_points
    );

    let mut builder = EpubBuilder::new()
        .file("META-INF/container.xml", CONTAINER_XML)
        .file("OEBPS/book.opf", opf)
        .file("OEBPS/toc.ncx", ncx);
    for (file, _, content) in chapters {
        builder = builder.file(&format!("OEBPS/text/{}", file), content.clone());
    }
    builder.write(dir, name)
}

/// 三章的标准夹具
pub fn three_chapter_epub(dir: &Path) -> PathBuf {
    let chapters = vec![
        (
            "intro.xhtml".to_string(),
            "Introduction".to_string(),
            chapter_html("Introduction", &["The journey begins in a small town."]),
        ),
        (
            "middle.xhtml".to_string(),
            "The Middle".to_string(),
            chapter_html("The Middle", &["Things get harder.", "Friends help each other."]),
        ),
        (
            "end.xhtml".to_string(),
            "The End".to_string(),
            chapter_html("The End", &["Everyone returns home."]),
        ),
    ];
    manifest_epub(dir, "three.epub", "A Small Journey", &chapters)
}

/// 每章一个段落的 N 章夹具，段落里带可计数的标记 `item{k}x`
pub fn numbered_epub(dir: &Path, name: &str, count: usize) -> PathBuf {
    let chapters: Vec<(String, String, String)> = (1..=count)
        .map(|k| {
            let title = format!("Part {}", k);
            let paragraph = format!(
                "Paragraph number {k} tells a short story about item{k}x and nothing else."
            );
            (
                format!("p{:02}.xhtml", k),
                title.clone(),
                plain_chapter_html(&title, &paragraph),
            )
        })
        .collect();
    manifest_epub(dir, name, "Numbered Book", &chapters)
}

pub fn marker(k: usize) -> String {
    format!("item{}x", k)
}

/// 可编排的翻译后端：计数、变换、可选的调用钩子
#[derive(Clone)]
pub struct ScriptedBackend {
    pub kind: BackendKind,
    pub max_input: Option<usize>,
    pub calls: Arc<AtomicUsize>,
    pub inputs: Arc<Mutex<Vec<String>>>,
    transform: Arc<dyn Fn(&str) -> Result<String, BackendError> + Send + Sync>,
    on_call: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl ScriptedBackend {
    pub fn new(
        kind: BackendKind,
        transform: impl Fn(&str) -> Result<String, BackendError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            max_input: None,
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
            transform: Arc::new(transform),
            on_call: None,
        }
    }

    /// 转大写，分隔符保持原样
    pub fn uppercase(kind: BackendKind) -> Self {
        Self::new(kind, |text| Ok(text.to_uppercase()))
    }

    /// 确定性的词典替换
    pub fn dictionary(kind: BackendKind) -> Self {
        let simulator = Simulator::plain();
        Self::new(kind, move |text| Ok(simulator.simulate(text)))
    }

    pub fn with_max_input(mut self, max: usize) -> Self {
        self.max_input = Some(max);
        self
    }

    /// 每次调用完成后执行，参数为累计调用次数
    pub fn on_call(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Arc::new(hook));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input
    }

    async fn translate(&self, text: &str) -> Result<String, BackendError> {
        self.inputs.lock().unwrap().push(text.to_string());
        let result = (self.transform)(text);
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.on_call {
            hook(count);
        }
        result
    }
}

/// 不重试、不等待的引擎配置
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        max_attempts: 1,
        retry_delay_base: Duration::ZERO,
        retry_delay_max: Duration::ZERO,
    }
}

/// 以给定后端为主后端的引擎，模拟器兜底
pub fn engine_with(backend: ScriptedBackend) -> Arc<TranslationEngine> {
    let kind = backend.kind;
    let backends = Backends::offline().with_backend(Arc::new(backend));
    Arc::new(TranslationEngine::new(backends, vec![kind], fast_engine_config()))
}

/// 工作目录与输出目录都在 `root` 下的编排器
pub fn orchestrator_with(backend: ScriptedBackend, root: &Path, jobs: JobStore) -> Orchestrator {
    let translator = BatchTranslator::new(engine_with(backend), Duration::ZERO);
    let store = ProgressStore::new(root.join("work"), root.join("out"));
    Orchestrator::new(translator, store, jobs)
}

/// 消费完进度流并等待任务结束
pub async fn drain(run: JobRun) -> (Vec<ProgressEvent>, TranslationJob) {
    let JobRun {
        mut events, handle, ..
    } = run;
    let mut collected = Vec::new();
    while let Some(event) = events.next().await {
        collected.push(event);
    }
    let job = handle.await.unwrap();
    (collected, job)
}
