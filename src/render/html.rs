//! 合并 HTML 构建器
//!
//! 输出结构：
//! ```text
//! <style>字体与分页样式</style><style>书内样式表…</style>
//! <div class="toc"><h2>目录</h2>…</div>
//! <div class="chapter" id="chapter-0"><h1>标题</h1>…</div>
//! ```
//! 每条目录生成一个章节容器，容器内是该条目覆盖的内容块。

use std::collections::BTreeMap;

use regex::Regex;

use crate::extract::{BlockKind, ContentBlock, ExtractedDocument};

const BASE_CSS: &str = r#"
body { font-family: "Noto Serif", "Noto Serif SC", "Source Han Serif SC", serif; line-height: 1.6; padding: 20px; max-width: 800px; margin: 0 auto; }
h1, h2, h3, h4, h5, h6 { page-break-after: avoid; page-break-inside: avoid; }
img { max-width: 100%; height: auto; }
.toc { margin-bottom: 40px; border: 1px solid #ddd; padding: 15px; background-color: #f9f9f9; }
.toc h2 { margin-top: 0; }
.toc ul { padding-left: 20px; }
.toc li { margin-bottom: 5px; }
.chapter { page-break-before: always; }
.chapter:first-child { page-break-before: avoid; }
.original { color: #666; font-size: 0.9em; border-left: 3px solid #ddd; padding-left: 8px; }
"#;

#[derive(Debug, Clone)]
pub struct HtmlBuilderConfig {
    /// 译文后附原文
    pub bilingual: bool,
    /// 生成目录页
    pub include_toc: bool,
    /// 内联书内样式表
    pub inline_stylesheets: bool,
}

impl Default for HtmlBuilderConfig {
    fn default() -> Self {
        Self {
            bilingual: false,
            include_toc: true,
            inline_stylesheets: true,
        }
    }
}

pub struct HtmlBuilder {
    config: HtmlBuilderConfig,
    script_pattern: Regex,
}

impl HtmlBuilder {
    pub fn new(config: HtmlBuilderConfig) -> Self {
        Self {
            config,
            script_pattern: Regex::new(r"(?is)<script\b.*?</script\s*>").expect("静态正则表达式"),
        }
    }

    /// 构建完整的 HTML 页面
    ///
    /// `translations` 缺少某个序号时显示原文。
    pub fn build(&self, document: &ExtractedDocument, translations: &BTreeMap<u64, String>) -> String {
        let mut html = String::with_capacity(document.blocks.len() * 256);
        html.push_str("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n");
        html.push_str("<meta charset=\"UTF-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        html.push_str(&format!("<title>{}</title>\n", escape(&document.title)));
        html.push_str(&format!("<style>{}</style>\n", BASE_CSS));
        if self.config.inline_stylesheets {
            for css in &document.stylesheets {
                html.push_str(&format!("<style>{}</style>\n", self.strip_scripts(css)));
            }
        }
        html.push_str("</head>\n<body>\n");

        if self.config.include_toc && !document.toc.is_empty() {
            html.push_str("<div class=\"toc\">\n<h2>目录</h2>\n<ul>\n");
            for (index, entry) in document.toc.iter().enumerate() {
                html.push_str(&format!(
                    "<li><a href=\"#chapter-{}\">{}</a></li>\n",
                    index,
                    escape(&entry.title)
                ));
            }
            html.push_str("</ul>\n</div>\n");
        }

        for (index, chapter) in self.chapters(document).into_iter().enumerate() {
            html.push_str(&format!("<div class=\"chapter\" id=\"chapter-{}\">\n", index));
            if let Some(title) = chapter.title {
                html.push_str(&format!("<h1>{}</h1>\n", escape(title)));
            }
            for block in chapter.blocks {
                self.push_block(&mut html, block, translations.get(&block.sequence));
            }
            html.push_str("</div>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    fn push_block(&self, html: &mut String, block: &ContentBlock, translated: Option<&String>) {
        let text = translated.map(String::as_str).unwrap_or(&block.text);
        let body = escape(text).replace('\n', "<br>");
        match block.kind {
            BlockKind::Heading => html.push_str(&format!("<h2>{}</h2>\n", body)),
            BlockKind::Paragraph => html.push_str(&format!("<p>{}</p>\n", body)),
            BlockKind::ListItem => html.push_str(&format!("<ul><li>{}</li></ul>\n", body)),
        }

        if self.config.bilingual && translated.is_some_and(|t| t != &block.text) {
            html.push_str(&format!("<p class=\"original\">{}</p>\n", escape(&block.text)));
        }
    }

    /// 按目录条目切分内容块，第一条之前的块归入无标题的首章
    fn chapters<'a>(&self, document: &'a ExtractedDocument) -> Vec<Chapter<'a>> {
        let mut chapters: Vec<Chapter<'a>> = Vec::new();
        let mut toc = document.toc.iter().peekable();

        for block in &document.blocks {
            let mut started = None;
            while let Some(entry) = toc.next_if(|entry| entry.block_sequence <= block.sequence) {
                started = Some(entry.title.as_str());
            }
            if let Some(title) = started {
                chapters.push(Chapter { title: Some(title), blocks: Vec::new() });
            } else if chapters.is_empty() {
                chapters.push(Chapter { title: None, blocks: Vec::new() });
            }
            if let Some(current) = chapters.last_mut() {
                current.blocks.push(block);
            }
        }
        chapters
    }

    fn strip_scripts(&self, text: &str) -> String {
        self.script_pattern.replace_all(text, "").into_owned()
    }
}

struct Chapter<'a> {
    title: Option<&'a str>,
    blocks: Vec<&'a ContentBlock>,
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
