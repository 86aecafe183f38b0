//! HTML 解析与内容块遍历
//!
//! 遍历规则：
//! - `h1`–`h6` 生成标题块，`p` 生成段落块，`li` 生成列表项块
//! - 容器元素里夹在块级元素之间的行内内容合并为一个段落块
//! - `body` / `pre` 中的行内内容按空行拆成多个段落
//! - `script`、`style`、`head`、`nav` 等不产生内容
//!
//! 块文本的空白统一压缩为单个空格，空文本丢弃。

use std::sync::OnceLock;

use encoding_rs::Encoding;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;

use super::BlockKind;

/// 遍历得到的块，尚未编号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub kind: BlockKind,
    pub text: String,
    /// 标题级别，非标题为 0
    pub level: u8,
}

const SKIPPED: &[&str] = &[
    "script", "style", "head", "nav", "noscript", "template", "svg", "math", "iframe", "object",
];

const BLOCK_LEVEL: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "section", "article",
    "blockquote", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "pre", "body", "main",
    "figure", "figcaption", "dl", "dt", "dd", "aside", "header", "footer", "center", "hr",
    "address", "caption",
];

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: String) -> std::io::Result<RcDom> {
    let text = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut text.as_bytes())
}

/// 从 XML 声明或 meta 标签中读取编码，默认 utf-8
pub fn detect_charset(data: &[u8]) -> String {
    let head = String::from_utf8_lossy(&data[..data.len().min(1024)]);
    static CHARSET: OnceLock<Regex> = OnceLock::new();
    let pattern = CHARSET.get_or_init(|| {
        Regex::new(r#"(?i)(?:encoding|charset)\s*=\s*["']?([A-Za-z0-9_\-]+)"#)
            .expect("静态正则表达式")
    });

    pattern
        .captures(&head)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "utf-8".to_string())
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 深度优先查找第一个指定名称的元素
pub fn find_first(node: &Handle, node_name: &str) -> Option<Handle> {
    if get_node_name(node) == Some(node_name) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_first(child, node_name))
}

/// 文档 `<title>`，空标题视为没有
pub fn document_title(dom: &RcDom) -> Option<String> {
    find_first(&dom.document, "title")
        .map(|node| normalize_whitespace(&text_content(&node)))
        .filter(|title| !title.is_empty())
}

/// 第一个指定级别的标题
pub fn first_heading(blocks: &[RawBlock], level: u8) -> Option<String> {
    blocks
        .iter()
        .find(|block| block.kind == BlockKind::Heading && block.level == level)
        .map(|block| block.text.clone())
}

/// 子树的全部文本，`br` 视为换行
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    append_text(node, &mut out);
    out
}

fn append_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { name, .. } => {
            let tag = name.local.as_ref();
            if SKIPPED.contains(&tag) {
                return;
            }
            if tag == "br" {
                out.push('\n');
                return;
            }
            for child in node.children.borrow().iter() {
                append_text(child, out);
            }
        }
        _ => {
            for child in node.children.borrow().iter() {
                append_text(child, out);
            }
        }
    }
}

/// 压缩空白
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 遍历整个文档生成内容块
pub fn collect_blocks(dom: &RcDom) -> Vec<RawBlock> {
    let mut blocks = Vec::new();
    walk(&dom.document, &mut blocks);
    blocks
}

fn is_block_level(node: &Handle) -> bool {
    get_node_name(node).is_some_and(|name| BLOCK_LEVEL.contains(&name))
}

fn has_block_descendant(node: &Handle) -> bool {
    node.children
        .borrow()
        .iter()
        .any(|child| is_block_level(child) || has_block_descendant(child))
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn push_block(out: &mut Vec<RawBlock>, kind: BlockKind, raw: &str, level: u8) {
    let text = normalize_whitespace(raw);
    if !text.is_empty() {
        out.push(RawBlock { kind, text, level });
    }
}

fn walk(node: &Handle, out: &mut Vec<RawBlock>) {
    let tag = match &node.data {
        NodeData::Element { name, .. } => name.local.as_ref().to_string(),
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                walk(child, out);
            }
            return;
        }
        _ => return,
    };

    if SKIPPED.contains(&tag.as_str()) {
        return;
    }

    if let Some(level) = heading_level(&tag) {
        push_block(out, BlockKind::Heading, &text_content(node), level);
        return;
    }

    match tag.as_str() {
        "p" if !has_block_descendant(node) => {
            push_block(out, BlockKind::Paragraph, &text_content(node), 0);
        }
        "li" if !has_block_descendant(node) => {
            push_block(out, BlockKind::ListItem, &text_content(node), 0);
        }
        _ => walk_container(node, &tag, out),
    }
}

/// 容器：块级子元素递归，行内内容累积成段落
fn walk_container(node: &Handle, tag: &str, out: &mut Vec<RawBlock>) {
    let split_blank_lines = matches!(tag, "body" | "pre");
    let mut inline = String::new();

    for child in node.children.borrow().iter() {
        if is_block_level(child) || has_block_descendant(child) {
            flush_inline(&mut inline, split_blank_lines, out);
            walk(child, out);
        } else {
            append_text(child, &mut inline);
        }
    }
    flush_inline(&mut inline, split_blank_lines, out);
}

fn flush_inline(buffer: &mut String, split_blank_lines: bool, out: &mut Vec<RawBlock>) {
    if buffer.trim().is_empty() {
        buffer.clear();
        return;
    }

    if split_blank_lines {
        let mut paragraph = String::new();
        for line in buffer.lines() {
            if line.trim().is_empty() {
                push_block(out, BlockKind::Paragraph, &paragraph, 0);
                paragraph.clear();
            } else {
                paragraph.push_str(line);
                paragraph.push('\n');
            }
        }
        push_block(out, BlockKind::Paragraph, &paragraph, 0);
    } else {
        push_block(out, BlockKind::Paragraph, buffer, 0);
    }
    buffer.clear();
}
