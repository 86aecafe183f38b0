//! PDF 文本抽取
//!
//! `pdf-extract` 按基线拼行、在基线变化处换行，页与页之间插入换页符。
//! 在此基础上：
//! 1. 按空行（以及换页符）切成原始段落，行内断词的连字符合并回去
//! 2. 上一段没有以句末标点结束时视为跨行/跨页折断，与下一段合并，
//!    合并结果超过 5000 字符时在最后 30% 内的 `. ` 处截断
//! 3. 用 [`ChapterDetector`] 标记标题块并生成目录

use std::panic::{self, AssertUnwindSafe};

use super::{
    BlockKind, ChapterDetector, ContentBlock, ExtractedDocument, ExtractionError,
    ExtractionMethod, SourceKind, TocEntry,
};

/// 合并后的段落长度上限（字符）
const MERGE_LIMIT_CHARS: usize = 5000;
/// 强制截断时 `. ` 必须落在段落后 30% 内
const SPLIT_SEARCH_RATIO: f64 = 0.7;
/// 短于此长度的段落不参与合并
const SHORT_PARAGRAPH_CHARS: usize = 5;

pub fn extract_pdf(
    bytes: &[u8],
    fallback_title: String,
    detector: &ChapterDetector,
) -> Result<ExtractedDocument, ExtractionError> {
    // pdf-extract 遇到个别畸形文件会 panic
    let text = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| ExtractionError::CorruptArchive("PDF 解析器异常退出".to_string()))?
        .map_err(|e| ExtractionError::CorruptArchive(format!("PDF 文本读取失败: {}", e)))?;

    document_from_text(&text, fallback_title, detector)
}

/// 从 PDF 文本层构造文档
pub fn document_from_text(
    text: &str,
    title: String,
    detector: &ChapterDetector,
) -> Result<ExtractedDocument, ExtractionError> {
    let paragraphs = merge_paragraphs(split_paragraphs(text), detector);
    if paragraphs.is_empty() {
        return Err(ExtractionError::NoContent("PDF 没有可读的文本层".to_string()));
    }

    let mut blocks = Vec::with_capacity(paragraphs.len());
    let mut toc = Vec::new();
    for (index, paragraph) in paragraphs.into_iter().enumerate() {
        let sequence = index as u64 + 1;
        let source_ref = format!("pdf#{}", index);
        let kind = if detector.is_chapter_heading(&paragraph) {
            toc.push(TocEntry {
                title: paragraph.clone(),
                target_ref: source_ref.clone(),
                level: 0,
                block_sequence: sequence,
            });
            BlockKind::Heading
        } else {
            BlockKind::Paragraph
        };
        blocks.push(ContentBlock {
            sequence,
            kind,
            text: paragraph,
            source_ref,
        });
    }

    if toc.is_empty() {
        toc.push(TocEntry {
            title: "Chapter 1".to_string(),
            target_ref: "pdf#0".to_string(),
            level: 0,
            block_sequence: 1,
        });
    }

    Ok(ExtractedDocument {
        title,
        source_kind: SourceKind::Pdf,
        blocks,
        toc,
        stylesheets: Vec::new(),
        method: ExtractionMethod::PdfText,
    })
}

/// 按空行切段，段内换行合并为空格，行尾连字符断词合并
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n").replace('\x0C', "\n\n");

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        join_line(&mut current, line);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

/// 把一行接到段落末尾，`exam-` + `ple` 合并为 `example`
fn join_line(paragraph: &mut String, line: &str) {
    if paragraph.is_empty() {
        paragraph.push_str(line);
        return;
    }

    let hyphenated = paragraph.ends_with('-')
        && paragraph
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| c.is_alphabetic())
        && line.chars().next().is_some_and(|c| c.is_lowercase());
    if hyphenated {
        paragraph.pop();
    } else {
        paragraph.push(' ');
    }
    paragraph.push_str(line);
}

fn ends_sentence(text: &str) -> bool {
    let trimmed = text.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '”' | '’' | ')' | '）' | '」' | '』'));
    trimmed
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | ':' | '：'))
}

/// 合并被折断的段落
pub fn merge_paragraphs(raw: Vec<String>, detector: &ChapterDetector) -> Vec<String> {
    let mut merged = Vec::new();
    let mut current = String::new();

    for paragraph in raw {
        let standalone = paragraph.chars().count() < SHORT_PARAGRAPH_CHARS
            || detector.is_chapter_heading(&paragraph);
        if standalone {
            if !current.is_empty() {
                merged.push(std::mem::take(&mut current));
            }
            merged.push(paragraph);
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&paragraph);

        if ends_sentence(&current) {
            merged.push(std::mem::take(&mut current));
        } else if current.chars().count() > MERGE_LIMIT_CHARS {
            match current.rfind(". ") {
                Some(cut) if cut as f64 > current.len() as f64 * SPLIT_SEARCH_RATIO => {
                    let rest = current[cut + 2..].to_string();
                    current.truncate(cut + 1);
                    merged.push(std::mem::replace(&mut current, rest));
                }
                _ => merged.push(std::mem::take(&mut current)),
            }
        }
    }

    if !current.trim().is_empty() {
        merged.push(current);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_blank_lines_and_form_feeds() {
        let text = "First line\nsecond line.\n\nNext para.\x0CPage two.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(
            paragraphs,
            vec!["First line second line.", "Next para.", "Page two."]
        );
    }

    #[test]
    fn dehyphenates_wrapped_words() {
        let paragraphs = split_paragraphs("an exam-\nple of well-\nKnown text");
        assert_eq!(paragraphs, vec!["an example of well- Known text"]);
    }

    #[test]
    fn merges_broken_paragraphs() {
        let detector = ChapterDetector::new();
        let raw = vec![
            "the sentence continues".to_string(),
            "onto the next page.".to_string(),
            "A new paragraph here.".to_string(),
        ];
        let merged = merge_paragraphs(raw, &detector);
        assert_eq!(
            merged,
            vec!["the sentence continues onto the next page.", "A new paragraph here."]
        );
    }

    #[test]
    fn oversized_merge_splits_at_late_period() {
        let detector = ChapterDetector::new();
        let head = format!("{}. tail without end", "word ".repeat(1100).trim_end());
        let merged = merge_paragraphs(vec![head], &detector);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].ends_with("word."));
        assert_eq!(merged[1], "tail without end");
    }

    #[test]
    fn headings_become_toc_entries() {
        let detector = ChapterDetector::new();
        let text = "CHAPTER 1\n\nIt was a dark night.\n\nChapter 2 Morning\n\nThe sun rose.";
        let doc = document_from_text(text, "book".into(), &detector).unwrap();
        assert_eq!(doc.blocks.len(), 4);
        assert_eq!(doc.blocks[0].kind, BlockKind::Heading);
        assert_eq!(doc.toc.len(), 2);
        assert_eq!(doc.toc[1].block_sequence, 3);
        assert_eq!(doc.method, ExtractionMethod::PdfText);
    }

    #[test]
    fn no_headings_gives_single_chapter() {
        let detector = ChapterDetector::new();
        let doc = document_from_text("just some lowercase text.", "b".into(), &detector).unwrap();
        assert_eq!(doc.toc.len(), 1);
        assert_eq!(doc.toc[0].title, "Chapter 1");
    }

    #[test]
    fn empty_text_layer_is_no_content() {
        let detector = ChapterDetector::new();
        assert!(matches!(
            document_from_text(" \n\x0C\n", "b".into(), &detector),
            Err(ExtractionError::NoContent(_))
        ));
    }

    #[test]
    fn non_pdf_bytes_fail() {
        let detector = ChapterDetector::new();
        assert!(extract_pdf(b"This is not a PDF", "x".into(), &detector).is_err());
    }
}
