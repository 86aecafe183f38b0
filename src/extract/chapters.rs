//! 章节标题识别
//!
//! 尽力而为的启发式：编号标题的若干正则，加上"短的全大写行"和
//! "短的首字母大写行"。会把一些普通短行误判为标题，结果只用来
//! 标记标题块和合成目录，不影响内容块顺序与分段。

use regex::Regex;

/// 全大写行的长度上限（字符）
const ALL_CAPS_MAX_CHARS: usize = 50;
/// 首字母大写短行的长度上限（字符）
const TITLE_CASE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone)]
pub struct ChapterDetector {
    patterns: Vec<Regex>,
    title_case: Regex,
}

impl Default for ChapterDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChapterDetector {
    pub fn new() -> Self {
        let patterns = [
            r"(?i)^chapter\s+\d+",
            r"^\d+\.\s+.+",
            r"^第\s*[一二三四五六七八九十百千]+\s*章",
            r"^第\s*\d+\s*章",
            r"^[一二三四五六七八九十]+、",
            r"(?i)^PART\s+\d+",
            r"(?i)^Section\s+\d+",
            r"^附录\s+",
            r"(?i)^Appendix\s+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("静态正则表达式"))
        .collect();

        Self {
            patterns,
            title_case: Regex::new(r"^[A-Z][\w\s]+$").expect("静态正则表达式"),
        }
    }

    /// 判断一行（或一个短段落）是否像章节标题
    pub fn is_chapter_heading(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        if self.patterns.iter().any(|p| p.is_match(line)) {
            return true;
        }

        let chars = line.chars().count();
        if chars < ALL_CAPS_MAX_CHARS && is_all_caps(line) {
            return true;
        }

        chars < TITLE_CASE_MAX_CHARS && self.title_case.is_match(line)
    }
}

/// 至少有一个字母且没有小写字母
fn is_all_caps(line: &str) -> bool {
    line.chars().any(|c| c.is_alphabetic()) && line.to_uppercase() == line
}
