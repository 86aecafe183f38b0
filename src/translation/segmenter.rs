//! 文本分段器
//!
//! 将超长文本切分为适合单次接口调用的片段。切分优先落在句子边界，
//! 其次落在空白处，两者都没有时按长度硬切。
//!
//! 所有片段按顺序拼接后与输入完全一致：分隔用的空白保留在前一个片段末尾。
//! 长度以 Unicode 标量值（`char`）计。

/// 半角句末标点，后面必须跟空白才算句子边界
const ASCII_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// 全角句末标点，本身即为句子边界
const CJK_TERMINATORS: [char; 3] = ['。', '！', '？'];

/// 切分方式，用于日志和测试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutKind {
    /// 句子边界
    Sentence,
    /// 空白
    Whitespace,
    /// 硬切
    Forced,
    /// 剩余文本已不超过上限
    Tail,
}

/// 按 `max_chars` 切分文本
///
/// - 空文本返回空列表
/// - `max_chars == 0` 视为 1
/// - 每个片段的字符数都不超过 `max_chars`
pub fn split(text: &str, max_chars: usize) -> Vec<String> {
    split_with_kinds(text, max_chars)
        .into_iter()
        .map(|(piece, _)| piece)
        .collect()
}

/// 与 [`split`] 相同，同时返回每个片段的切分方式
pub fn split_with_kinds(text: &str, max_chars: usize) -> Vec<(String, CutKind)> {
    let max = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= max {
            pieces.push((chars[start..].iter().collect(), CutKind::Tail));
            break;
        }

        let window_end = start + max;
        let (cut, kind) = find_cut(&chars, start, window_end);
        pieces.push((chars[start..cut].iter().collect(), kind));
        start = cut;
    }

    if pieces.len() > 1 {
        tracing::debug!("文本切分为 {} 段 (上限 {} 字符)", pieces.len(), max);
    }

    pieces
}

/// 在 `[start, window_end)` 内寻找切点，返回切点位置（不含）
fn find_cut(chars: &[char], start: usize, window_end: usize) -> (usize, CutKind) {
    if let Some(boundary) = last_sentence_boundary(chars, start, window_end) {
        // 紧随其后的空白归前一段，但不能越过窗口
        let mut cut = boundary;
        while cut < window_end && chars[cut].is_whitespace() {
            cut += 1;
        }
        return (cut, CutKind::Sentence);
    }

    if let Some(pos) = (start..window_end).rev().find(|&i| chars[i].is_whitespace()) {
        return (pos + 1, CutKind::Whitespace);
    }

    (window_end, CutKind::Forced)
}

/// 最后一个句子边界（句末标点之后的位置）
fn last_sentence_boundary(chars: &[char], start: usize, window_end: usize) -> Option<usize> {
    (start..window_end).rev().find_map(|i| {
        let c = chars[i];
        if CJK_TERMINATORS.contains(&c) {
            return Some(i + 1);
        }
        if ASCII_TERMINATORS.contains(&c) && chars.get(i + 1).is_some_and(|n| n.is_whitespace()) {
            return Some(i + 1);
        }
        None
    })
}

/// 字符数
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
