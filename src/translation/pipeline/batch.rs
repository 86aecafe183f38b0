//! 批量翻译与分段规划
//!
//! 本模块处理两件事：
//!
//! 1. **分段规划** ([`plan_segments`])：把整块的 `ContentBlock` 贪心装入字符数受限的
//!    [`Segment`]，块内文本不拆开；只有单块本身超过上限时才用分段器切开，
//!    切出的片段保留同一个 `sequence`。
//! 2. **批量翻译** ([`BatchTranslator`])：段内文本按原文去重，用一次性生成的分隔符
//!    合并后只调用一次后端，再按分隔符拆回。拆回的数量对不上时改为逐条翻译。
//!
//! ## 降级策略
//! - 合并请求落到离线模拟器上：每条文本直接用模拟器单独处理
//! - 分隔符被改写或丢失：逐条翻译，条与条之间插入短暂延迟
//! - 逐条翻译中的失败由引擎回退链吸收，只影响该条

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::extract::ContentBlock;
use crate::translation::backend::BackendKind;
use crate::translation::config::constants;
use crate::translation::core::{TranslationEngine, TranslationOutcome};
use crate::translation::segmenter;

/// 一个翻译批次单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 从 1 开始，单调递增
    pub segment_id: u64,
    pub blocks: Vec<ContentBlock>,
    pub char_count: usize,
}

impl Segment {
    /// 段内第一个块的序号
    pub fn first_sequence(&self) -> Option<u64> {
        self.blocks.first().map(|block| block.sequence)
    }
}

/// 贪心装箱：块按顺序装入，放不下就开新段
pub fn plan_segments(blocks: &[ContentBlock], max_chars: usize) -> Vec<Segment> {
    let max = max_chars.max(1);
    let mut segments = Vec::new();
    let mut current: Vec<ContentBlock> = Vec::new();
    let mut current_chars = 0;

    let mut flush = |current: &mut Vec<ContentBlock>, current_chars: &mut usize| {
        if current.is_empty() {
            return;
        }
        segments.push(Segment {
            segment_id: segments.len() as u64 + 1,
            blocks: std::mem::take(current),
            char_count: *current_chars,
        });
        *current_chars = 0;
    };

    for block in blocks {
        for part in split_oversized(block, max) {
            let len = segmenter::char_len(&part.text);
            if !current.is_empty() && current_chars + len > max {
                flush(&mut current, &mut current_chars);
            }
            current_chars += len;
            current.push(part);
        }
    }
    flush(&mut current, &mut current_chars);

    tracing::debug!("{} 个内容块规划为 {} 段", blocks.len(), segments.len());
    segments
}

/// 超长块按句子边界切开，片段沿用原块的序号
fn split_oversized(block: &ContentBlock, max: usize) -> Vec<ContentBlock> {
    if segmenter::char_len(&block.text) <= max {
        return vec![block.clone()];
    }

    let pieces = segmenter::split(&block.text, max);
    tracing::debug!(
        "内容块 {} 超过 {} 字符，切分为 {} 片",
        block.sequence,
        max,
        pieces.len()
    );
    pieces
        .into_iter()
        .map(|text| ContentBlock {
            text,
            ..block.clone()
        })
        .collect()
}

/// 是否值得送去翻译：至少 2 个非空白字符且包含文字
pub fn is_translatable(text: &str) -> bool {
    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    visible >= constants::MIN_TRANSLATABLE_CHARS && text.chars().any(char::is_alphabetic)
}

/// 单个块（或块片段）的译文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedBlock {
    pub sequence: u64,
    pub text: String,
}

/// 本批次实际使用的翻译方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// 没有需要翻译的文本
    Passthrough,
    /// 只有一条文本，不加分隔符
    Single,
    /// 分隔符合并成一次调用
    Combined,
    /// 逐条调用
    Individual,
}

/// 批量翻译结果
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// 与输入块一一对应
    pub translations: Vec<TranslatedBlock>,
    /// 是否有任何一条落到了离线模拟器
    pub degraded: bool,
    pub mode: BatchMode,
}

impl BatchOutcome {
    /// 序号到译文的映射，同一序号的片段按顺序拼接
    pub fn by_sequence(&self) -> BTreeMap<u64, String> {
        let mut map: BTreeMap<u64, String> = BTreeMap::new();
        for block in &self.translations {
            map.entry(block.sequence).or_default().push_str(&block.text);
        }
        map
    }

    /// 全部译文按块顺序用空行连接
    pub fn joined(&self) -> String {
        self.by_sequence()
            .into_values()
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 合并结果拆分失败，仅用于日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SegmentMismatch {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for SegmentMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "分隔后的译文数量不匹配: 期望 {}，得到 {}",
            self.expected, self.actual
        )
    }
}

/// 生成一个不出现在任何输入中的分隔符
pub fn make_delimiter(texts: &[String]) -> String {
    loop {
        let suffix = uuid::Uuid::new_v4().as_u128() % 100_000_000;
        let token = format!(
            "[[SEG-{}-{:08}]]",
            chrono::Utc::now().timestamp_millis(),
            suffix
        );
        if !texts.iter().any(|text| text.contains(&token)) {
            return format!("\n\n{}\n\n", token);
        }
    }
}

/// 按分隔符拆分合并译文，数量或内容不对时返回 [`SegmentMismatch`]
pub(crate) fn split_combined(
    response: &str,
    delimiter: &str,
    expected: usize,
) -> Result<Vec<String>, SegmentMismatch> {
    let parts: Vec<String> = response
        .split(delimiter.trim())
        .map(|part| part.trim().to_string())
        .collect();

    if parts.len() != expected || parts.iter().any(|part| part.is_empty()) {
        return Err(SegmentMismatch {
            expected,
            actual: parts.iter().filter(|part| !part.is_empty()).count(),
        });
    }
    Ok(parts)
}

/// 批量翻译器
pub struct BatchTranslator {
    engine: Arc<TranslationEngine>,
    individual_delay: Duration,
}

impl BatchTranslator {
    pub fn new(engine: Arc<TranslationEngine>, individual_delay: Duration) -> Self {
        Self {
            engine,
            individual_delay,
        }
    }

    pub fn engine(&self) -> &Arc<TranslationEngine> {
        &self.engine
    }

    /// 翻译一组块，返回与输入一一对应的译文
    pub async fn translate_blocks(&self, blocks: &[ContentBlock]) -> BatchOutcome {
        let mut unique: Vec<String> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for block in blocks {
            if is_translatable(&block.text) && !index.contains_key(block.text.as_str()) {
                index.insert(block.text.as_str(), unique.len());
                unique.push(block.text.clone());
            }
        }

        if unique.len() < blocks.len() {
            tracing::debug!("批次去重: {} 块 -> {} 条待翻译", blocks.len(), unique.len());
        }

        let (results, mode) = match unique.len() {
            0 => (Vec::new(), BatchMode::Passthrough),
            1 => (vec![self.engine.translate(&unique[0]).await], BatchMode::Single),
            _ => self.translate_unique(&unique).await,
        };

        let degraded = results.iter().any(|outcome| outcome.degraded);
        let translations = blocks
            .iter()
            .map(|block| {
                let text = index
                    .get(block.text.as_str())
                    .and_then(|&i| results.get(i))
                    .map(|outcome| outcome.text.clone())
                    .unwrap_or_else(|| block.text.clone());
                TranslatedBlock {
                    sequence: block.sequence,
                    text,
                }
            })
            .collect();

        BatchOutcome {
            translations,
            degraded,
            mode,
        }
    }

    async fn translate_unique(&self, unique: &[String]) -> (Vec<TranslationOutcome>, BatchMode) {
        if self.engine.primary() == BackendKind::Simulator {
            return (self.translate_offline(unique).await, BatchMode::Individual);
        }

        let delimiter = make_delimiter(unique);
        let combined = unique.join(&delimiter);
        let outcome = self.engine.translate(&combined).await;

        if outcome.backend == BackendKind::Simulator {
            tracing::warn!("合并请求已降级到离线模拟器，逐条模拟 {} 条文本", unique.len());
            return (self.translate_offline(unique).await, BatchMode::Individual);
        }

        match split_combined(&outcome.text, &delimiter, unique.len()) {
            Ok(parts) => {
                let results = parts
                    .into_iter()
                    .map(|text| TranslationOutcome {
                        text,
                        backend: outcome.backend,
                        degraded: false,
                    })
                    .collect();
                (results, BatchMode::Combined)
            }
            Err(mismatch) => {
                tracing::warn!("{}，改为逐条翻译", mismatch);
                (self.translate_individually(unique).await, BatchMode::Individual)
            }
        }
    }

    async fn translate_individually(&self, unique: &[String]) -> Vec<TranslationOutcome> {
        let mut results = Vec::with_capacity(unique.len());
        for (i, text) in unique.iter().enumerate() {
            if i > 0 && !self.individual_delay.is_zero() {
                sleep(self.individual_delay).await;
            }
            results.push(self.engine.translate(text).await);
        }
        results
    }

    async fn translate_offline(&self, unique: &[String]) -> Vec<TranslationOutcome> {
        let mut results = Vec::with_capacity(unique.len());
        for text in unique {
            results.push(self.engine.simulate(text).await);
        }
        results
    }
}
