//! 翻译管道模块
//!
//! 提供分段规划与批量翻译

pub mod batch;

// 重新导出主要类型
pub use batch::{
    is_translatable, make_delimiter, plan_segments, BatchMode, BatchOutcome, BatchTranslator,
    Segment, TranslatedBlock,
};
