//! 翻译模块
//!
//! 分段翻译管道，采用清晰的模块化架构：
//! - **segmenter**: 按句子边界切分超长文本
//! - **backend**: 翻译后端适配层（两个对话接口、通用翻译接口、离线模拟器）
//! - **core**: 回退链与退避重试引擎
//! - **pipeline**: 分段规划与批量翻译
//! - **storage**: 可恢复的检查点存储
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use epub2pdf::translation::{BatchTranslator, TranslationEngine, load_translation_config};
//!
//! # async fn example(blocks: Vec<epub2pdf::extract::ContentBlock>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_translation_config();
//! let engine = Arc::new(TranslationEngine::from_config(&config)?);
//! let translator = BatchTranslator::new(engine, config.individual_delay());
//!
//! let outcome = translator.translate_blocks(&blocks).await;
//! for (sequence, text) in outcome.by_sequence() {
//!     println!("{}: {}", sequence, text);
//! }
//! # Ok(())
//! # }
//! ```

/// 配置管理模块
pub mod config;

/// 回退链与重试引擎
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 翻译后端适配层
pub mod backend;

/// 分段规划与批量翻译
pub mod pipeline;

/// 文本分段器
pub mod segmenter;

/// 检查点存储
pub mod storage;

// ============================================================================
// 公共API导出
// ============================================================================

pub use backend::{BackendKind, Backends, Simulator, TranslationBackend};
pub use config::{load_translation_config, ConfigManager, TranslationConfig};
pub use core::{EngineConfig, TranslationEngine, TranslationOutcome};
pub use error::{BackendError, BackendErrorKind, TranslationError, TranslationResult};
pub use pipeline::{plan_segments, BatchOutcome, BatchTranslator, Segment, TranslatedBlock};
pub use storage::{Checkpoint, FinalArtifact, ProgressStore, StoreError, TranslatedUnit};
