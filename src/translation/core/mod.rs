//! 翻译系统核心模块
//!
//! - **引擎层** (`engine.rs`): 后端回退链、退避重试与运行统计
//!
//! ```text
//! BatchTranslator (pipeline/batch.rs)
//!     └── TranslationEngine (engine.rs)
//!             └── Backends (backend/mod.rs)
//!                     ├── ChatBackend × 2
//!                     ├── GoogleBackend
//!                     └── Simulator
//! ```

pub mod engine;

pub use engine::{EngineConfig, EngineStats, EngineStatsSnapshot, TranslationEngine, TranslationOutcome};
