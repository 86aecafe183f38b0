//! 存储模块
//!
//! 提供翻译进度的检查点持久化。

pub mod progress;

pub use progress::{Checkpoint, FinalArtifact, ProgressStore, StoreError, TranslatedUnit};
