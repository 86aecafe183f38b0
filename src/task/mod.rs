//! 任务层
//!
//! - [`job`]: 任务记录、状态与进程内任务表
//! - [`orchestrator`]: 驱动 抽取 → 分段 → 翻译 → 检查点 → 合并 的状态机

pub mod job;
pub mod orchestrator;

pub use job::{JobOptions, JobOutputs, JobStatus, JobStore, OutputFormat, TranslationJob};
pub use orchestrator::{fingerprint, JobRun, Orchestrator, ProgressEvent, ProgressStream};
