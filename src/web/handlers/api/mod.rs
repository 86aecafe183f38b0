//! API 处理器

pub mod health;
pub mod tasks;
pub mod upload;

pub use health::*;
pub use tasks::*;
