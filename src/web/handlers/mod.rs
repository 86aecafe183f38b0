//! Web 路由处理器

pub mod api;
pub mod downloads;

pub use api::*;
pub use downloads::*;
