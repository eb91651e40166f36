//! 基础设施层实现。
//!
//! 提供历史消息存储的具体后端（内存、Redis），以及按配置组装它们的构建函数。

pub mod builder;
pub mod redis;

pub use builder::{build_message_store, InfrastructureError};
pub use crate::redis::{RedisError, RedisMessageStore};
