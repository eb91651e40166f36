//! Redis 历史存储
//!
//! 每个会话线程对应一个 Redis 列表，按到达顺序追加，超出上限时从头部裁剪。

pub mod error;
pub mod store;

pub use error::*;
pub use store::*;
