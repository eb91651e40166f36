//! 实时消息网关核心领域模型
//!
//! 包含身份、连接、消息、会话线程以及网关线路协议事件。

pub mod errors;
pub mod events;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use message::*;
pub use value_objects::*;
