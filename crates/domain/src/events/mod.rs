//! 网关事件定义
//!
//! 客户端与服务端之间在 WebSocket 上交换的逻辑事件。

pub mod gateway_event;

// 重新导出事件类型
pub use gateway_event::*;
