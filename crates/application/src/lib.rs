//! 应用层实现。
//!
//! 网关的核心逻辑：连接注册表、会话状态机、在线状态广播、消息路由、
//! 历史查询，以及把它们串在一起的单任务事件循环。

pub mod clock;
pub mod error;
pub mod history;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod router;
pub mod session;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use history::{memory::MemoryMessageStore, HistoryService, MessageStore, StoreError};
pub use hub::{GatewayHub, GatewayHubDependencies, HubCommand, HubHandle};
pub use presence::PresenceBroadcaster;
pub use registry::{ConnectionRegistry, Registration};
pub use router::{MessageRouter, RouteOutcome, RouterStats};
pub use session::{GatewaySession, Outbox, SessionState, SessionTable};
